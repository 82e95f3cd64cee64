// Build Configuration
// Matrix shape and run options, loaded from YAML and overridable by the CLI

use crate::error::{BuildError, BuildResult};
use crate::execution::matrix::{BuildParameterSet, OutputLayout};
use crate::runners::ImagePullPolicy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the source directory when no config path is given
pub const CONFIG_FILE_NAME: &str = "crossbuild.yaml";

/// Placeholder substituted with the toolchain version in `image_template`
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Placeholder substituted with the cell's output path in `build_command`
pub const PATH_PLACEHOLDER: &str = "{path}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BuildConfig {
    pub os_list: Vec<String>,
    pub arch_list: Vec<String>,
    pub toolchain_versions: Vec<String>,
    pub output_destination: PathBuf,
    /// Host source tree mounted into every environment
    pub source: PathBuf,
    pub mount_path: String,
    pub image_template: String,
    pub build_command: Vec<String>,
    pub output_layout: OutputLayout,
    pub export_retries: u32,
    pub pull_policy: ImagePullPolicy,
    /// Seconds a single build command may run (unset = no limit)
    pub exec_timeout: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            os_list: vec!["linux".to_string(), "darwin".to_string()],
            arch_list: vec!["amd64".to_string(), "arm64".to_string()],
            toolchain_versions: vec!["1.18".to_string(), "1.19.2".to_string()],
            output_destination: PathBuf::from("."),
            source: PathBuf::from("."),
            mount_path: "/src".to_string(),
            image_template: "golang:{version}".to_string(),
            build_command: ["go", "build", "-o", PATH_PLACEHOLDER]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_layout: OutputLayout::Shared,
            export_retries: 0,
            pull_policy: ImagePullPolicy::IfNotPresent,
            exec_timeout: None,
        }
    }
}

impl BuildConfig {
    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml(content: &str) -> BuildResult<Self> {
        serde_yaml::from_str::<Option<Self>>(content)
            .map(Option::unwrap_or_default)
            .map_err(|e| BuildError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BuildError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str::<Option<Self>>(&content)
            .map(Option::unwrap_or_default)
            .map_err(|e| BuildError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `crossbuild.yaml` from `dir` if present, defaults otherwise
    pub fn discover(dir: &Path) -> BuildResult<Self> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::from_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    ///
    /// Toolchain version strings are passed through untouched.
    pub fn validate(&self) -> BuildResult<()> {
        if self.os_list.is_empty() {
            return Err(BuildError::Config("osList must not be empty".to_string()));
        }
        if self.arch_list.is_empty() {
            return Err(BuildError::Config("archList must not be empty".to_string()));
        }
        if self.toolchain_versions.is_empty() {
            return Err(BuildError::Config(
                "toolchainVersions must not be empty".to_string(),
            ));
        }
        if !self.image_template.contains(VERSION_PLACEHOLDER) {
            return Err(BuildError::Config(format!(
                "imageTemplate '{}' must contain {}",
                self.image_template, VERSION_PLACEHOLDER
            )));
        }
        if self.build_command.is_empty() {
            return Err(BuildError::Config("buildCommand must not be empty".to_string()));
        }
        for os in &self.os_list {
            check_path_component("osList", os)?;
        }
        for arch in &self.arch_list {
            check_path_component("archList", arch)?;
        }
        if self.output_layout == OutputLayout::PerToolchain {
            for version in &self.toolchain_versions {
                check_path_component("toolchainVersions", version)?;
            }
        }
        if !self.mount_path.starts_with('/') {
            return Err(BuildError::Config(format!(
                "mountPath '{}' must be absolute",
                self.mount_path
            )));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout.map(Duration::from_secs)
    }

    pub fn parameters(&self) -> BuildParameterSet {
        BuildParameterSet::new(
            self.os_list.iter().cloned(),
            self.arch_list.iter().cloned(),
            self.toolchain_versions.iter().cloned(),
        )
    }

    /// Build command for a cell, with `{path}` replaced by its output path
    pub fn build_command_for(&self, output_path: &str) -> Vec<String> {
        self.build_command
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, output_path))
            .collect()
    }
}

/// Values spliced into output paths must be a single, non-relative segment
fn check_path_component(key: &str, value: &str) -> BuildResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(BuildError::Config(format!(
            "{} entry '{}' is not a valid path segment",
            key, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_matrix() {
        let config = BuildConfig::default();

        assert_eq!(config.os_list, vec!["linux", "darwin"]);
        assert_eq!(config.arch_list, vec!["amd64", "arm64"]);
        assert_eq!(config.toolchain_versions, vec!["1.18", "1.19.2"]);
        assert_eq!(config.output_destination, PathBuf::from("."));
        assert_eq!(config.output_layout, OutputLayout::Shared);
        assert!(config.validate().is_ok());
        assert_eq!(config.parameters().cell_count(), 8);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = BuildConfig::from_yaml(
            r#"
osList: [linux, windows]
toolchainVersions: ["1.21"]
outputLayout: per-toolchain
exportRetries: 2
"#,
        )
        .unwrap();

        assert_eq!(config.os_list, vec!["linux", "windows"]);
        assert_eq!(config.arch_list, vec!["amd64", "arm64"]);
        assert_eq!(config.toolchain_versions, vec!["1.21"]);
        assert_eq!(config.output_layout, OutputLayout::PerToolchain);
        assert_eq!(config.export_retries, 2);
        assert_eq!(config.image_template, "golang:{version}");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(BuildConfig::from_yaml("  \n").unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = BuildConfig::from_yaml("osLists: [linux]").unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BuildConfig::default();
        config.arch_list.clear();
        assert!(config.validate().is_err());

        let mut config = BuildConfig::default();
        config.image_template = "golang:latest".to_string();
        assert!(config.validate().is_err());

        let mut config = BuildConfig::default();
        config.build_command.clear();
        assert!(config.validate().is_err());

        let mut config = BuildConfig::default();
        config.mount_path = "src".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_matrix_values_must_be_single_path_segments() {
        for bad in ["", ".", "..", "linux/arm64", "../../escaped", "win\\x86"] {
            let mut config = BuildConfig::default();
            config.os_list = vec![bad.to_string()];
            assert!(
                matches!(config.validate(), Err(BuildError::Config(_))),
                "os '{}' accepted",
                bad
            );

            let mut config = BuildConfig::default();
            config.arch_list = vec!["amd64".to_string(), bad.to_string()];
            assert!(
                matches!(config.validate(), Err(BuildError::Config(_))),
                "arch '{}' accepted",
                bad
            );
        }
    }

    #[test]
    fn test_toolchain_versions_checked_only_when_in_output_paths() {
        let mut config = BuildConfig::default();
        config.toolchain_versions = vec!["../1.18".to_string()];
        assert!(config.validate().is_ok());

        config.output_layout = OutputLayout::PerToolchain;
        assert!(matches!(config.validate(), Err(BuildError::Config(_))));
    }

    #[test]
    fn test_exec_timeout_is_read_in_seconds() {
        assert_eq!(BuildConfig::default().exec_timeout(), None);

        let config = BuildConfig::from_yaml("execTimeout: 90\n").unwrap();
        assert_eq!(config.exec_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_toolchain_versions_are_not_validated() {
        let mut config = BuildConfig::default();
        config.toolchain_versions = vec!["not-a-version".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_command_for_substitutes_path() {
        let config = BuildConfig::default();
        assert_eq!(
            config.build_command_for("build/linux/amd64/"),
            vec!["go", "build", "-o", "build/linux/amd64/"]
        );
    }

    #[test]
    fn test_discover_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(BuildConfig::discover(dir.path()).unwrap(), BuildConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "archList: [riscv64]\n").unwrap();
        let config = BuildConfig::discover(dir.path()).unwrap();
        assert_eq!(config.arch_list, vec!["riscv64"]);
    }
}
