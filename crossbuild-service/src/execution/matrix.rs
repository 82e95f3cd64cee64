// Matrix Expansion
// Expands OS x arch x toolchain parameter lists into ordered build cells

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered build parameters defining the matrix shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildParameterSet {
    oses: Vec<String>,
    arches: Vec<String>,
    toolchain_versions: Vec<String>,
}

impl BuildParameterSet {
    pub fn new(
        oses: impl IntoIterator<Item = impl Into<String>>,
        arches: impl IntoIterator<Item = impl Into<String>>,
        toolchain_versions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            oses: oses.into_iter().map(Into::into).collect(),
            arches: arches.into_iter().map(Into::into).collect(),
            toolchain_versions: toolchain_versions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn builder() -> ParameterSetBuilder {
        ParameterSetBuilder::new()
    }

    pub fn oses(&self) -> &[String] {
        &self.oses
    }

    pub fn arches(&self) -> &[String] {
        &self.arches
    }

    pub fn toolchain_versions(&self) -> &[String] {
        &self.toolchain_versions
    }

    /// Number of cells the matrix expands to
    pub fn cell_count(&self) -> usize {
        self.oses.len() * self.arches.len() * self.toolchain_versions.len()
    }
}

/// How a cell's output path is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// `build/<os>/<arch>/`; later toolchain versions overlay earlier ones
    #[default]
    Shared,
    /// `build/<version>/<os>/<arch>/`; every cell has its own directory
    PerToolchain,
}

/// A single (toolchain version, os, arch) combination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildCell {
    pub toolchain_version: String,
    pub os: String,
    pub arch: String,
}

impl BuildCell {
    pub fn new(
        toolchain_version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            toolchain_version: toolchain_version.into(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Base environment reference for this cell's toolchain
    ///
    /// `template` holds a `{version}` placeholder, e.g. `golang:{version}`.
    pub fn base_environment_ref(&self, template: &str) -> String {
        base_environment_ref(template, &self.toolchain_version)
    }

    /// Output directory for this cell, relative to the export destination
    pub fn output_path(&self, layout: OutputLayout) -> String {
        match layout {
            OutputLayout::Shared => format!("build/{}/{}/", self.os, self.arch),
            OutputLayout::PerToolchain => format!(
                "build/{}/{}/{}/",
                self.toolchain_version, self.os, self.arch
            ),
        }
    }
}

impl fmt::Display for BuildCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.toolchain_version, self.os, self.arch)
    }
}

/// Resolve a base environment template for a toolchain version
pub fn base_environment_ref(template: &str, toolchain_version: &str) -> String {
    template.replace("{version}", toolchain_version)
}

/// Cells sharing one toolchain version, in expander order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainGroup {
    pub toolchain_version: String,
    pub cells: Vec<BuildCell>,
}

/// Matrix expander for build parameter sets
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand parameters into the full cartesian product of cells.
    ///
    /// Order is version-major, then os, then arch. Nothing is skipped or
    /// deduplicated; an empty input list yields no cells.
    pub fn expand(params: &BuildParameterSet) -> Vec<BuildCell> {
        let mut cells = Vec::with_capacity(params.cell_count());

        for version in &params.toolchain_versions {
            for os in &params.oses {
                for arch in &params.arches {
                    cells.push(BuildCell::new(version, os, arch));
                }
            }
        }

        cells
    }

    /// Group consecutive cells by toolchain version.
    ///
    /// One environment is prepared per group and reused for every cell in it.
    pub fn group_by_toolchain(cells: Vec<BuildCell>) -> Vec<ToolchainGroup> {
        let mut groups: Vec<ToolchainGroup> = Vec::new();

        for cell in cells {
            match groups.last_mut() {
                Some(group) if group.toolchain_version == cell.toolchain_version => {
                    group.cells.push(cell);
                }
                _ => groups.push(ToolchainGroup {
                    toolchain_version: cell.toolchain_version.clone(),
                    cells: vec![cell],
                }),
            }
        }

        groups
    }
}

/// Builder for creating parameter sets programmatically
#[derive(Debug, Default)]
pub struct ParameterSetBuilder {
    params: BuildParameterSet,
}

impl ParameterSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_os(mut self, os: impl Into<String>) -> Self {
        self.params.oses.push(os.into());
        self
    }

    pub fn add_arch(mut self, arch: impl Into<String>) -> Self {
        self.params.arches.push(arch.into());
        self
    }

    pub fn add_toolchain(mut self, version: impl Into<String>) -> Self {
        self.params.toolchain_versions.push(version.into());
        self
    }

    pub fn build(self) -> BuildParameterSet {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn default_params() -> BuildParameterSet {
        BuildParameterSet::new(["linux", "darwin"], ["amd64", "arm64"], ["1.18", "1.19.2"])
    }

    #[test]
    fn test_expand_produces_full_product_in_order() {
        let cells = MatrixExpander::expand(&default_params());

        assert_eq!(cells.len(), 8);
        let rendered: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "1.18/linux/amd64",
                "1.18/linux/arm64",
                "1.18/darwin/amd64",
                "1.18/darwin/arm64",
                "1.19.2/linux/amd64",
                "1.19.2/linux/arm64",
                "1.19.2/darwin/amd64",
                "1.19.2/darwin/arm64",
            ]
        );
    }

    #[test]
    fn test_expand_has_no_duplicates() {
        let params = BuildParameterSet::new(
            ["linux", "darwin", "windows"],
            ["amd64", "arm64"],
            ["1.20", "1.21", "1.22"],
        );
        let cells = MatrixExpander::expand(&params);

        assert_eq!(cells.len(), 3 * 2 * 3);
        assert_eq!(cells.len(), params.cell_count());
        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), cells.len());
    }

    #[test]
    fn test_expand_is_idempotent() {
        let params = default_params();
        assert_eq!(MatrixExpander::expand(&params), MatrixExpander::expand(&params));
    }

    #[test]
    fn test_empty_dimension_yields_no_cells() {
        let params = BuildParameterSet::new(["linux"], Vec::<String>::new(), ["1.19.2"]);
        assert!(MatrixExpander::expand(&params).is_empty());
    }

    #[test]
    fn test_single_cell_scenario() {
        let params = BuildParameterSet::new(["linux"], ["amd64"], ["1.19.2"]);
        let cells = MatrixExpander::expand(&params);

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].base_environment_ref("golang:{version}"), "golang:1.19.2");
        assert_eq!(cells[0].output_path(OutputLayout::Shared), "build/linux/amd64/");
    }

    #[test]
    fn test_shared_output_path_is_injective_over_os_arch() {
        let cells = MatrixExpander::expand(&default_params());

        for a in &cells {
            for b in &cells {
                if a.output_path(OutputLayout::Shared) == b.output_path(OutputLayout::Shared) {
                    assert_eq!((&a.os, &a.arch), (&b.os, &b.arch));
                }
            }
        }

        // Within one toolchain pass every path is distinct
        for group in MatrixExpander::group_by_toolchain(cells) {
            let paths: HashSet<_> = group
                .cells
                .iter()
                .map(|c| c.output_path(OutputLayout::Shared))
                .collect();
            assert_eq!(paths.len(), group.cells.len());
        }
    }

    #[test]
    fn test_per_toolchain_layout_is_injective_over_cells() {
        let cells = MatrixExpander::expand(&default_params());
        let paths: HashSet<_> = cells
            .iter()
            .map(|c| c.output_path(OutputLayout::PerToolchain))
            .collect();

        assert_eq!(paths.len(), cells.len());
        assert_eq!(
            cells[0].output_path(OutputLayout::PerToolchain),
            "build/1.18/linux/amd64/"
        );
    }

    #[test]
    fn test_group_by_toolchain() {
        let groups = MatrixExpander::group_by_toolchain(MatrixExpander::expand(&default_params()));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].toolchain_version, "1.18");
        assert_eq!(groups[1].toolchain_version, "1.19.2");
        assert!(groups.iter().all(|g| g.cells.len() == 4));
    }

    #[test]
    fn test_parameter_set_builder() {
        let params = BuildParameterSet::builder()
            .add_os("linux")
            .add_arch("amd64")
            .add_arch("arm64")
            .add_toolchain("1.19.2")
            .build();

        assert_eq!(params.oses(), ["linux"]);
        assert_eq!(params.arches(), ["amd64", "arm64"]);
        assert_eq!(params.cell_count(), 2);
    }

    #[test]
    fn test_output_layout_deserializes_kebab_case() {
        let layout: OutputLayout = serde_yaml::from_str("per-toolchain").unwrap();
        assert_eq!(layout, OutputLayout::PerToolchain);
    }
}
