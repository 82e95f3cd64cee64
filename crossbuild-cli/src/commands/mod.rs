pub mod build;
pub mod plan;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use color_eyre::Result;

use crossbuild_service::{BuildConfig, ImagePullPolicy, OutputLayout};

/// Matrix and output options shared by commands
#[derive(Args, Debug, Default, Clone)]
pub struct MatrixArgs {
    /// Config file (default: crossbuild.yaml in the source directory, if present)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Source tree to build (default: current directory)
    #[arg(long, short = 's', value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Target operating system (repeatable)
    #[arg(long, value_name = "OS")]
    pub os: Vec<String>,

    /// Target architecture (repeatable)
    #[arg(long, value_name = "ARCH")]
    pub arch: Vec<String>,

    /// Toolchain version (repeatable)
    #[arg(long, value_name = "VERSION")]
    pub toolchain: Vec<String>,

    /// Directory the build/ tree is exported into
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Include the toolchain version in output paths instead of letting the last one win
    #[arg(long)]
    pub per_toolchain: bool,

    /// Extra export attempts if writing outputs fails
    #[arg(long, value_name = "N")]
    pub export_retries: Option<u32>,

    /// When to pull base images
    #[arg(long, value_enum, value_name = "POLICY")]
    pub pull: Option<PullArg>,

    /// Fail a cell whose build command runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub exec_timeout: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullArg {
    Always,
    IfNotPresent,
    Never,
}

impl From<PullArg> for ImagePullPolicy {
    fn from(arg: PullArg) -> Self {
        match arg {
            PullArg::Always => ImagePullPolicy::Always,
            PullArg::IfNotPresent => ImagePullPolicy::IfNotPresent,
            PullArg::Never => ImagePullPolicy::Never,
        }
    }
}

impl MatrixArgs {
    /// Load the config file and apply command-line overrides
    pub fn resolve(&self) -> Result<BuildConfig> {
        let mut config = match (&self.config, &self.source) {
            (Some(path), _) => BuildConfig::from_file(path)?,
            (None, Some(source)) => BuildConfig::discover(source)?,
            (None, None) => BuildConfig::discover(&std::env::current_dir()?)?,
        };

        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if !self.os.is_empty() {
            config.os_list = self.os.clone();
        }
        if !self.arch.is_empty() {
            config.arch_list = self.arch.clone();
        }
        if !self.toolchain.is_empty() {
            config.toolchain_versions = self.toolchain.clone();
        }
        if let Some(output) = &self.output {
            config.output_destination = output.clone();
        }
        if self.per_toolchain {
            config.output_layout = OutputLayout::PerToolchain;
        }
        if let Some(retries) = self.export_retries {
            config.export_retries = retries;
        }
        if let Some(pull) = self.pull {
            config.pull_policy = pull.into();
        }
        if let Some(secs) = self.exec_timeout {
            config.exec_timeout = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }
}
