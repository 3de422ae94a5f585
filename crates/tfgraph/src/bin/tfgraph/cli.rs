//! tfgraph cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfgraph ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the dependency graph and print it
    ///
    /// Reads HCL from stdin unless any other source is provided (via --input-*)
    #[command(alias = "graph")]
    Build(BuildCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct BuildCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    #[clap(flatten)]
    pub plugins: PluginArgs,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load .tf files from work directory
    #[clap(short = 'w', long = "input-workdir")]
    pub workdir: bool,

    /// Load a file
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load .tf files from given directory
    #[clap(short = 'd', long = "input-dir")]
    pub directories: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct PluginArgs {
    /// Search a directory for provider plugins
    ///
    /// Searched in the given order, before PATH.
    #[clap(long = "plugin-dir", env = "TFGRAPH_PLUGIN_DIR", value_delimiter = ':')]
    pub plugin_dirs: Vec<PathBuf>,

    /// Seconds to wait for a plugin to report its provider info
    #[clap(long = "plugin-timeout", default_value_t = 30)]
    pub plugin_timeout: u64,

    /// Do not look for plugins on PATH
    #[clap(long = "no-system-path")]
    pub no_system_path: bool,

    /// Do not run any plugins
    ///
    /// Providers only report their name. Takes precedence over all other plugin options.
    #[clap(long = "offline")]
    pub offline: bool,
}

impl PluginArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.plugin_timeout)
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Parsed declarations
    Config,
    /// Graph built without plugins
    Graph,
}
