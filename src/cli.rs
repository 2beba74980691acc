use std::ffi::OsString;
use std::path::PathBuf;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Increase log output (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    pub(crate) command: WandCommand,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum WandCommand {
    /// Installs a package: <name>[@<version>]. Defaults to the latest release
    Install {
        name_at_version: String,
        /// Make this version the global default
        #[clap(short, long)]
        global: bool,
        /// Remove every installed version of the package first
        #[clap(short, long)]
        force: bool,
    },
    /// Uninstalls a package: <name>[@<version>]. Without a version, every installed version is removed
    Uninstall {
        name_at_version: String,
    },
    /// Installs the latest release of a package and makes it the global default
    Update {
        name: String,
    },
    /// Lists installed packages, or the installed versions of one package
    List {
        name: Option<String>,
    },
    /// Lists the versions available upstream
    Versions {
        name: String,
    },
    /// Selects an installed version for the current directory (`.wandrc`) or globally
    Use {
        name: String,
        version: String,
        #[clap(short, long)]
        global: bool,
    },
    /// Creates an empty `.wandrc` in the current directory
    Init,
    /// Pins an installed version in the nearest `.wandrc`: <name>@<version>
    Add {
        name_at_version: String,
    },
    /// Removes a pin from the nearest `.wandrc`
    Remove {
        name: String,
    },
    /// Prints the executable a command resolves to in the current directory
    Which {
        name: String,
    },
    /// Searches formulas by name, description and tags
    Search {
        term: String,
    },
    /// Lists installed packages with a newer release
    Outdated,
    /// Checks the wand installation
    Doctor,
    /// Updates the local formula repository
    Sync,
    /// Recreates all shims
    Rehash,
    /// Works with wandfiles, declarative lists of packages
    Wandfile {
        #[command(subcommand)]
        command: WandfileCommand,
    },
    /// Runs a package binary on behalf of a shim
    #[clap(hide = true)]
    ShimExec {
        package: String,
        binary: String,
        #[clap(last = true)]
        args: Vec<OsString>,
    },
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum WandfileCommand {
    /// Installs everything listed in the wandfile
    Install {
        #[clap(long, default_value = "wandfile")]
        file: PathBuf,
    },
    /// Lists wandfile entries that are not installed
    Check {
        #[clap(long, default_value = "wandfile")]
        file: PathBuf,
    },
    /// Writes a wandfile describing the installed packages
    Dump {
        #[clap(long, default_value = "wandfile")]
        file: PathBuf,
    },
    /// Moves wandfile entries to their latest releases and installs them
    Update {
        #[clap(long, default_value = "wandfile")]
        file: PathBuf,
    },
}
