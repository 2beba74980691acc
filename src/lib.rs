//! # Wand Core Library
//!
//! This crate contains the core logic of `wand`, a shim-based package version manager. Several
//! versions of a tool can be installed side by side under `~/.wand`; a small shim per executable
//! picks the right one at run time, either from a project's `.wandrc` or from the global default.
//!
//! The `wand` binary is a thin command line layer over these modules, which can also be reused as
//! a backend in other tools. Network access and persistence sit behind traits
//! ([`FormulaSource`], [`ReleaseSource`], [`RegistryStore`], [`Transport`]) so every service can
//! be driven with in-memory implementations.
//!
//! ## Modules Overview
//! - [`version`] / [`constraint`] – Version parsing, ordering and constraint matching
//! - [`platform`] – Normalized host OS and architecture
//! - [`config`] – Directory layout and environment configuration
//! - [`error`] – Classified error type shared by every service
//! - [`formula`] – Package definitions and the local formula repository
//! - [`registry`] – Record of installed packages and global versions
//! - [`releases`] – Listing upstream releases
//! - [`download`] / [`extract`] – Fetching, verifying and safely unpacking artifacts
//! - [`resolver`] – Turning version requests into concrete versions
//! - [`installer`] – Installing and removing package versions
//! - [`shims`] – Creating shims and resolving which binary they run
//! - [`orchestrator`] – Install/uninstall with shims and the higher level commands
//! - [`wandrc`] / [`wandfile`] – Project pins and declarative bulk manifests
//! - [`shell`] / [`util`] – Command execution and shared helpers

pub mod config;
pub mod constraint;
pub mod download;
pub mod error;
pub mod extract;
pub mod formula;
pub mod installer;
pub mod orchestrator;
pub mod platform;
pub mod registry;
pub mod releases;
pub mod resolver;
pub mod shell;
pub mod shims;
pub mod util;
pub mod version;
pub mod wandfile;
pub mod wandrc;

#[cfg(test)]
mod test_support;

pub use config::WandPaths;
pub use constraint::Constraint;
pub use download::{DownloadError, Downloader, RetryPolicy, Transport};
pub use error::{ErrorKind, Result, WandError};
pub use extract::{ExtractError, Extractor};
pub use formula::{Formula, FormulaRepository, FormulaSource, PackageType, PlatformConfig};
pub use installer::InstallerService;
pub use orchestrator::{InstallOptions, InstallOrchestrator};
pub use platform::Platform;
pub use registry::{JsonRegistryStore, Package, PackageEntry, Registry, RegistryStore};
pub use releases::{Release, ReleaseSource};
pub use resolver::VersionService;
pub use shims::ShimService;
pub use version::Version;
pub use wandfile::{Wandfile, WandfileService};
pub use wandrc::WandRc;
