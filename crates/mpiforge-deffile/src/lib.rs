//! Definition file synthesis for MPI container images.
//!
//! This crate turns a `ManifestDescriptor` into builder-ready definition file
//! text: distro-specific bootstrap and package-manager policy (`policy`),
//! one pure builder per manifest section (`sections`), the three deployment
//! model sequences (`assemble`), and in-place substitution of pre-authored
//! templates (`template`).

pub mod archive;
pub mod assemble;
pub mod policy;
pub mod sections;
pub mod template;

pub use archive::ArchiveFormat;
pub use assemble::{
    backup, create, create_basic, create_bind, create_hybrid, render, DependencyInspector,
    NoDependencies, BIND_EXTRA_PACKAGES,
};
pub use policy::{BaseImageResolver, NoLibrary};
pub use sections::AppDir;
pub use template::{apply_template, render_template};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeffileError {
    #[error("invalid parameter(s): {0}")]
    InvalidParameter(String),
    #[error("unsupported distro: {0}")]
    UnsupportedDistro(String),
    #[error("unsupported tarball format for {0}")]
    UnsupportedArchive(String),
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeffileError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}
