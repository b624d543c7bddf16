//! Build driver and host integration for mpiforge.
//!
//! This crate runs everything that leaves the process: the container builder
//! (`Builder`: build, pull, sign, push, inspect), timeout-bounded command
//! execution (`exec`), parsing of image inspection output (`inspect`), the
//! `ldd`/`dpkg` backed dependency inspector (`ldd`) and host prerequisite
//! checks (`prereq`).

pub mod builder;
pub mod exec;
pub mod inspect;
pub mod ldd;
pub mod prereq;

pub use builder::{
    default_image_name, exec_args, BuildRecord, Builder, ImageSpec, PullOutcome,
    DEFAULT_IMAGE_NAME,
};
pub use exec::{CommandOutput, Invocation};
pub use inspect::ImageMetadata;
pub use ldd::{detect_inspector, LddInspector};
pub use prereq::{check_build_prereqs, check_bind_prereqs, format_missing, MissingPrereq};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid parameter(s): {0}")]
    InvalidParameter(String),
    #[error("container builder is not available: {0}")]
    BuilderUnavailable(String),
    #[error("command '{command}' failed: {cause}\nstdout: {stdout}\nstderr: {stderr}")]
    ExecFailed {
        command: String,
        cause: String,
        stdout: String,
        stderr: String,
    },
    #[error("command '{command}' timed out after {}s\nstdout: {stdout}\nstderr: {stderr}", .timeout.as_secs())]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
    #[error(transparent)]
    Deffile(#[from] mpiforge_deffile::DeffileError),
    #[error("invalid build record: {0}")]
    Record(#[from] serde_json::Error),
}

impl RuntimeError {
    pub(crate) fn io(
        action: &'static str,
        path: &std::path::Path,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.display().to_string();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}
