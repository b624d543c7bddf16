//! Image label keys.
//!
//! The definition file writes `<key> <value>` lines in `%labels`; the
//! builder's `inspect` command reports them back as `<key>: <value>`. Both
//! sides use these constants so they cannot drift apart.

pub const LINUX_DISTRIBUTION: &str = "Linux_distribution";
pub const LINUX_VERSION: &str = "Linux_version";
pub const MPI_IMPLEMENTATION: &str = "MPI_Implementation";
pub const MPI_VERSION: &str = "MPI_Version";
pub const MPI_DIRECTORY: &str = "MPI_Directory";
pub const MODEL: &str = "Model";
pub const APPLICATION: &str = "Application";
pub const APP_EXE: &str = "App_exe";
