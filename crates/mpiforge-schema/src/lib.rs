//! Data model for mpiforge definition file generation.
//!
//! This crate defines the schema layer: distribution identities and the closed
//! set of supported distributions (`DistroIdentity`, `SupportedDistro`), MPI
//! implementation and application descriptors, the deployment model, the
//! template tag set, the immutable `ManifestDescriptor` build context, image
//! label keys shared by the emitter and the inspection parser, the system
//! configuration file (`SystemConfig`) and build recipes (`BuildRecipe`).

pub mod config;
pub mod descriptor;
pub mod distro;
pub mod labels;
pub mod recipe;

pub use config::{default_config_path, SystemConfig, CONFIG_ENV_VAR, MAX_COMMAND_TIMEOUT_SECS};
pub use descriptor::{
    basename, ApplicationDescriptor, BuildEnvironment, DeploymentModel, ImplementationDescriptor,
    ManifestDescriptor, SourceKind, TemplateTags, APP_STAGING_DIR,
};
pub use distro::{DistroFamily, DistroIdentity, SupportedDistro};
pub use recipe::{parse_recipe_file, parse_recipe_str, BuildRecipe};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {source}")]
    ParseToml {
        what: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid parameter(s): {0}")]
    InvalidParameter(String),
    #[error("unknown deployment model '{0}', expected hybrid, bind or basic")]
    UnknownModel(String),
}
