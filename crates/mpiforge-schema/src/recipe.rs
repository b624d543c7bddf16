use crate::descriptor::{
    ApplicationDescriptor, BuildEnvironment, DeploymentModel, ImplementationDescriptor,
    ManifestDescriptor, TemplateTags,
};
use crate::distro::DistroIdentity;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A TOML file describing one definition file to generate.
///
/// ```toml
/// manifest = "helloworld.def"
/// model = "bind"
///
/// [distro]
/// name = "ubuntu"
/// version = "20.04"
/// codename = "focal"
///
/// [mpi]
/// id = "openmpi"
/// version = "4.0.1"
/// url = "https://download.open-mpi.org/release/open-mpi/v4.0/openmpi-4.0.1.tar.gz"
///
/// [app]
/// name = "helloworld"
/// bin_name = "helloworld"
/// bin_path = "/home/user/helloworld"
/// source = "file:///home/user/helloworld.c"
///
/// [env]
/// install_dir = "/opt/openmpi"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRecipe {
    /// Output path of the definition file, relative to the recipe file.
    pub manifest: PathBuf,
    #[serde(default)]
    pub model: DeploymentModel,
    pub distro: DistroIdentity,
    #[serde(default)]
    pub mpi: Option<ImplementationDescriptor>,
    pub app: ApplicationDescriptor,
    #[serde(default)]
    pub env: BuildEnvironment,
    #[serde(default)]
    pub tags: TemplateTags,
}

impl BuildRecipe {
    /// Check the recipe is usable for its deployment model.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.manifest.as_os_str().is_empty() {
            return Err(SchemaError::InvalidParameter(
                "manifest path must not be empty".to_owned(),
            ));
        }
        if self.distro.name.is_empty() || self.distro.version.is_empty() {
            return Err(SchemaError::InvalidParameter(
                "distro name and version are required".to_owned(),
            ));
        }
        if self.app.name.is_empty() || self.app.bin_name.is_empty() {
            return Err(SchemaError::InvalidParameter(
                "application name and binary name are required".to_owned(),
            ));
        }
        match self.model {
            DeploymentModel::Hybrid | DeploymentModel::Bind => {
                let mpi = self.mpi.as_ref().ok_or_else(|| {
                    SchemaError::InvalidParameter(format!(
                        "the {} model requires an [mpi] section",
                        self.model
                    ))
                })?;
                if mpi.version.is_empty() {
                    return Err(SchemaError::InvalidParameter(
                        "mpi.version must not be empty".to_owned(),
                    ));
                }
                if self.model == DeploymentModel::Hybrid && mpi.url.is_empty() {
                    return Err(SchemaError::InvalidParameter(
                        "mpi.url must not be empty for the hybrid model".to_owned(),
                    ));
                }
                if !self.env.has_install_dir() {
                    return Err(SchemaError::InvalidParameter(
                        "env.install_dir must not be empty".to_owned(),
                    ));
                }
            }
            DeploymentModel::Basic => {}
        }
        if self.model == DeploymentModel::Bind && self.app.configured_bin_path().is_none() {
            return Err(SchemaError::InvalidParameter(
                "the bind model requires app.bin_path, the binary built on the host".to_owned(),
            ));
        }
        // Bind images copy the host binary; the other models build from source.
        if self.model != DeploymentModel::Bind && self.app.source.trim().is_empty() {
            return Err(SchemaError::InvalidParameter(format!(
                "app.source must not be empty for the {} model",
                self.model
            )));
        }
        Ok(())
    }

    /// Split the recipe into the manifest build context and the application.
    ///
    /// A relative manifest path is resolved against `base_dir`.
    pub fn into_descriptors(self, base_dir: &Path) -> (ManifestDescriptor, ApplicationDescriptor) {
        let path = if self.manifest.is_absolute() {
            self.manifest
        } else {
            base_dir.join(self.manifest)
        };
        let mut distro = self.distro;
        distro.complete_codename();
        let descriptor = ManifestDescriptor {
            path,
            distro,
            mpi: self.mpi,
            tags: self.tags,
            env: self.env,
            model: self.model,
        };
        (descriptor, self.app)
    }
}

pub fn parse_recipe_str(input: &str) -> Result<BuildRecipe, SchemaError> {
    let recipe: BuildRecipe = toml::from_str(input).map_err(|source| SchemaError::ParseToml {
        what: "recipe".to_owned(),
        source,
    })?;
    recipe.validate()?;
    Ok(recipe)
}

pub fn parse_recipe_file(path: impl AsRef<Path>) -> Result<BuildRecipe, SchemaError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_recipe_str(&content)
}
