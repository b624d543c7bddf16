use crate::distro::DistroIdentity;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Directory inside the image where applications are staged and installed.
pub const APP_STAGING_DIR: &str = "/opt";

const DEFAULT_INSTALL_COMMAND: &str = "make install";

/// MPI implementation to install in, or bind into, the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImplementationDescriptor {
    /// Short identifier such as `openmpi` or `mpich`.
    pub id: String,
    pub version: String,
    /// Download URL of the source tarball.
    #[serde(default)]
    pub url: String,
}

impl ImplementationDescriptor {
    pub fn new(id: &str, version: &str, url: &str) -> Self {
        Self {
            id: id.to_owned(),
            version: version.to_owned(),
            url: url.to_owned(),
        }
    }

    /// File name of the tarball, i.e. the last path component of the URL.
    pub fn tarball(&self) -> &str {
        basename(&self.url)
    }
}

/// Where the application source comes from, derived from its URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Git,
    Http,
    File,
}

impl SourceKind {
    pub fn detect(source: &str) -> Self {
        let source = source.trim();
        if source.starts_with("git://")
            || source.starts_with("git@")
            || source.ends_with(".git")
        {
            Self::Git
        } else if source.starts_with("http://") || source.starts_with("https://") {
            Self::Http
        } else {
            Self::File
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationDescriptor {
    pub name: String,
    pub bin_name: String,
    /// Path of the executable. For the bind model this is the binary built on
    /// the host; for the hybrid model the in-image path it is compiled to.
    #[serde(default)]
    pub bin_path: Option<String>,
    /// Git URL, HTTP(S) tarball URL, or a path to a local source file.
    pub source: String,
    #[serde(default)]
    pub install_cmd: Option<String>,
}

impl ApplicationDescriptor {
    pub fn source_kind(&self) -> SourceKind {
        SourceKind::detect(&self.source)
    }

    /// Path of a local source with any `file://` prefix removed.
    pub fn local_source(&self) -> &str {
        self.source
            .strip_prefix("file://")
            .unwrap_or(&self.source)
    }

    pub fn source_basename(&self) -> &str {
        basename(self.local_source())
    }

    /// Default in-image location of the executable.
    pub fn default_exe_path(&self) -> String {
        format!("{APP_STAGING_DIR}/{}", self.bin_name)
    }

    pub fn exe_path(&self) -> String {
        match self.configured_bin_path() {
            Some(p) => p.to_owned(),
            None => self.default_exe_path(),
        }
    }

    pub fn configured_bin_path(&self) -> Option<&str> {
        self.bin_path.as_deref().filter(|p| !p.is_empty())
    }

    pub fn configured_install_cmd(&self) -> Option<&str> {
        self.install_cmd.as_deref().filter(|c| !c.is_empty())
    }

    pub fn install_command(&self) -> &str {
        self.configured_install_cmd()
            .unwrap_or(DEFAULT_INSTALL_COMMAND)
    }
}

/// Path bookkeeping for a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildEnvironment {
    /// MPI install directory; also the in-image install or mount target.
    #[serde(default)]
    pub install_dir: PathBuf,
    #[serde(default)]
    pub src_dir: PathBuf,
    #[serde(default)]
    pub build_dir: PathBuf,
}

impl BuildEnvironment {
    pub fn has_install_dir(&self) -> bool {
        !self.install_dir.as_os_str().is_empty()
    }
}

/// How MPI is made available inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentModel {
    /// MPI is built from source inside the image.
    #[default]
    Hybrid,
    /// MPI is mounted from the host at run time.
    Bind,
    /// No MPI at all.
    Basic,
}

impl DeploymentModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Bind => "bind",
            Self::Basic => "basic",
        }
    }

    /// Value of the `Model` image label, if the model records one.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Hybrid | Self::Bind => Some(self.as_str()),
            Self::Basic => None,
        }
    }
}

impl fmt::Display for DeploymentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentModel {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "bind" => Ok(Self::Bind),
            "basic" | "" => Ok(Self::Basic),
            other => Err(SchemaError::UnknownModel(other.to_owned())),
        }
    }
}

/// Placeholder strings a definition file template uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateTags {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tarball: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub install_conffile: String,
    #[serde(default)]
    pub uninstall_conffile: String,
    #[serde(default)]
    pub ifnet: String,
}

/// Everything needed to produce one definition file.
///
/// Built once per manifest and only ever read by the section builders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub path: PathBuf,
    pub distro: DistroIdentity,
    pub mpi: Option<ImplementationDescriptor>,
    pub tags: TemplateTags,
    pub env: BuildEnvironment,
    pub model: DeploymentModel,
}

/// Last path segment of a path or URL, ignoring trailing slashes.
pub fn basename(s: &str) -> &str {
    let trimmed = s.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
