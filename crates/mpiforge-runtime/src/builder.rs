//! Driver for the external container builder (Singularity or Apptainer).

use crate::exec::Invocation;
use crate::inspect::ImageMetadata;
use crate::RuntimeError;
use mpiforge_schema::{DeploymentModel, SystemConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Image file name used when `ImageSpec::name` is empty.
pub const DEFAULT_IMAGE_NAME: &str = "mpiforge.sif";
/// Passphrase of the signing key, fed to the builder on stdin.
pub const KEY_PASSPHRASE_VAR: &str = "SY_KEY_PASSPHRASE";
/// Index of the signing key in the keyring.
pub const KEY_INDEX_VAR: &str = "SY_KEY_INDEX";

const BUILDER_CANDIDATES: [&str; 2] = ["singularity", "apptainer"];
const DEFAULT_EXEC_ARGS: [&str; 1] = ["--no-home"];

/// A container image, built or to be built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// File name of the image; `mpiforge.sif` when empty.
    pub name: String,
    /// Full path of the image; `<install_dir>/<name>` when empty.
    pub path: PathBuf,
    /// Directory the builder runs in.
    pub build_dir: PathBuf,
    /// Where finished images and build records are stored.
    pub install_dir: PathBuf,
    pub def_file: PathBuf,
    /// Registry URL to pull the image from.
    pub url: String,
    pub model: Option<DeploymentModel>,
    pub app_exe: String,
    /// In-image MPI install or mount directory.
    pub mpi_dir: String,
    /// Extra `--bind` specifications used when running the image.
    pub binds: Vec<String>,
}

impl ImageSpec {
    pub fn image_name(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_IMAGE_NAME
        } else {
            &self.name
        }
    }

    pub fn image_path(&self) -> PathBuf {
        if self.path.as_os_str().is_empty() {
            self.install_dir.join(self.image_name())
        } else {
            self.path.clone()
        }
    }

    /// Fill model, executable and MPI directory from inspected labels.
    /// Fields the image does not label keep their current value.
    pub fn apply_metadata(&mut self, meta: &ImageMetadata) {
        if let Some(model) = meta.model {
            self.model = Some(model);
        }
        if let Some(exe) = &meta.app_exe {
            self.app_exe.clone_from(exe);
        }
        if let Some(dir) = &meta.mpi_dir {
            self.mpi_dir.clone_from(dir);
        }
    }
}

/// Result of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PullOutcome {
    Pulled,
    /// Persistent mode and the image was already there.
    Skipped,
}

/// Provenance written next to every image built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub image: PathBuf,
    pub def_file: PathBuf,
    pub builder: PathBuf,
    pub builder_version: String,
    pub image_blake3: String,
    pub def_file_blake3: String,
    pub created_at: String,
}

impl BuildRecord {
    /// Location of the record for `image`: `<dir>/<image file name>.build.json`.
    pub fn path_for(dir: &Path, image: &Path) -> PathBuf {
        let name = image
            .file_name()
            .map_or_else(|| DEFAULT_IMAGE_NAME.into(), |n| n.to_string_lossy());
        dir.join(format!("{name}.build.json"))
    }

    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = fs::read_to_string(path).map_err(RuntimeError::io("read", path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[allow(unsafe_code)]
fn running_as_root() -> bool {
    // SAFETY: geteuid() takes no arguments and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

fn hash_file(path: &Path) -> Result<String, RuntimeError> {
    let mut file = fs::File::open(path).map_err(RuntimeError::io("open", path))?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher).map_err(RuntimeError::io("hash", path))?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn require(value: &Path, what: &str) -> Result<(), RuntimeError> {
    if value.as_os_str().is_empty() {
        return Err(RuntimeError::InvalidParameter(format!("{what} is undefined")));
    }
    Ok(())
}

/// Handle on the container builder binary plus the host configuration that
/// decides how it is invoked.
#[derive(Debug, Clone)]
pub struct Builder {
    bin: PathBuf,
    config: SystemConfig,
    root: bool,
}

impl Builder {
    pub fn new(bin: impl Into<PathBuf>, config: SystemConfig) -> Self {
        Self {
            bin: bin.into(),
            config,
            root: running_as_root(),
        }
    }

    /// Use the configured builder binary, or the first of `singularity` and
    /// `apptainer` found on `PATH`.
    pub fn from_config(config: &SystemConfig) -> Result<Self, RuntimeError> {
        if let Some(bin) = &config.builder_bin {
            if !bin.is_file() {
                return Err(RuntimeError::BuilderUnavailable(format!(
                    "{} does not exist",
                    bin.display()
                )));
            }
            return Ok(Self::new(bin, config.clone()));
        }
        let bin = BUILDER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                RuntimeError::BuilderUnavailable(format!(
                    "none of {} found on PATH",
                    BUILDER_CANDIDATES.join(", ")
                ))
            })?;
        debug!("using container builder {}", bin.display());
        Ok(Self::new(bin, config.clone()))
    }

    /// Override root detection. Sudo is never used when running as root.
    #[must_use]
    pub fn with_root(mut self, root: bool) -> Self {
        self.root = root;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    fn uses_sudo(&self, subcommand: &str) -> bool {
        !self.config.nopriv && !self.root && self.config.is_sudo_command(subcommand)
    }

    /// Builder invocation for `subcommand`, prefixed with sudo when the
    /// configuration asks for it.
    fn invocation(&self, subcommand: &str) -> Invocation {
        let timeout = self.config.builder_timeout();
        if self.uses_sudo(subcommand) {
            Invocation::new(&self.config.sudo_bin, timeout)
                .arg(self.bin.display().to_string())
                .arg(subcommand)
        } else {
            Invocation::new(&self.bin, timeout).arg(subcommand)
        }
    }

    /// Version string reported by the builder.
    pub fn version(&self) -> Result<String, RuntimeError> {
        let out = Invocation::new(&self.bin, self.config.query_timeout())
            .arg("version")
            .run()?;
        Ok(out.stdout.trim().to_owned())
    }

    /// Build the image described by `spec` from its definition file and
    /// record how it was built.
    pub fn create(&self, spec: &ImageSpec) -> Result<BuildRecord, RuntimeError> {
        require(&spec.build_dir, "build directory")?;
        require(&spec.def_file, "definition file")?;
        let image = spec.image_path();
        info!(
            "building {} from {}",
            image.display(),
            spec.def_file.display()
        );

        let builder_version = self.version().unwrap_or_else(|e| {
            warn!("cannot query builder version: {e}");
            String::from("unknown")
        });

        let image_arg = image.display().to_string();
        let def_arg = spec.def_file.display().to_string();
        let inv = if self.config.nopriv {
            Invocation::new(&self.bin, self.config.builder_timeout())
                .args(["build", "--fakeroot"])
        } else {
            self.invocation("build")
        };
        inv.args([image_arg, def_arg])
            .current_dir(&spec.build_dir)
            .run()?;

        // Executable images can be launched directly by tools such as PRRTE.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&image, fs::Permissions::from_mode(0o755))
                .map_err(RuntimeError::io("chmod", &image))?;
        }

        let record = BuildRecord {
            image: image.clone(),
            def_file: spec.def_file.clone(),
            builder: self.bin.clone(),
            builder_version,
            image_blake3: hash_file(&image)?,
            def_file_blake3: hash_file(&spec.def_file)?,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let record_dir = if spec.install_dir.as_os_str().is_empty() {
            image.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            spec.install_dir.clone()
        };
        let record_path = BuildRecord::path_for(&record_dir, &image);
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(&record_path, json).map_err(RuntimeError::io("write", &record_path))?;
        debug!("build record written to {}", record_path.display());
        Ok(record)
    }

    /// Pull `spec.url` into the image path.
    pub fn pull(&self, spec: &ImageSpec) -> Result<PullOutcome, RuntimeError> {
        if spec.url.is_empty() {
            return Err(RuntimeError::InvalidParameter(
                "image URL is undefined".to_owned(),
            ));
        }
        require(&spec.path, "image path")?;
        require(&spec.build_dir, "build directory")?;

        if self.config.persistent && spec.path.exists() {
            info!(
                "persistent mode, {} already available, skipping pull",
                spec.path.display()
            );
            return Ok(PullOutcome::Skipped);
        }
        info!("pulling {} into {}", spec.url, spec.path.display());
        self.invocation("pull")
            .arg(spec.path.display().to_string())
            .arg(spec.url.as_str())
            .current_dir(&spec.build_dir)
            .run()?;
        Ok(PullOutcome::Pulled)
    }

    /// Sign the image with the key selected by `SY_KEY_INDEX` (default 0),
    /// unlocking it with `SY_KEY_PASSPHRASE`.
    pub fn sign(&self, spec: &ImageSpec) -> Result<(), RuntimeError> {
        let index = std::env::var(KEY_INDEX_VAR)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "0".to_owned());
        let passphrase = std::env::var(KEY_PASSPHRASE_VAR).unwrap_or_default();
        self.sign_with_key(spec, &index, &passphrase)
    }

    pub fn sign_with_key(
        &self,
        spec: &ImageSpec,
        key_index: &str,
        passphrase: &str,
    ) -> Result<(), RuntimeError> {
        let image = spec.image_path();
        info!("signing {} with key {key_index}", image.display());
        let mut inv = self
            .invocation("sign")
            .args(["--keyidx", key_index])
            .arg(image.display().to_string())
            .stdin(passphrase);
        if !spec.build_dir.as_os_str().is_empty() {
            inv = inv.current_dir(&spec.build_dir);
        }
        inv.run()?;
        Ok(())
    }

    /// Push the image to the configured registry.
    pub fn upload(&self, spec: &ImageSpec) -> Result<(), RuntimeError> {
        let registry = self
            .config
            .registry
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                RuntimeError::InvalidParameter("no registry configured".to_owned())
            })?;
        let image = spec.image_path();
        info!("pushing {} to {registry}", image.display());
        let mut inv = self
            .invocation("push")
            .arg(image.display().to_string())
            .arg(registry);
        if !spec.build_dir.as_os_str().is_empty() {
            inv = inv.current_dir(&spec.build_dir);
        }
        inv.run()?;
        Ok(())
    }

    /// Read the labels of an image.
    pub fn metadata(&self, image: &Path) -> Result<ImageMetadata, RuntimeError> {
        let out = self
            .invocation("inspect")
            .arg(image.display().to_string())
            .run()?;
        Ok(ImageMetadata::parse(image, &out.stdout))
    }
}

/// Arguments for running an image with the builder's `exec` command.
///
/// Bind-model images get the host MPI install mounted on the in-image MPI
/// directory.
pub fn exec_args(spec: &ImageSpec, host_install_dir: &Path, nopriv: bool) -> Vec<String> {
    let mut args: Vec<String> = DEFAULT_EXEC_ARGS.iter().map(|a| (*a).to_owned()).collect();
    if nopriv {
        args.push("-u".to_owned());
    }
    if spec.model == Some(DeploymentModel::Bind) {
        if spec.mpi_dir.is_empty() {
            warn!("MPI mount point of {} is undefined", spec.image_path().display());
        }
        args.push("--bind".to_owned());
        args.push(format!("{}:{}", host_install_dir.display(), spec.mpi_dir));
    }
    for bind in &spec.binds {
        args.push("--bind".to_owned());
        args.push(bind.clone());
    }
    debug!("exec args: {}", args.join(" "));
    args
}

/// Conventional image name: `<distro>-<mpi>-<version>-<app>-<model>` with
/// the `:` of the distro replaced.
pub fn default_image_name(
    distro: &str,
    mpi_id: &str,
    mpi_version: &str,
    app: &str,
    model: DeploymentModel,
) -> String {
    format!(
        "{}-{mpi_id}-{mpi_version}-{app}-{model}",
        distro.replace(':', "-")
    )
}
