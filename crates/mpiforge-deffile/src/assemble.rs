//! Manifest assembly for the three deployment models.

use crate::policy::{self, BaseImageResolver};
use crate::sections;
use crate::DeffileError;
use mpiforge_schema::{
    ApplicationDescriptor, BuildEnvironment, DeploymentModel, ManifestDescriptor, SourceKind,
    SystemConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Packages every bind-model image needs to drive the host interconnect.
pub const BIND_EXTRA_PACKAGES: [&str; 11] = [
    "libc-bin",
    "libopensm-dev",
    "librdmacm-dev",
    "librdmacm1",
    "kmod",
    "libmlx4-1",
    "libibverbs-dev",
    "libibverbs1",
    "libnl-3-dev",
    "infiniband-diags",
    "ibverbs-utils",
];

/// Maps a host binary onto the distribution packages providing its shared
/// libraries. Best effort: an inspector that cannot tell returns nothing.
pub trait DependencyInspector {
    fn package_dependencies(&self, binary: &Path) -> Vec<String>;
}

/// Inspector for hosts without any way to resolve dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl DependencyInspector for NoDependencies {
    fn package_dependencies(&self, _binary: &Path) -> Vec<String> {
        Vec::new()
    }
}

/// Hybrid model: MPI and the application are both built inside the image.
pub fn render_hybrid(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
) -> Result<String, DeffileError> {
    let mut out = policy::resolve_bootstrap(&desc.distro, config, resolver)?;
    out += &sections::labels(desc, app);
    if app.source_kind() == SourceKind::File {
        out += &sections::files(desc, app)?;
    }
    out += &sections::environment(desc)?;
    out += &policy::resolve_init(&desc.distro, config)?;
    let (download, dir) = sections::app_download(app)?;
    out += &download;
    out += &sections::mpi_install(desc)?;
    out += &sections::app_install(app, dir);
    out += &sections::mpi_cleanup(desc);
    Ok(out)
}

/// Bind model: the application was built on the host and MPI is mounted
/// from the host at run time.
pub fn render_bind(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<String, DeffileError> {
    let mut out = policy::resolve_bootstrap(&desc.distro, config, resolver)?;
    out += &sections::labels(desc, app);
    out += &sections::files(desc, app)?;
    out += &sections::environment(desc)?;
    out += &policy::resolve_init(&desc.distro, config)?;

    let mut packages = binary_dependencies(app, inspector);
    packages.extend(BIND_EXTRA_PACKAGES.iter().map(|p| (*p).to_owned()));
    out += &policy::resolve_dependency_install(&desc.distro, &packages);

    out += &sections::mpi_mount_dir(desc)?;
    out += &policy::resolve_cleanup(&desc.distro);
    Ok(out)
}

/// Basic model: no MPI, the application files are copied in as is.
pub fn render_basic(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<String, DeffileError> {
    let mut out = policy::resolve_bootstrap(&desc.distro, config, resolver)?;
    out += &sections::labels(desc, app);
    out += &sections::files(desc, app)?;
    out += &policy::resolve_init(&desc.distro, config)?;
    let packages = binary_dependencies(app, inspector);
    out += &policy::resolve_dependency_install(&desc.distro, &packages);
    out += &policy::resolve_cleanup(&desc.distro);
    Ok(out)
}

/// Render the definition file for `desc.model`.
pub fn render(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<String, DeffileError> {
    match desc.model {
        DeploymentModel::Hybrid => render_hybrid(desc, app, config, resolver),
        DeploymentModel::Bind => render_bind(desc, app, config, resolver, inspector),
        DeploymentModel::Basic => render_basic(desc, app, config, resolver, inspector),
    }
}

pub fn create_hybrid(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
) -> Result<(), DeffileError> {
    check_path(desc)?;
    let content = render_hybrid(desc, app, config, resolver)?;
    write_manifest(desc, &content)
}

pub fn create_bind(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<(), DeffileError> {
    check_path(desc)?;
    let content = render_bind(desc, app, config, resolver, inspector)?;
    write_manifest(desc, &content)
}

pub fn create_basic(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<(), DeffileError> {
    check_path(desc)?;
    let content = render_basic(desc, app, config, resolver, inspector)?;
    write_manifest(desc, &content)
}

/// Write the definition file for `desc.model` to `desc.path`.
///
/// The file is written in one go once every section rendered, so a failure
/// leaves nothing behind.
pub fn create(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
    inspector: &dyn DependencyInspector,
) -> Result<(), DeffileError> {
    check_path(desc)?;
    let content = render(desc, app, config, resolver, inspector)?;
    write_manifest(desc, &content)
}

/// Copy a finished definition file into the install directory, unless it
/// already lives there. Returns the backup path when a copy was made.
pub fn backup(
    desc: &ManifestDescriptor,
    env: &BuildEnvironment,
) -> Result<Option<PathBuf>, DeffileError> {
    check_path(desc)?;
    if !env.has_install_dir() {
        return Err(DeffileError::InvalidParameter(
            "install directory is not set".to_owned(),
        ));
    }
    let file_name = desc.path.file_name().ok_or_else(|| {
        DeffileError::InvalidParameter(format!(
            "{} does not name a file",
            desc.path.display()
        ))
    })?;
    let target = env.install_dir.join(file_name);
    if target == desc.path {
        return Ok(None);
    }
    info!("backing up {} to {}", desc.path.display(), target.display());
    fs::copy(&desc.path, &target).map_err(DeffileError::io("back up", &desc.path))?;
    Ok(Some(target))
}

fn binary_dependencies(
    app: &ApplicationDescriptor,
    inspector: &dyn DependencyInspector,
) -> Vec<String> {
    let binary = app
        .configured_bin_path()
        .unwrap_or_else(|| app.local_source());
    debug!("getting dependencies for {binary}");
    inspector.package_dependencies(Path::new(binary))
}

fn check_path(desc: &ManifestDescriptor) -> Result<(), DeffileError> {
    if desc.path.as_os_str().is_empty() {
        return Err(DeffileError::InvalidParameter(
            "definition file path is empty".to_owned(),
        ));
    }
    Ok(())
}

fn write_manifest(desc: &ManifestDescriptor, content: &str) -> Result<(), DeffileError> {
    fs::write(&desc.path, content).map_err(DeffileError::io("write", &desc.path))?;
    info!(
        "wrote {} definition file {}",
        desc.model,
        desc.path.display()
    );
    Ok(())
}
