//! Turn a pre-authored definition file template into a usable one.

use crate::archive::tar_flag_for;
use crate::DeffileError;
use mpiforge_schema::ManifestDescriptor;
use std::fs;
use tracing::{debug, info};

/// Placeholder for the tar extraction flag.
pub const TAR_ARGS_TAG: &str = "TARARGS";
/// Placeholder for the distribution codename.
pub const DISTRO_CODENAME_TAG: &str = "DISTROCODENAME";

fn check(desc: &ManifestDescriptor) -> Result<(), DeffileError> {
    let mut missing = Vec::new();
    match &desc.mpi {
        None => missing.push("MPI implementation"),
        Some(mpi) => {
            if mpi.version.is_empty() {
                missing.push("MPI version");
            }
            if mpi.url.is_empty() {
                missing.push("MPI URL");
            }
        }
    }
    if desc.path.as_os_str().is_empty() {
        missing.push("template path");
    }
    if desc.tags.version.is_empty() {
        missing.push("version tag");
    }
    if desc.tags.url.is_empty() {
        missing.push("URL tag");
    }
    if desc.tags.tarball.is_empty() {
        missing.push("tarball tag");
    }
    if desc.distro.name.is_empty() {
        missing.push("distro name");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DeffileError::InvalidParameter(format!(
            "missing {}",
            missing.join(", ")
        )))
    }
}

/// Substitute the descriptor's values into template text.
pub fn render_template(content: &str, desc: &ManifestDescriptor) -> Result<String, DeffileError> {
    check(desc)?;
    let Some(mpi) = desc.mpi.as_ref() else {
        return Err(DeffileError::InvalidParameter(
            "missing MPI implementation".to_owned(),
        ));
    };
    let tarball = mpi.tarball();
    let flag = tar_flag_for(tarball)?;

    let replacements = [
        (desc.tags.version.as_str(), mpi.version.as_str()),
        (desc.tags.url.as_str(), mpi.url.as_str()),
        (desc.tags.tarball.as_str(), tarball),
        (TAR_ARGS_TAG, flag),
        (DISTRO_CODENAME_TAG, desc.distro.codename.as_str()),
    ];
    let mut out = content.to_owned();
    for (tag, value) in replacements {
        debug!("replacing {tag} with {value}");
        out = out.replace(tag, value);
    }
    Ok(out)
}

/// Rewrite the template at `desc.path` in place.
///
/// Nothing is written when a parameter is missing or the tarball format is
/// not supported.
pub fn apply_template(desc: &ManifestDescriptor) -> Result<(), DeffileError> {
    check(desc)?;
    let content =
        fs::read_to_string(&desc.path).map_err(DeffileError::io("read", &desc.path))?;
    let rendered = render_template(&content, desc)?;
    // fs::write truncates an existing file and keeps its mode.
    fs::write(&desc.path, rendered).map_err(DeffileError::io("write", &desc.path))?;
    info!("updated template {}", desc.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpiforge_schema::{DistroIdentity, ImplementationDescriptor, TemplateTags};
    use std::path::PathBuf;

    fn descriptor(path: PathBuf, url: &str) -> ManifestDescriptor {
        ManifestDescriptor {
            path,
            distro: DistroIdentity::new("ubuntu", "20.04", "focal"),
            mpi: Some(ImplementationDescriptor::new("openmpi", "4.0.1", url)),
            tags: TemplateTags {
                version: "OMPIVERSION".to_owned(),
                url: "OMPIURL".to_owned(),
                tarball: "OMPITARBALL".to_owned(),
                ..TemplateTags::default()
            },
            ..ManifestDescriptor::default()
        }
    }

    const TEMPLATE: &str = "Bootstrap: docker\nFrom: ubuntu:DISTROCODENAME\n\n%post\n\
        \texport OMPI_VERSION=OMPIVERSION\n\texport OMPI_URL=\"OMPIURL\"\n\
        \tcd /tmp && wget $OMPI_URL && tar TARARGS OMPITARBALL\n";

    #[test]
    fn replaces_every_tag() {
        let desc = descriptor(
            PathBuf::from("/tmp/t.def"),
            "https://host/openmpi-4.0.1.tar.bz2",
        );
        let out = render_template(TEMPLATE, &desc).unwrap();
        assert_eq!(
            out,
            "Bootstrap: docker\nFrom: ubuntu:focal\n\n%post\n\
             \texport OMPI_VERSION=4.0.1\n\texport OMPI_URL=\"https://host/openmpi-4.0.1.tar.bz2\"\n\
             \tcd /tmp && wget $OMPI_URL && tar -xjf openmpi-4.0.1.tar.bz2\n"
        );
    }

    #[test]
    fn missing_parameters_are_reported_together() {
        let mut desc = descriptor(PathBuf::from("/tmp/t.def"), "");
        desc.tags.tarball.clear();
        let err = render_template(TEMPLATE, &desc).unwrap_err().to_string();
        assert!(err.contains("MPI URL"), "{err}");
        assert!(err.contains("tarball tag"), "{err}");
    }

    #[test]
    fn apply_rewrites_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ubuntu-openmpi.def");
        fs::write(&path, TEMPLATE).unwrap();
        let desc = descriptor(path.clone(), "https://host/openmpi-4.0.1.tar.gz");
        apply_template(&desc).unwrap();
        let out = fs::read_to_string(&path).unwrap();
        assert!(out.contains("tar -xzf openmpi-4.0.1.tar.gz"));
        assert!(!out.contains("TARARGS"));
    }

    #[test]
    fn unsupported_tarball_leaves_template_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.def");
        fs::write(&path, TEMPLATE).unwrap();
        let desc = descriptor(path.clone(), "https://host/openmpi-4.0.1.tar.xz");
        assert!(matches!(
            apply_template(&desc),
            Err(DeffileError::UnsupportedArchive(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), TEMPLATE);
    }

    #[cfg(unix)]
    #[test]
    fn apply_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.def");
        fs::write(&path, TEMPLATE).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let desc = descriptor(path.clone(), "https://host/openmpi-4.0.1.tar");
        apply_template(&desc).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
