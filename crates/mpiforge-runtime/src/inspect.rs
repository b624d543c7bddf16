use mpiforge_schema::{labels, DeploymentModel};
use serde::Serialize;
use std::path::PathBuf;

/// Labels recovered from an image, as written by the definition file generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub distro_name: Option<String>,
    pub distro_version: Option<String>,
    pub mpi_id: Option<String>,
    pub mpi_version: Option<String>,
    pub mpi_dir: Option<String>,
    pub model: Option<DeploymentModel>,
    pub application: Option<String>,
    pub app_exe: Option<String>,
}

impl ImageMetadata {
    /// Parse `inspect` output made of `Key: value` lines. Unknown keys and
    /// lines that are not labels are ignored.
    pub fn parse(path: impl Into<PathBuf>, output: &str) -> Self {
        let mut meta = Self {
            path: path.into(),
            ..Self::default()
        };
        for line in output.lines() {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim() {
                labels::LINUX_DISTRIBUTION => &mut meta.distro_name,
                labels::LINUX_VERSION => &mut meta.distro_version,
                labels::MPI_IMPLEMENTATION => &mut meta.mpi_id,
                labels::MPI_VERSION => &mut meta.mpi_version,
                labels::MPI_DIRECTORY => &mut meta.mpi_dir,
                labels::APPLICATION => &mut meta.application,
                labels::APP_EXE => &mut meta.app_exe,
                labels::MODEL => {
                    meta.model = value.parse().ok();
                    continue;
                }
                _ => continue,
            };
            *slot = Some(value.to_owned());
        }
        meta
    }

    /// `name:version` of the image's distribution, when both are known.
    pub fn distro(&self) -> Option<String> {
        match (&self.distro_name, &self.distro_version) {
            (Some(name), Some(version)) => Some(format!("{name}:{version}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
App_exe: /opt/helloworld
Application: helloworld
Linux_distribution: ubuntu
Linux_version: 20.04
MPI_Directory: /opt/openmpi
MPI_Implementation: openmpi
MPI_Version: 4.0.1
Model: bind
org.label-schema.build-date: Monday_19_October_2026_10:0:0_UTC
org.label-schema.schema-version: 1.0
";

    #[test]
    fn parses_labels() {
        let meta = ImageMetadata::parse("/images/hello.sif", OUTPUT);
        assert_eq!(meta.path, PathBuf::from("/images/hello.sif"));
        assert_eq!(meta.distro().as_deref(), Some("ubuntu:20.04"));
        assert_eq!(meta.mpi_id.as_deref(), Some("openmpi"));
        assert_eq!(meta.mpi_version.as_deref(), Some("4.0.1"));
        assert_eq!(meta.mpi_dir.as_deref(), Some("/opt/openmpi"));
        assert_eq!(meta.model, Some(DeploymentModel::Bind));
        assert_eq!(meta.application.as_deref(), Some("helloworld"));
        assert_eq!(meta.app_exe.as_deref(), Some("/opt/helloworld"));
    }

    #[test]
    fn tolerates_indentation_and_noise() {
        let output = "WARNING: something\n    Model: hybrid\n\tMPI_Version: 3.3\n";
        let meta = ImageMetadata::parse("x.sif", output);
        assert_eq!(meta.model, Some(DeploymentModel::Hybrid));
        assert_eq!(meta.mpi_version.as_deref(), Some("3.3"));
        assert!(meta.mpi_id.is_none());
        assert!(meta.distro().is_none());
    }

    #[test]
    fn empty_output_yields_empty_metadata() {
        let meta = ImageMetadata::parse("x.sif", "");
        assert_eq!(
            meta,
            ImageMetadata {
                path: PathBuf::from("x.sif"),
                ..ImageMetadata::default()
            }
        );
    }
}
