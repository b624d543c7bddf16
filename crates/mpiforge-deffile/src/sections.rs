//! Section builders.
//!
//! Each builder is a pure function of the manifest descriptor and the
//! application and returns the text of one definition file fragment. Nothing
//! here touches the filesystem.

use crate::archive::{extracted_dir, tar_flag_for};
use crate::DeffileError;
use mpiforge_schema::labels;
use mpiforge_schema::{
    basename, ApplicationDescriptor, DeploymentModel, ImplementationDescriptor, ManifestDescriptor,
    SourceKind, APP_STAGING_DIR,
};
use std::fmt::Write as _;

/// Build directory MPI is compiled in, removed again by `mpi_cleanup`.
pub const MPI_BUILD_DIR: &str = "/opt/build-mpi";

/// Where the application sources end up inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDir {
    /// Fetched into a subdirectory of the staging directory whose name is
    /// discovered at build time and stored in `$APPDIR`.
    Detected,
    /// Copied straight into the staging directory.
    Staged,
}

impl AppDir {
    /// Directory the install command runs in.
    pub fn work_dir(self) -> String {
        match self {
            Self::Detected => format!("{APP_STAGING_DIR}/$APPDIR"),
            Self::Staged => APP_STAGING_DIR.to_owned(),
        }
    }
}

fn line(out: &mut String, text: std::fmt::Arguments<'_>) {
    let _ = writeln!(out, "\t{text}");
}

fn install_dir(desc: &ManifestDescriptor) -> Result<String, DeffileError> {
    if !desc.env.has_install_dir() {
        return Err(DeffileError::InvalidParameter(
            "MPI install directory is not set".to_owned(),
        ));
    }
    Ok(desc.env.install_dir.display().to_string())
}

fn mpi(desc: &ManifestDescriptor) -> Result<&ImplementationDescriptor, DeffileError> {
    let mpi = desc.mpi.as_ref().ok_or_else(|| {
        DeffileError::InvalidParameter("no MPI implementation given".to_owned())
    })?;
    if mpi.version.is_empty() || mpi.url.is_empty() {
        return Err(DeffileError::InvalidParameter(format!(
            "MPI implementation {:?} needs both a version and a URL",
            mpi.id
        )));
    }
    Ok(mpi)
}

pub fn labels(desc: &ManifestDescriptor, app: &ApplicationDescriptor) -> String {
    let mut out = String::from("%labels\n");
    line(&mut out, format_args!("{} {}", labels::LINUX_DISTRIBUTION, desc.distro.name));
    line(&mut out, format_args!("{} {}", labels::LINUX_VERSION, desc.distro.version));
    if let Some(mpi) = &desc.mpi {
        line(&mut out, format_args!("{} {}", labels::MPI_IMPLEMENTATION, mpi.id));
        line(&mut out, format_args!("{} {}", labels::MPI_VERSION, mpi.version));
    }
    if desc.env.has_install_dir() {
        line(
            &mut out,
            format_args!("{} {}", labels::MPI_DIRECTORY, desc.env.install_dir.display()),
        );
    }
    if let Some(model) = desc.model.label() {
        line(&mut out, format_args!("{} {model}", labels::MODEL));
    }
    line(&mut out, format_args!("{} {}", labels::APPLICATION, app.name));
    // The bind model copies the host binary into the staging directory.
    let exe = match desc.model {
        DeploymentModel::Bind => app.default_exe_path(),
        DeploymentModel::Hybrid | DeploymentModel::Basic => app.exe_path(),
    };
    line(&mut out, format_args!("{} {exe}", labels::APP_EXE));
    out.push('\n');
    out
}

/// `%files` block copying host files into the staging directory.
///
/// Empty for a hybrid build whose sources are fetched over the network.
pub fn files(
    desc: &ManifestDescriptor,
    app: &ApplicationDescriptor,
) -> Result<String, DeffileError> {
    let src = match desc.model {
        DeploymentModel::Bind => app.configured_bin_path().ok_or_else(|| {
            DeffileError::InvalidParameter(format!(
                "binary path of {} is required for the bind model",
                app.name
            ))
        })?,
        DeploymentModel::Hybrid if app.source_kind() != SourceKind::File => {
            return Ok(String::new())
        }
        DeploymentModel::Hybrid | DeploymentModel::Basic => app.local_source(),
    };
    Ok(format!("%files\n\t{src} {APP_STAGING_DIR}\n\n"))
}

pub fn environment(desc: &ManifestDescriptor) -> Result<String, DeffileError> {
    let dir = install_dir(desc)?;
    Ok(format!(
        "%environment\n\tMPI_DIR={dir}\n\texport MPI_DIR\n\texport PATH=$MPI_DIR/bin:$PATH\n\texport LD_LIBRARY_PATH=$MPI_DIR/lib:$LD_LIBRARY_PATH\n\n"
    ))
}

/// Download, configure and install MPI from its source tarball.
pub fn mpi_install(desc: &ManifestDescriptor) -> Result<String, DeffileError> {
    let mpi = mpi(desc)?;
    let dir = install_dir(desc)?;
    let tarball = mpi.tarball();
    let flag = tar_flag_for(tarball)?;
    let src_dir = extracted_dir(tarball).unwrap_or(tarball);

    let mut out = String::new();
    line(&mut out, format_args!("export MPI_VERSION={}", mpi.version));
    line(&mut out, format_args!("export MPI_URL=\"{}\"", mpi.url));
    line(&mut out, format_args!("export MPI_DIR={dir}"));
    line(&mut out, format_args!("export MPI_BUILDDIR={MPI_BUILD_DIR}"));
    line(&mut out, format_args!("mkdir -p $MPI_BUILDDIR\n"));
    line(
        &mut out,
        format_args!("cd $MPI_BUILDDIR && wget $MPI_URL && tar {flag} {tarball}"),
    );
    line(
        &mut out,
        format_args!(
            "cd $MPI_BUILDDIR/{src_dir} && ./configure --prefix=$MPI_DIR && make -j8 install"
        ),
    );
    line(&mut out, format_args!("export PATH=$MPI_DIR/bin:$PATH"));
    line(
        &mut out,
        format_args!("export LD_LIBRARY_PATH=$MPI_DIR/lib:$LD_LIBRARY_PATH"),
    );
    line(&mut out, format_args!("export MANPATH=$MPI_DIR/share/man:$MANPATH\n"));
    Ok(out)
}

/// Fetch the application sources.
///
/// Must run before anything else lands in the staging directory: the
/// download directory is detected as the first subdirectory found there.
pub fn app_download(app: &ApplicationDescriptor) -> Result<(String, AppDir), DeffileError> {
    let mut out = String::new();
    match app.source_kind() {
        SourceKind::Git => {
            line(
                &mut out,
                format_args!("cd {APP_STAGING_DIR} && git clone {}", app.source),
            );
        }
        SourceKind::Http => {
            let tarball = basename(&app.source);
            let flag = tar_flag_for(tarball)?;
            line(
                &mut out,
                format_args!(
                    "cd {APP_STAGING_DIR} && wget {} && tar {flag} {tarball}",
                    app.source
                ),
            );
        }
        SourceKind::File => return Ok((out, AppDir::Staged)),
    }
    line(
        &mut out,
        format_args!("APPDIR=`ls -l {APP_STAGING_DIR} | egrep '^d' | head -1 | awk '{{print $9}}'`\n"),
    );
    Ok((out, AppDir::Detected))
}

/// Build and install the application, then link its binary into the
/// staging directory. The link is allowed to fail.
pub fn app_install(app: &ApplicationDescriptor, dir: AppDir) -> String {
    let work_dir = dir.work_dir();
    let mut out = String::new();
    match app.source_kind() {
        SourceKind::Git | SourceKind::Http => {
            line(
                &mut out,
                format_args!("cd {work_dir} && {}", app.install_command()),
            );
        }
        SourceKind::File => {
            let src = format!("{APP_STAGING_DIR}/{}", app.source_basename());
            match (app.configured_bin_path(), app.configured_install_cmd()) {
                (Some(bin), _) => {
                    line(&mut out, format_args!("cd {work_dir} && mpicc -o {bin} {src}"));
                }
                (None, Some(cmd)) => line(&mut out, format_args!("cd {work_dir} && {cmd}")),
                (None, None) => line(
                    &mut out,
                    format_args!("cd {work_dir} && mpicc -o {} {src}", app.default_exe_path()),
                ),
            }
        }
    }
    let target = match dir {
        AppDir::Detected => format!("$APPDIR/{}", app.bin_name),
        AppDir::Staged => app.exe_path(),
    };
    line(
        &mut out,
        format_args!(
            "cd {APP_STAGING_DIR} && ln -s {target} {} 2> /dev/null || true\n",
            app.bin_name
        ),
    );
    out
}

/// Remove the MPI build tree. Only hybrid builds have one.
pub fn mpi_cleanup(desc: &ManifestDescriptor) -> String {
    match desc.model {
        DeploymentModel::Hybrid => "\n\trm -rf $MPI_BUILDDIR\n\n".to_owned(),
        DeploymentModel::Bind | DeploymentModel::Basic => String::new(),
    }
}

/// Create the directory the host MPI is mounted on.
pub fn mpi_mount_dir(desc: &ManifestDescriptor) -> Result<String, DeffileError> {
    let dir = install_dir(desc)?;
    Ok(format!("\tmkdir -p {dir}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpiforge_schema::{BuildEnvironment, DistroIdentity};
    use std::path::PathBuf;

    fn descriptor(model: DeploymentModel, url: &str) -> ManifestDescriptor {
        ManifestDescriptor {
            path: PathBuf::from("/tmp/test.def"),
            distro: DistroIdentity::new("ubuntu", "20.04", "focal"),
            mpi: Some(ImplementationDescriptor::new("openmpi", "4.0.1", url)),
            env: BuildEnvironment {
                install_dir: PathBuf::from("/opt/openmpi"),
                ..BuildEnvironment::default()
            },
            model,
            ..ManifestDescriptor::default()
        }
    }

    fn app(source: &str) -> ApplicationDescriptor {
        ApplicationDescriptor {
            name: "helloworld".to_owned(),
            bin_name: "helloworld".to_owned(),
            bin_path: None,
            source: source.to_owned(),
            install_cmd: None,
        }
    }

    const OMPI_GZ: &str = "https://download.open-mpi.org/release/open-mpi/v4.0/openmpi-4.0.1.tar.gz";

    #[test]
    fn labels_for_bind_model() {
        let mut a = app("file:///home/user/helloworld.c");
        a.bin_path = Some("/home/user/helloworld".to_owned());
        let out = labels(&descriptor(DeploymentModel::Bind, OMPI_GZ), &a);
        assert_eq!(
            out,
            "%labels\n\
             \tLinux_distribution ubuntu\n\
             \tLinux_version 20.04\n\
             \tMPI_Implementation openmpi\n\
             \tMPI_Version 4.0.1\n\
             \tMPI_Directory /opt/openmpi\n\
             \tModel bind\n\
             \tApplication helloworld\n\
             \tApp_exe /opt/helloworld\n\n"
        );
    }

    #[test]
    fn hybrid_label_keeps_explicit_bin_path() {
        let mut a = app("https://github.com/org/helloworld.git");
        a.bin_path = Some("/usr/local/bin/helloworld".to_owned());
        let out = labels(&descriptor(DeploymentModel::Hybrid, OMPI_GZ), &a);
        assert!(out.contains("\tApp_exe /usr/local/bin/helloworld\n"));
        assert!(out.contains("\tModel hybrid\n"));
    }

    #[test]
    fn basic_labels_omit_mpi_and_model() {
        let desc = ManifestDescriptor {
            distro: DistroIdentity::new("centos", "7", ""),
            model: DeploymentModel::Basic,
            ..ManifestDescriptor::default()
        };
        let out = labels(&desc, &app("/tmp/helloworld.c"));
        assert!(!out.contains("MPI_"));
        assert!(!out.contains("Model"));
        assert!(out.contains("\tApp_exe /opt/helloworld\n"));
    }

    #[test]
    fn bind_files_copies_host_binary() {
        let mut a = app("file:///home/user/helloworld.c");
        a.bin_path = Some("/home/user/helloworld".to_owned());
        let out = files(&descriptor(DeploymentModel::Bind, OMPI_GZ), &a).unwrap();
        assert_eq!(out, "%files\n\t/home/user/helloworld /opt\n\n");
    }

    #[test]
    fn bind_files_requires_bin_path() {
        let err = files(
            &descriptor(DeploymentModel::Bind, OMPI_GZ),
            &app("/tmp/helloworld.c"),
        )
        .unwrap_err();
        assert!(matches!(err, DeffileError::InvalidParameter(_)));
    }

    #[test]
    fn hybrid_files_only_for_local_sources() {
        let desc = descriptor(DeploymentModel::Hybrid, OMPI_GZ);
        let out = files(&desc, &app("file:///home/user/helloworld.c")).unwrap();
        assert_eq!(out, "%files\n\t/home/user/helloworld.c /opt\n\n");
        let out = files(&desc, &app("https://github.com/org/helloworld.git")).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn environment_exports_mpi_paths() {
        let out = environment(&descriptor(DeploymentModel::Bind, OMPI_GZ)).unwrap();
        assert!(out.starts_with("%environment\n\tMPI_DIR=/opt/openmpi\n"));
        assert!(out.contains("\texport LD_LIBRARY_PATH=$MPI_DIR/lib:$LD_LIBRARY_PATH\n"));
    }

    #[test]
    fn environment_requires_install_dir() {
        let mut desc = descriptor(DeploymentModel::Bind, OMPI_GZ);
        desc.env.install_dir = PathBuf::new();
        assert!(environment(&desc).is_err());
        assert!(mpi_mount_dir(&desc).is_err());
    }

    #[test]
    fn mpi_install_from_gzip_tarball() {
        let out = mpi_install(&descriptor(DeploymentModel::Hybrid, OMPI_GZ)).unwrap();
        assert!(out.starts_with("\texport MPI_VERSION=4.0.1\n"));
        assert!(out.contains(&format!("\texport MPI_URL=\"{OMPI_GZ}\"\n")));
        assert!(out.contains("\texport MPI_BUILDDIR=/opt/build-mpi\n\tmkdir -p $MPI_BUILDDIR\n\n"));
        assert!(out.contains("tar -xzf openmpi-4.0.1.tar.gz\n"));
        assert!(out.contains(
            "\tcd $MPI_BUILDDIR/openmpi-4.0.1 && ./configure --prefix=$MPI_DIR && make -j8 install\n"
        ));
        assert!(out.ends_with("\texport MANPATH=$MPI_DIR/share/man:$MANPATH\n\n"));
    }

    #[test]
    fn mpi_install_build_dir_follows_tarball_name() {
        let desc = descriptor(
            DeploymentModel::Hybrid,
            "http://www.mpich.org/static/downloads/3.3/mpich-3.3.tar.gz",
        );
        let out = mpi_install(&desc).unwrap();
        assert!(out.contains("cd $MPI_BUILDDIR/mpich-3.3 &&"));
    }

    #[test]
    fn mpi_install_rejects_unknown_archive() {
        let desc = descriptor(DeploymentModel::Hybrid, "https://host/openmpi-4.0.1.zip");
        assert!(matches!(
            mpi_install(&desc),
            Err(DeffileError::UnsupportedArchive(name)) if name == "openmpi-4.0.1.zip"
        ));
    }

    #[test]
    fn mpi_install_requires_version_and_url() {
        let desc = descriptor(DeploymentModel::Hybrid, "");
        assert!(matches!(
            mpi_install(&desc),
            Err(DeffileError::InvalidParameter(_))
        ));
        let mut desc = descriptor(DeploymentModel::Hybrid, OMPI_GZ);
        desc.mpi = None;
        assert!(mpi_install(&desc).is_err());
    }

    #[test]
    fn git_download_detects_app_dir() {
        let (out, dir) = app_download(&app("https://github.com/org/helloworld.git")).unwrap();
        assert_eq!(dir, AppDir::Detected);
        assert!(out.starts_with("\tcd /opt && git clone https://github.com/org/helloworld.git\n"));
        assert!(out.contains(
            "\tAPPDIR=`ls -l /opt | egrep '^d' | head -1 | awk '{print $9}'`\n\n"
        ));
    }

    #[test]
    fn http_download_sniffs_archive() {
        let (out, dir) = app_download(&app("http://host/helloworld-1.0.tar.bz2")).unwrap();
        assert_eq!(dir, AppDir::Detected);
        assert!(out.contains(
            "wget http://host/helloworld-1.0.tar.bz2 && tar -xjf helloworld-1.0.tar.bz2\n"
        ));
        assert!(app_download(&app("http://host/helloworld.zip")).is_err());
    }

    #[test]
    fn file_download_is_empty() {
        let (out, dir) = app_download(&app("/tmp/helloworld.c")).unwrap();
        assert!(out.is_empty());
        assert_eq!(dir, AppDir::Staged);
    }

    #[test]
    fn install_of_fetched_sources() {
        let mut a = app("https://github.com/org/helloworld.git");
        let out = app_install(&a, AppDir::Detected);
        assert_eq!(
            out,
            "\tcd /opt/$APPDIR && make install\n\tcd /opt && ln -s $APPDIR/helloworld helloworld 2> /dev/null || true\n\n"
        );
        a.install_cmd = Some("make -j4 all install".to_owned());
        assert!(app_install(&a, AppDir::Detected)
            .starts_with("\tcd /opt/$APPDIR && make -j4 all install\n"));
    }

    #[test]
    fn install_of_local_source_file() {
        let mut a = app("file:///home/user/helloworld.c");
        let out = app_install(&a, AppDir::Staged);
        assert!(out.starts_with("\tcd /opt && mpicc -o /opt/helloworld /opt/helloworld.c\n"));
        assert!(out.ends_with(" 2> /dev/null || true\n\n"));

        a.install_cmd = Some("make".to_owned());
        assert!(app_install(&a, AppDir::Staged).starts_with("\tcd /opt && make\n"));

        a.bin_path = Some("/usr/local/bin/helloworld".to_owned());
        let out = app_install(&a, AppDir::Staged);
        assert!(
            out.starts_with("\tcd /opt && mpicc -o /usr/local/bin/helloworld /opt/helloworld.c\n")
        );
        assert!(out.contains("ln -s /usr/local/bin/helloworld helloworld"));
    }

    #[test]
    fn cleanup_only_for_hybrid() {
        assert_eq!(
            mpi_cleanup(&descriptor(DeploymentModel::Hybrid, OMPI_GZ)),
            "\n\trm -rf $MPI_BUILDDIR\n\n"
        );
        assert!(mpi_cleanup(&descriptor(DeploymentModel::Bind, OMPI_GZ)).is_empty());
    }

    #[test]
    fn mount_dir() {
        assert_eq!(
            mpi_mount_dir(&descriptor(DeploymentModel::Bind, OMPI_GZ)).unwrap(),
            "\tmkdir -p /opt/openmpi\n\n"
        );
    }
}
