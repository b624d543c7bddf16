//! Distribution policy: how to bootstrap, initialize, install packages in
//! and clean up each supported distribution.

use crate::DeffileError;
use mpiforge_schema::{DistroFamily, DistroIdentity, SupportedDistro, SystemConfig};
use std::fmt::Write as _;

const CENTOS_MIRROR: &str = "http://mirror.centos.org/centos-%{OSVERSION}/%{OSVERSION}/os/$basearch/";

/// Resolves a registry-hosted base image for a distribution.
pub trait BaseImageResolver {
    fn library_url(&self, distro: &DistroIdentity) -> Option<String>;
}

/// Resolver for hosts without access to an image library.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLibrary;

impl BaseImageResolver for NoLibrary {
    fn library_url(&self, _distro: &DistroIdentity) -> Option<String> {
        None
    }
}

impl BaseImageResolver for SystemConfig {
    fn library_url(&self, distro: &DistroIdentity) -> Option<String> {
        self.library_images
            .get(&distro.key())
            .filter(|url| !url.is_empty())
            .cloned()
    }
}

fn supported(distro: &DistroIdentity) -> Result<SupportedDistro, DeffileError> {
    distro
        .supported()
        .ok_or_else(|| DeffileError::UnsupportedDistro(distro.name.clone()))
}

/// Emit the bootstrap header of the definition file.
///
/// A registry-hosted base image always wins. Otherwise Debian-family
/// distributions use debootstrap against their mirror, and RPM-family ones use
/// yum, or a docker image when running unprivileged since yum bootstrapping
/// needs real root.
pub fn resolve_bootstrap(
    distro: &DistroIdentity,
    config: &SystemConfig,
    resolver: &dyn BaseImageResolver,
) -> Result<String, DeffileError> {
    if let Some(url) = resolver.library_url(distro) {
        return Ok(format!("Bootstrap: library\nFrom: {url}\n\n"));
    }

    let target = supported(distro)?;
    match target.family() {
        DistroFamily::Debian => {
            if distro.codename.is_empty() {
                return Err(DeffileError::InvalidParameter(format!(
                    "debootstrap of {} {} requires a codename",
                    distro.name, distro.version
                )));
            }
            let mirror = target.mirror_url().unwrap_or_default();
            Ok(format!(
                "Bootstrap: debootstrap\nOSVersion: {}\nMirrorURL: {mirror}\n\n",
                distro.codename
            ))
        }
        DistroFamily::Rpm if config.nopriv => Ok(format!(
            "Bootstrap: docker\nFrom: {}:{}\n\n",
            distro.name, distro.version
        )),
        DistroFamily::Rpm => Ok(format!(
            "Bootstrap: yum\nOSVersion: {}\nMirrorURL: {CENTOS_MIRROR}\nInclude: yum\n\n",
            distro.version
        )),
    }
}

/// Open the `%post` section with the distribution's base toolchain setup.
pub fn resolve_init(
    distro: &DistroIdentity,
    config: &SystemConfig,
) -> Result<String, DeffileError> {
    let target = supported(distro)?;
    let mut out = String::from("%post\n");
    match target.family() {
        DistroFamily::Debian => {
            out.push_str("\tapt-get update && apt-get install -y dash wget git bash gcc gfortran g++ make file software-properties-common\n\n");
            if target == SupportedDistro::Ubuntu {
                out.push_str("\tadd-apt-repository universe\n");
                out.push_str("\tadd-apt-repository multiverse\n");
                out.push_str("\tapt-get update\n\n");
            }
        }
        DistroFamily::Rpm => {
            // rpm --rebuilddb needs real root
            if !config.nopriv {
                out.push_str("\trpm --rebuilddb\n");
            }
            out.push_str("\tyum -y update\n");
            out.push_str(
                "\tyum -y install bash wget tar bzip2 git make gcc gcc-c++ gcc-gfortran\n",
            );
            out.push_str("\tyum clean all\n\n");
        }
    }
    Ok(out)
}

/// Install runtime dependencies. Unknown distributions get nothing.
pub fn resolve_dependency_install(distro: &DistroIdentity, packages: &[String]) -> String {
    let mut out = String::new();
    match distro.family() {
        Some(DistroFamily::Debian) => {
            if !packages.is_empty() {
                let _ = writeln!(out, "\tapt install -y {}", packages.join(" "));
            }
            // Host MPI builds link against libosmcomp.so.3 while Debian ships
            // the unversioned name only.
            if packages.iter().any(|p| p == "libopensm-dev") {
                out.push_str("\tln -s /usr/lib/x86_64-linux-gnu/libosmcomp.so /usr/lib/x86_64-linux-gnu/libosmcomp.so.3\n");
            }
            out.push_str("\tldconfig\n");
        }
        Some(DistroFamily::Rpm) => {
            if !packages.is_empty() {
                let _ = writeln!(out, "\tyum install -y {}", packages.join(" "));
            }
        }
        None => {}
    }
    out
}

pub fn resolve_cleanup(distro: &DistroIdentity) -> String {
    match distro.family() {
        Some(DistroFamily::Debian) => "\tapt-get clean\n".to_owned(),
        Some(DistroFamily::Rpm) => "\tyum clean all\n".to_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ubuntu() -> DistroIdentity {
        DistroIdentity::new("ubuntu", "20.04", "focal")
    }

    fn centos() -> DistroIdentity {
        DistroIdentity::new("centos", "7", "")
    }

    fn count_prefixed(text: &str, prefixes: &[&str]) -> usize {
        text.lines()
            .filter(|l| prefixes.iter().any(|p| l.starts_with(p)))
            .count()
    }

    #[test]
    fn library_image_takes_precedence() {
        let mut cfg = SystemConfig::default();
        cfg.library_images.insert(
            "ubuntu:20.04".to_owned(),
            "library://sylabs/default/ubuntu:20.04".to_owned(),
        );
        let out = resolve_bootstrap(&ubuntu(), &cfg, &cfg).unwrap();
        assert_eq!(
            out,
            "Bootstrap: library\nFrom: library://sylabs/default/ubuntu:20.04\n\n"
        );
    }

    #[test]
    fn library_lookup_for_unsupported_distro_still_bootstraps() {
        let mut cfg = SystemConfig::default();
        cfg.library_images
            .insert("alpine:3.18".to_owned(), "library://alpine:3.18".to_owned());
        let alpine = DistroIdentity::new("alpine", "3.18", "");
        assert!(resolve_bootstrap(&alpine, &cfg, &cfg).is_ok());
        assert!(resolve_bootstrap(&alpine, &cfg, &NoLibrary).is_err());
    }

    #[test]
    fn ubuntu_uses_debootstrap_on_codename() {
        let out = resolve_bootstrap(&ubuntu(), &SystemConfig::default(), &NoLibrary).unwrap();
        assert!(out.starts_with("Bootstrap: debootstrap\n"));
        assert!(out.contains("OSVersion: focal\n"));
        assert!(out.contains("MirrorURL: http://us.archive.ubuntu.com/ubuntu/\n"));
    }

    #[test]
    fn debian_without_codename_is_rejected() {
        let d = DistroIdentity::new("debian", "13", "");
        assert!(matches!(
            resolve_bootstrap(&d, &SystemConfig::default(), &NoLibrary),
            Err(DeffileError::InvalidParameter(_))
        ));
    }

    #[test]
    fn centos_privileged_uses_yum() {
        let out = resolve_bootstrap(&centos(), &SystemConfig::default(), &NoLibrary).unwrap();
        assert!(out.starts_with("Bootstrap: yum\nOSVersion: 7\n"));
        assert!(out.contains("Include: yum"));
    }

    #[test]
    fn centos_unprivileged_uses_docker() {
        let cfg = SystemConfig {
            nopriv: true,
            ..SystemConfig::default()
        };
        let out = resolve_bootstrap(&centos(), &cfg, &NoLibrary).unwrap();
        assert_eq!(out, "Bootstrap: docker\nFrom: centos:7\n\n");
    }

    #[test]
    fn every_strategy_has_one_bootstrap_and_one_source_line() {
        let nopriv = SystemConfig {
            nopriv: true,
            ..SystemConfig::default()
        };
        let cases = [
            (ubuntu(), SystemConfig::default()),
            (DistroIdentity::new("debian", "12", "bookworm"), SystemConfig::default()),
            (centos(), SystemConfig::default()),
            (centos(), nopriv),
        ];
        for (distro, cfg) in &cases {
            let out = resolve_bootstrap(distro, cfg, &NoLibrary).unwrap();
            assert_eq!(count_prefixed(&out, &["Bootstrap:"]), 1, "{out}");
            assert_eq!(count_prefixed(&out, &["From:", "OSVersion:"]), 1, "{out}");
        }
    }

    #[test]
    fn unsupported_distro_fails() {
        let err = resolve_bootstrap(
            &DistroIdentity::new("gentoo", "2.14", ""),
            &SystemConfig::default(),
            &NoLibrary,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unsupported distro: gentoo");
    }

    #[test]
    fn ubuntu_init_enables_extra_repositories() {
        let out = resolve_init(&ubuntu(), &SystemConfig::default()).unwrap();
        assert!(out.starts_with("%post\n\tapt-get update && apt-get install -y"));
        assert!(out.contains("add-apt-repository universe"));
        assert!(out.contains("add-apt-repository multiverse"));
    }

    #[test]
    fn debian_init_skips_ubuntu_repositories() {
        let d = DistroIdentity::new("debian", "12", "bookworm");
        let out = resolve_init(&d, &SystemConfig::default()).unwrap();
        assert!(!out.contains("add-apt-repository"));
    }

    #[test]
    fn centos_init_rebuilds_rpmdb_only_when_privileged() {
        let out = resolve_init(&centos(), &SystemConfig::default()).unwrap();
        assert!(out.contains("\trpm --rebuilddb\n"));
        let cfg = SystemConfig {
            nopriv: true,
            ..SystemConfig::default()
        };
        let out = resolve_init(&centos(), &cfg).unwrap();
        assert!(!out.contains("rpm --rebuilddb"));
        assert!(out.contains("\tyum -y update\n"));
    }

    #[test]
    fn init_of_unsupported_distro_fails() {
        let arch = DistroIdentity::new("arch", "rolling", "");
        assert!(resolve_init(&arch, &SystemConfig::default()).is_err());
    }

    #[test]
    fn debian_dependencies() {
        let pkgs = vec!["libgomp1".to_owned(), "libopensm-dev".to_owned()];
        let out = resolve_dependency_install(&ubuntu(), &pkgs);
        assert!(out.starts_with("\tapt install -y libgomp1 libopensm-dev\n"));
        assert!(out.contains("libosmcomp.so.3"));
        assert!(out.ends_with("\tldconfig\n"));
    }

    #[test]
    fn empty_dependency_list_emits_no_install_line() {
        let out = resolve_dependency_install(&ubuntu(), &[]);
        assert_eq!(out, "\tldconfig\n");
        assert_eq!(resolve_dependency_install(&centos(), &[]), "");
    }

    #[test]
    fn rpm_dependencies() {
        let out = resolve_dependency_install(&centos(), &["libgomp".to_owned()]);
        assert_eq!(out, "\tyum install -y libgomp\n");
    }

    #[test]
    fn unknown_family_is_a_silent_noop() {
        let d = DistroIdentity::new("gentoo", "1", "");
        assert_eq!(resolve_dependency_install(&d, &["x".to_owned()]), "");
        assert_eq!(resolve_cleanup(&d), "");
    }

    #[test]
    fn cleanup_matches_package_manager() {
        assert_eq!(resolve_cleanup(&ubuntu()), "\tapt-get clean\n");
        assert_eq!(resolve_cleanup(&centos()), "\tyum clean all\n");
    }
}
