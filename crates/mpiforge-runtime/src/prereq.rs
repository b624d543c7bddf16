use mpiforge_schema::SystemConfig;
use std::fmt;

/// A missing host tool with a hint on how to get it.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Tools needed to build and manage images.
pub fn check_build_prereqs(config: &SystemConfig) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    let has_builder = match &config.builder_bin {
        Some(bin) => bin.is_file(),
        None => command_exists("singularity") || command_exists("apptainer"),
    };
    if !has_builder {
        missing.push(MissingPrereq {
            name: "container builder",
            purpose: "building, signing and pushing images",
            install_hint: "install singularity or apptainer, or set builder_bin in the configuration",
        });
    }

    if !config.nopriv && !config.sudo_commands.is_empty() && !config.sudo_bin.is_file() {
        let found = config
            .sudo_bin
            .to_str()
            .is_some_and(command_exists);
        if !found {
            missing.push(MissingPrereq {
                name: "sudo",
                purpose: "running privileged builder commands",
                install_hint: "apt install sudo | dnf install sudo, or enable nopriv mode",
            });
        }
    }

    missing
}

/// Tools needed to find the packages a host-built binary depends on.
pub fn check_bind_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_exists("ldd") {
        missing.push(MissingPrereq {
            name: "ldd",
            purpose: "listing shared libraries of host-built binaries",
            install_hint: "part of glibc (libc-bin)",
        });
    }
    if !command_exists("dpkg") {
        missing.push(MissingPrereq {
            name: "dpkg",
            purpose: "mapping shared libraries onto packages",
            install_hint: "only available on Debian-based hosts",
        });
    }
    missing
}

pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg
}
