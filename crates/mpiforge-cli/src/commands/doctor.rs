use super::{EXIT_FAILURE, EXIT_SUCCESS};
use mpiforge_runtime::{check_bind_prereqs, check_build_prereqs, format_missing, Builder};
use mpiforge_schema::{default_config_path, SystemConfig};
use std::path::Path;

pub fn run(
    config: Result<SystemConfig, String>,
    config_path: Option<&Path>,
    json_output: bool,
) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let path = config_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);
    let config = match config {
        Ok(c) => {
            let msg = match &path {
                Some(p) if p.exists() => format!("Configuration loaded from {}", p.display()),
                _ => "No configuration file, using defaults".to_owned(),
            };
            checks.push(Check::pass("config", &msg));
            c
        }
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("config", &format!("Invalid configuration: {e}")));
            SystemConfig::default()
        }
    };

    check_builder(&config, &mut checks, &mut all_pass);
    check_bind_tools(&mut checks);
    check_privileges(&config, &mut checks);
    if !config.library_images.is_empty() {
        checks.push(Check::info(
            "library_images",
            &format!(
                "{} distro(s) bootstrap from library images",
                config.library_images.len()
            ),
        ));
    }
    if let Ok(cwd) = std::env::current_dir() {
        check_disk_space(&cwd, &mut checks);
    }

    print_results(&checks, all_pass, json_output)
}

fn check_builder(config: &SystemConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_build_prereqs(config);
    if missing.is_empty() {
        checks.push(Check::pass("build_prereqs", "Build prerequisites satisfied"));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "build_prereqs",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
        return;
    }

    match Builder::from_config(config).and_then(|b| b.version().map(|v| (b, v))) {
        Ok((builder, version)) => checks.push(Check::pass(
            "builder_version",
            &format!("{} {version}", builder.binary().display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "builder_version",
                &format!("Cannot query builder version: {e}"),
            ));
        }
    }
}

fn check_bind_tools(checks: &mut Vec<Check>) {
    let missing = check_bind_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass(
            "bind_prereqs",
            "ldd and dpkg available for binary dependency detection",
        ));
    } else {
        checks.push(Check::warn(
            "bind_prereqs",
            &format!(
                "Host binary dependencies will not be installed: {}",
                format_missing(&missing)
            ),
        ));
    }
}

fn check_privileges(config: &SystemConfig, checks: &mut Vec<Check>) {
    let msg = if config.nopriv {
        "Unprivileged mode: builds use --fakeroot".to_owned()
    } else if config.sudo_commands.is_empty() {
        "Builder commands run without sudo".to_owned()
    } else {
        format!(
            "{} used for: {}",
            config.sudo_bin.display(),
            config.sudo_commands.join(", ")
        )
    };
    checks.push(Check::info("privileges", &msg));
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("mpiforge doctor\n");
        for check in checks {
            let icon = match check.status.as_str() {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: String,
    message: String,
}

impl Check {
    fn new(name: &str, status: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: status.to_owned(),
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

// Images land next to the working directory by default.
fn check_disk_space(dir: &Path, checks: &mut Vec<Check>) {
    let Ok(c_path) = std::ffi::CString::new(dir.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: statvfs with a valid, NUL-terminated path and a zeroed output
    // struct is well-defined; the struct is only read when ret == 0.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    let avail_mb = (stat.f_bavail * stat.f_frsize) / (1024 * 1024);

    if avail_mb < 1024 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Disk space: {avail_mb} MB available, images need several GB"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}
