//! Shared-library dependency inspection through `ldd` and `dpkg -S`.

use crate::exec::Invocation;
use mpiforge_deffile::{DependencyInspector, NoDependencies};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Maps a binary's shared libraries onto the Debian packages that ship them.
#[derive(Debug, Clone)]
pub struct LddInspector {
    ldd: PathBuf,
    dpkg: PathBuf,
    timeout: Duration,
}

impl LddInspector {
    pub fn new(ldd: impl Into<PathBuf>, dpkg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ldd: ldd.into(),
            dpkg: dpkg.into(),
            timeout,
        }
    }

    /// Locate `ldd` and `dpkg` on `PATH`.
    pub fn locate(timeout: Duration) -> Option<Self> {
        let ldd = which::which("ldd").ok()?;
        let dpkg = which::which("dpkg").ok()?;
        Some(Self::new(ldd, dpkg, timeout))
    }

    fn owning_packages(&self, library: &Path) -> Vec<String> {
        let result = Invocation::new(&self.dpkg, self.timeout)
            .arg("-S")
            .arg(library.display().to_string())
            .run();
        match result {
            Ok(out) => parse_dpkg_search_output(&out.stdout),
            Err(e) => {
                debug!("no package owns {}: {e}", library.display());
                Vec::new()
            }
        }
    }
}

impl DependencyInspector for LddInspector {
    fn package_dependencies(&self, binary: &Path) -> Vec<String> {
        let output = match Invocation::new(&self.ldd, self.timeout)
            .arg(binary.display().to_string())
            .run()
        {
            Ok(out) => out,
            Err(e) => {
                warn!("cannot list shared libraries of {}: {e}", binary.display());
                return Vec::new();
            }
        };
        let packages: BTreeSet<String> = parse_ldd_output(&output.stdout)
            .iter()
            .flat_map(|lib| self.owning_packages(lib))
            .collect();
        debug!(
            "{} depends on {} package(s)",
            binary.display(),
            packages.len()
        );
        packages.into_iter().collect()
    }
}

/// Resolved library paths from `ldd` output. Virtual and unresolved entries
/// are skipped.
pub fn parse_ldd_output(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let target = match line.split_once("=>") {
                Some((_, rest)) => rest.trim(),
                None => line,
            };
            let path = target.split_whitespace().next()?;
            path.starts_with('/').then(|| PathBuf::from(path))
        })
        .collect()
}

/// Package names from `dpkg -S` output (`libc6:amd64: /lib/.../libc.so.6`),
/// with architecture qualifiers stripped and duplicates removed.
pub fn parse_dpkg_search_output(output: &str) -> Vec<String> {
    let mut packages = BTreeSet::new();
    for line in output.lines() {
        if line.starts_with("diversion by") {
            continue;
        }
        let Some((owners, _path)) = line.split_once(": ") else {
            continue;
        };
        for owner in owners.split(',') {
            let name = owner.trim();
            let name = name.split_once(':').map_or(name, |(pkg, _arch)| pkg);
            if !name.is_empty() {
                packages.insert(name.to_owned());
            }
        }
    }
    packages.into_iter().collect()
}

/// The best inspector this host supports; falls back to one that finds
/// nothing when `ldd` or `dpkg` is missing.
pub fn detect_inspector(timeout: Duration) -> Box<dyn DependencyInspector> {
    match LddInspector::locate(timeout) {
        Some(inspector) => Box::new(inspector),
        None => {
            warn!("ldd or dpkg not found, binary dependencies will not be installed");
            Box::new(NoDependencies)
        }
    }
}
