use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "MPIFORGE_CONFIG";
/// Upper bound for `command_timeout_secs` (one day).
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Host-side settings shared by every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Path to the container builder binary. Looked up on `PATH` when unset.
    #[serde(default)]
    pub builder_bin: Option<PathBuf>,
    #[serde(default = "default_sudo_bin")]
    pub sudo_bin: PathBuf,
    /// Builder subcommands (`build`, `sign`, ...) that must run through sudo.
    #[serde(default)]
    pub sudo_commands: Vec<String>,
    /// Unprivileged mode: build with `--fakeroot` and avoid steps that need root.
    #[serde(default)]
    pub nopriv: bool,
    /// Keep pulled images around and skip pulls that are already satisfied.
    #[serde(default)]
    pub persistent: bool,
    /// Registry images are pushed to.
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Registry-hosted base images keyed by `name:version`.
    #[serde(default)]
    pub library_images: BTreeMap<String, String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            builder_bin: None,
            sudo_bin: default_sudo_bin(),
            sudo_commands: Vec::new(),
            nopriv: false,
            persistent: false,
            registry: None,
            command_timeout_secs: default_command_timeout_secs(),
            library_images: BTreeMap::new(),
        }
    }
}

fn default_sudo_bin() -> PathBuf {
    PathBuf::from("sudo")
}

fn default_command_timeout_secs() -> u64 {
    10
}

impl SystemConfig {
    /// Load the configuration from `$MPIFORGE_CONFIG` or
    /// `~/.config/mpiforge/config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load_default() -> Result<Self, SchemaError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SchemaError> {
        let config: Self = toml::from_str(content).map_err(|source| SchemaError::ParseToml {
            what: "configuration".to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.command_timeout_secs == 0 || self.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
            return Err(SchemaError::InvalidParameter(format!(
                "command_timeout_secs must be between 1 and {MAX_COMMAND_TIMEOUT_SECS}, got {}",
                self.command_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn is_sudo_command(&self, subcommand: &str) -> bool {
        self.sudo_commands.iter().any(|c| c == subcommand)
    }

    /// Timeout for quick host queries such as `ldd`.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Timeout for builder operations (build, pull, sign, push, inspect).
    pub fn builder_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.saturating_mul(2 * 60))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(p));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config/mpiforge/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = SystemConfig::parse("").unwrap();
        assert_eq!(cfg, SystemConfig::default());
        assert_eq!(cfg.sudo_bin, PathBuf::from("sudo"));
        assert_eq!(cfg.command_timeout_secs, 10);
        assert_eq!(cfg.builder_timeout(), Duration::from_secs(1200));
    }

    #[test]
    fn parses_full_config() {
        let cfg = SystemConfig::parse(
            r#"
builder_bin = "/usr/local/bin/singularity"
sudo_commands = ["build", "sign"]
nopriv = true
persistent = true
registry = "library://user/collection"
command_timeout_secs = 3

[library_images]
"ubuntu:20.04" = "library://sylabs/default/ubuntu:20.04"
"#,
        )
        .unwrap();
        assert!(cfg.nopriv);
        assert!(cfg.persistent);
        assert!(cfg.is_sudo_command("build"));
        assert!(!cfg.is_sudo_command("pull"));
        assert_eq!(cfg.query_timeout(), Duration::from_secs(3));
        assert_eq!(
            cfg.library_images.get("ubuntu:20.04").map(String::as_str),
            Some("library://sylabs/default/ubuntu:20.04")
        );
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        for value in ["0", "86401", "100000000000000000", "9223372036854775807"] {
            let err = SystemConfig::parse(&format!("command_timeout_secs = {value}")).unwrap_err();
            assert!(
                matches!(err, SchemaError::InvalidParameter(_)),
                "{value}: {err}"
            );
        }
        let cfg = SystemConfig::parse("command_timeout_secs = 86400").unwrap();
        assert_eq!(cfg.builder_timeout(), Duration::from_secs(86400 * 120));
    }

    #[test]
    fn builder_timeout_saturates() {
        let cfg = SystemConfig {
            command_timeout_secs: u64::MAX,
            ..SystemConfig::default()
        };
        assert_eq!(cfg.builder_timeout(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(SystemConfig::parse("nopirv = true").is_err());
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
