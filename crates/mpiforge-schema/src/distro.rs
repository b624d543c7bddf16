use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the Linux distribution used inside the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistroIdentity {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub codename: String,
}

/// Package-manager family of a supported distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Rpm,
}

/// The closed set of distributions definition files can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedDistro {
    Ubuntu,
    Debian,
    Centos,
}

impl SupportedDistro {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "ubuntu" => Some(Self::Ubuntu),
            "debian" => Some(Self::Debian),
            "centos" => Some(Self::Centos),
            _ => None,
        }
    }

    pub fn family(self) -> DistroFamily {
        match self {
            Self::Ubuntu | Self::Debian => DistroFamily::Debian,
            Self::Centos => DistroFamily::Rpm,
        }
    }

    /// Mirror used by debootstrap. Only meaningful for the Debian family.
    pub fn mirror_url(self) -> Option<&'static str> {
        match self {
            Self::Ubuntu => Some("http://us.archive.ubuntu.com/ubuntu/"),
            Self::Debian => Some("http://deb.debian.org/debian/"),
            Self::Centos => None,
        }
    }
}

impl DistroIdentity {
    pub fn new(name: &str, version: &str, codename: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            codename: codename.to_owned(),
        }
    }

    /// Parse a `name:version` descriptor such as `ubuntu:20.04`.
    ///
    /// The codename is filled in from the release table when known and left
    /// empty otherwise.
    pub fn parse(descriptor: &str) -> Option<Self> {
        let (name, version) = descriptor.trim().split_once(':')?;
        if name.is_empty() || version.is_empty() {
            return None;
        }
        let name = name.to_lowercase();
        let codename = release_codename(&name, version).unwrap_or_default();
        Some(Self {
            name,
            version: version.to_owned(),
            codename: codename.to_owned(),
        })
    }

    /// Fill an empty codename from the release table, if the release is known.
    pub fn complete_codename(&mut self) {
        if self.codename.is_empty() {
            if let Some(codename) = release_codename(&self.name.to_lowercase(), &self.version) {
                self.codename = codename.to_owned();
            }
        }
    }

    pub fn supported(&self) -> Option<SupportedDistro> {
        SupportedDistro::from_name(&self.name)
    }

    pub fn family(&self) -> Option<DistroFamily> {
        self.supported().map(SupportedDistro::family)
    }

    /// `name:version`, the key used for registry base image lookups.
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for DistroIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codename.is_empty() {
            write!(f, "{}:{}", self.name, self.version)
        } else {
            write!(f, "{}:{} ({})", self.name, self.version, self.codename)
        }
    }
}

fn release_codename(name: &str, version: &str) -> Option<&'static str> {
    let codename = match (name, version) {
        ("ubuntu", "16.04") => "xenial",
        ("ubuntu", "18.04") => "bionic",
        ("ubuntu", "20.04") => "focal",
        ("ubuntu", "22.04") => "jammy",
        ("ubuntu", "24.04") => "noble",
        ("debian", "9") => "stretch",
        ("debian", "10") => "buster",
        ("debian", "11") => "bullseye",
        ("debian", "12") => "bookworm",
        _ => return None,
    };
    Some(codename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fills_known_codename() {
        let d = DistroIdentity::parse("ubuntu:20.04").unwrap();
        assert_eq!(d.name, "ubuntu");
        assert_eq!(d.version, "20.04");
        assert_eq!(d.codename, "focal");
    }

    #[test]
    fn parse_unknown_release_leaves_codename_empty() {
        let d = DistroIdentity::parse("centos:7").unwrap();
        assert_eq!(d.codename, "");
        assert_eq!(d.family(), Some(DistroFamily::Rpm));
    }

    #[test]
    fn parse_rejects_malformed_descriptors() {
        assert!(DistroIdentity::parse("ubuntu").is_none());
        assert!(DistroIdentity::parse(":20.04").is_none());
        assert!(DistroIdentity::parse("ubuntu:").is_none());
    }

    #[test]
    fn complete_codename_keeps_explicit_value() {
        let mut d = DistroIdentity::new("Ubuntu", "22.04", "");
        d.complete_codename();
        assert_eq!(d.codename, "jammy");
        let mut d = DistroIdentity::new("ubuntu", "22.04", "custom");
        d.complete_codename();
        assert_eq!(d.codename, "custom");
    }

    #[test]
    fn families_of_supported_distros() {
        assert_eq!(
            DistroIdentity::new("ubuntu", "20.04", "focal").family(),
            Some(DistroFamily::Debian)
        );
        assert_eq!(
            DistroIdentity::new("Debian", "12", "bookworm").family(),
            Some(DistroFamily::Debian)
        );
        assert_eq!(
            DistroIdentity::new("centos", "8", "").family(),
            Some(DistroFamily::Rpm)
        );
        assert_eq!(DistroIdentity::new("gentoo", "1", "").family(), None);
    }

    #[test]
    fn mirror_only_for_debian_family() {
        assert!(SupportedDistro::Ubuntu.mirror_url().is_some());
        assert!(SupportedDistro::Debian.mirror_url().is_some());
        assert!(SupportedDistro::Centos.mirror_url().is_none());
    }

    #[test]
    fn display_and_key() {
        let d = DistroIdentity::new("ubuntu", "20.04", "focal");
        assert_eq!(d.to_string(), "ubuntu:20.04 (focal)");
        assert_eq!(d.key(), "ubuntu:20.04");
        assert_eq!(DistroIdentity::new("centos", "7", "").to_string(), "centos:7");
    }
}
