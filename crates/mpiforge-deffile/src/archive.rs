use crate::DeffileError;

/// Compression format of a source tarball, sniffed from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Bzip2,
    Gzip,
    Tar,
}

impl ArchiveFormat {
    pub fn detect(name: &str) -> Option<Self> {
        let (format, _) = split_suffix(name)?;
        Some(format)
    }

    /// Flag handed to `tar` to extract an archive of this format.
    pub fn tar_flag(self) -> &'static str {
        match self {
            Self::Bzip2 => "-xjf",
            Self::Gzip => "-xzf",
            Self::Tar => "-xf",
        }
    }
}

/// Extraction flag for `name`, or an error naming the unsupported archive.
pub fn tar_flag_for(name: &str) -> Result<&'static str, DeffileError> {
    ArchiveFormat::detect(name)
        .map(ArchiveFormat::tar_flag)
        .ok_or_else(|| DeffileError::UnsupportedArchive(name.to_owned()))
}

/// Name of the directory a conventional tarball extracts into
/// (`openmpi-4.0.1.tar.bz2` -> `openmpi-4.0.1`).
pub fn extracted_dir(name: &str) -> Option<&str> {
    split_suffix(name).map(|(_, stem)| stem)
}

const SUFFIXES: [(&str, ArchiveFormat); 4] = [
    (".tar.bz2", ArchiveFormat::Bzip2),
    (".tar.gz", ArchiveFormat::Gzip),
    (".tgz", ArchiveFormat::Gzip),
    (".tar", ArchiveFormat::Tar),
];

fn split_suffix(name: &str) -> Option<(ArchiveFormat, &str)> {
    SUFFIXES.iter().find_map(|(suffix, format)| {
        name.strip_suffix(suffix)
            .filter(|stem| !stem.is_empty())
            .map(|stem| (*format, stem))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_supported_formats() {
        assert_eq!(
            ArchiveFormat::detect("openmpi-4.0.1.tar.bz2"),
            Some(ArchiveFormat::Bzip2)
        );
        assert_eq!(
            ArchiveFormat::detect("mpich-3.3.tar.gz"),
            Some(ArchiveFormat::Gzip)
        );
        assert_eq!(ArchiveFormat::detect("app.tgz"), Some(ArchiveFormat::Gzip));
        assert_eq!(ArchiveFormat::detect("app-1.0.tar"), Some(ArchiveFormat::Tar));
    }

    #[test]
    fn rejects_other_suffixes() {
        assert_eq!(ArchiveFormat::detect("openmpi-4.0.1.tar.xz"), None);
        assert_eq!(ArchiveFormat::detect("openmpi-4.0.1.zip"), None);
        assert_eq!(ArchiveFormat::detect("hello.c"), None);
        assert_eq!(ArchiveFormat::detect(".tar.gz"), None);
    }

    #[test]
    fn tar_flags() {
        assert_eq!(tar_flag_for("a.tar.bz2").unwrap(), "-xjf");
        assert_eq!(tar_flag_for("a.tar.gz").unwrap(), "-xzf");
        assert_eq!(tar_flag_for("a.tgz").unwrap(), "-xzf");
        assert_eq!(tar_flag_for("a.tar").unwrap(), "-xf");
        let err = tar_flag_for("a.rar").unwrap_err();
        assert!(err.to_string().contains("a.rar"));
    }

    #[test]
    fn extracted_dir_strips_suffix() {
        assert_eq!(extracted_dir("openmpi-4.0.1.tar.bz2"), Some("openmpi-4.0.1"));
        assert_eq!(extracted_dir("app.tgz"), Some("app"));
        assert_eq!(extracted_dir("hello.c"), None);
    }
}
