use thiserror::Error;

/// Coarse classification of a [`PackError`]
///
/// Callers use this to decide whether a failure came from the project setup,
/// from the content being packed, from the archiver, from catalog bookkeeping,
/// or from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Content,
    Archiver,
    CrossReference,
    Io,
}

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid version: {0} (must be valid semver: e.g., 1.0.0)")]
    InvalidVersion(String),

    #[error("Address '{0}' cannot contain '[ ]'")]
    InvalidAddress(String),

    #[error("Cannot recognize file type for entry located at '{0}'")]
    UnsupportedFileType(String),

    #[error("Bundle naming conflict: unable to find a unique name for '{0}'")]
    NamingConflict(String),

    #[error("Archiver failed with code {code}: {reason}")]
    Archiver { code: i32, reason: String },

    #[error("Invalid catalog entry: {0}")]
    InvalidLocation(String),

    #[error("Primary key '{0}' already belongs to another location")]
    KeyCollision(String),

    #[error("Could not find location for dependency '{key}' of catalog '{catalog}'")]
    UnresolvedDependency { key: String, catalog: String },

    #[error("Could not find the group that owns location {0}")]
    MissingGroup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Content state error: {0}")]
    ContentState(String),
}

impl PackError {
    /// Which stage of the pipeline this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::Configuration(_)
            | PackError::ConfigParse(_)
            | PackError::InvalidVersion(_) => ErrorKind::Configuration,
            PackError::InvalidAddress(_)
            | PackError::UnsupportedFileType(_)
            | PackError::NamingConflict(_) => ErrorKind::Content,
            PackError::Archiver { .. } => ErrorKind::Archiver,
            PackError::InvalidLocation(_)
            | PackError::KeyCollision(_)
            | PackError::UnresolvedDependency { .. }
            | PackError::MissingGroup(_) => ErrorKind::CrossReference,
            PackError::Io(_) | PackError::Serialization(_) | PackError::ContentState(_) => {
                ErrorKind::Io
            }
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PackError::Configuration(msg.into())
    }
}

impl From<bincode::Error> for PackError {
    fn from(err: bincode::Error) -> Self {
        PackError::ContentState(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PackError::config("missing path").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PackError::InvalidAddress("a[0]".into()).kind(),
            ErrorKind::Content
        );
        assert_eq!(
            PackError::Archiver {
                code: -1,
                reason: "boom".into()
            }
            .kind(),
            ErrorKind::Archiver
        );
        assert_eq!(
            PackError::KeyCollision("k".into()).kind(),
            ErrorKind::CrossReference
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        assert_eq!(PackError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_messages() {
        let err = PackError::UnresolvedDependency {
            key: "dep.bundle".into(),
            catalog: "dlc".into(),
        };
        assert_eq!(
            err.to_string(),
            "Could not find location for dependency 'dep.bundle' of catalog 'dlc'"
        );
    }
}
