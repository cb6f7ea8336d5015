//! Crate-level error types for repository indexing.
use std::path::PathBuf;

/// Every error names the location, ref, or file it is about so a diagnostic
/// can be rendered without a debugger.
#[allow(clippy::error_impl_error, reason = "crate error type re-exported as repodex::Error")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A local path or remote location does not exist as a file on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying libgit2 failure that is not one of the classified cases.
    #[error("git: {0}")]
    Git(
        /// The wrapped libgit2 error.
        #[from]
        git2::Error,
    ),

    /// A plugin produced symbols that violate ordering or nesting rules.
    #[error("invalid symbol tree in {}: {reason}", file.display())]
    InvalidSymbolTree {
        /// File whose symbols were rejected.
        file: PathBuf,
        /// Which rule was violated.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// The location could not be reached (network, filesystem, or timeout).
    #[error("location unreachable: {location}: {reason}")]
    LocationUnreachable {
        /// Location as given by the caller.
        location: String,
        /// Why it could not be reached.
        reason: String,
    },

    /// A ref was requested for a local path that has no git metadata.
    #[error("not a git repository: {}", path.display())]
    NotAGitRepository {
        /// Local path that was expected to be a repository.
        path: PathBuf,
    },

    /// File content is not valid UTF-8 and cannot be chunked as text.
    #[error("not utf-8 text: {}", path.display())]
    NotUtf8 {
        /// File with undecodable content.
        path: PathBuf,
    },

    /// The grammar rejected the file as syntactically invalid.
    #[error("parse failed: {}:{line}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// One-based line of the first syntax error.
        line: u32,
        /// Description of the parse failure.
        reason: String,
    },

    /// The path is excluded by the ignore policy.
    #[error("path is ignored: {}", path.display())]
    PathIgnored {
        /// Relative path that was rejected.
        path: PathBuf,
    },

    /// The ref does not resolve in the location's git metadata.
    #[error("ref not found: `{reference}` in {location}")]
    RefNotFound {
        /// Location that was searched.
        location: String,
        /// Ref as requested by the caller.
        reference: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No language plugin is registered for this path.
    #[error("no language plugin for {}", path.display())]
    UnsupportedLanguage {
        /// Path that no plugin claimed.
        path: PathBuf,
    },
}

/// Flat classification of [`Error`] for callers that branch on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration could not be loaded.
    Config,
    /// Filesystem or libgit2 failure unrelated to resolution.
    Io,
    /// Remote or local location could not be reached.
    LocationUnreachable,
    /// Ref requested on a path without git metadata.
    NotAGitRepository,
    /// Anything that does not fit the other kinds.
    Other,
    /// A single file could not be parsed.
    ParseError,
    /// Ref does not exist in the location.
    RefNotFound,
    /// No plugin for an explicitly requested path.
    UnsupportedLanguage,
}

impl Error {
    /// Classify this error into the indexing failure taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        return match self {
            Self::FileNotFound { .. } | Self::Io(_) | Self::NotUtf8 { .. } => ErrorKind::Io,
            Self::Git(_) | Self::PathIgnored { .. } => ErrorKind::Other,
            Self::InvalidSymbolTree { .. } | Self::ParseFailed { .. } => ErrorKind::ParseError,
            Self::LocationUnreachable { .. } => ErrorKind::LocationUnreachable,
            Self::NotAGitRepository { .. } => ErrorKind::NotAGitRepository,
            Self::RefNotFound { .. } => ErrorKind::RefNotFound,
            Self::TomlDe(_) => ErrorKind::Config,
            Self::UnsupportedLanguage { .. } => ErrorKind::UnsupportedLanguage,
        };
    }

    /// Whether retrying the same call may succeed without caller changes.
    pub const fn is_retryable(&self) -> bool {
        return matches!(self, Self::LocationUnreachable { .. });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unreachable_is_retryable() {
        let unreachable = Error::LocationUnreachable {
            location: "https://example.invalid/repo".to_string(),
            reason: "timed out".to_string(),
        };
        let missing_ref = Error::RefNotFound {
            location: "repo".to_string(),
            reference: "v9".to_string(),
        };
        assert!(unreachable.is_retryable());
        assert!(!missing_ref.is_retryable());
        assert_eq!(missing_ref.kind(), ErrorKind::RefNotFound);
    }

    #[test]
    fn symbol_tree_violation_is_a_parse_error() {
        let err = Error::InvalidSymbolTree {
            file: PathBuf::from("src/lib.rs"),
            reason: "child escapes parent".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }
}
