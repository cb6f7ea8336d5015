//! Core domain types: identities, fingerprints, symbols, chunks, and file records.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Deterministic cache key for one `(location, requested ref)` pair.
/// 64 lowercase hex chars. Newtype prevents mixing with fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryIdentity(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// Content hash of a file's bytes — 64 hex chars, always lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// What sort of structural unit a symbol is. Languages map their own
/// declaration forms onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Class declaration.
    Class,
    /// Constant or static item.
    Constant,
    /// Enumeration.
    Enum,
    /// Free function.
    Function,
    /// Implementation block attaching methods to a type.
    Impl,
    /// Interface or trait.
    Interface,
    /// Function nested in a type or impl.
    Method,
    /// Module or namespace.
    Module,
    /// Markdown heading section.
    Section,
    /// Struct declaration.
    Struct,
    /// Type alias.
    Type,
    /// Variable binding.
    Variable,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "class",
            Self::Constant => "constant",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Impl => "impl",
            Self::Interface => "interface",
            Self::Method => "method",
            Self::Module => "module",
            Self::Section => "section",
            Self::Struct => "struct",
            Self::Type => "type",
            Self::Variable => "variable",
        };
        return f.write_str(name);
    }
}

/// One structural unit extracted from a file.
///
/// `parent` is the index of the enclosing symbol in the same file's list,
/// never an owning pointer, so a file's symbols stay a flat forward-owned vec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Leading documentation text, markers stripped.
    pub docstring: Option<String>,
    /// One-based inclusive last line.
    pub end_line: u32,
    /// Structural kind.
    pub kind: SymbolKind,
    /// Declared name.
    pub name: String,
    /// Index of the enclosing symbol within the same file's list.
    pub parent: Option<usize>,
    /// Declaration header up to the body.
    pub signature: Option<String>,
    /// One-based inclusive first line.
    pub start_line: u32,
}

impl Symbol {
    /// Dot-joined name through all ancestors, e.g. `Config.validate`.
    pub fn qualified_name(&self, file_symbols: &[Self]) -> String {
        let mut parts = vec![self.name.as_str()];
        let mut cursor = self.parent;
        // Bounded by the list length so a malformed cycle cannot spin forever.
        for _ in 0..file_symbols.len() {
            let Some(ancestor) = cursor.and_then(|idx| return file_symbols.get(idx)) else {
                break;
            };
            parts.push(ancestor.name.as_str());
            cursor = ancestor.parent;
        }
        parts.reverse();
        return parts.join(".");
    }

    /// Number of lines spanned, inclusive.
    pub const fn line_count(&self) -> u32 {
        return self.end_line.saturating_sub(self.start_line).saturating_add(1);
    }
}

impl SymbolKind {
    /// Kinds whose nested functions are methods and whose members may be
    /// variables or constants.
    pub const fn is_container(self) -> bool {
        return matches!(self, Self::Class | Self::Impl | Self::Interface | Self::Module);
    }
}

/// How a chunk boundary was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// Whole lines packed up to the budget.
    SizeBounded,
    /// Boundaries seeded at top-level symbol starts.
    SymbolAligned,
}

/// Marks a chunk as one piece of a symbol too large for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPart {
    /// One-based index of this piece.
    pub part: u32,
    /// Name of the symbol that was force-split.
    pub symbol: String,
    /// Total number of pieces the symbol was split into.
    pub total: u32,
}

/// A contiguous slice of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Exact text of the slice.
    pub content: String,
    /// Exclusive end byte offset in the file.
    pub end_byte: usize,
    /// One-based inclusive last line.
    pub end_line: u32,
    /// Mode that produced this chunk.
    pub mode: ChunkMode,
    /// Present when this chunk is one piece of a force-split symbol.
    pub split: Option<SplitPart>,
    /// Start byte offset in the file.
    pub start_byte: usize,
    /// One-based inclusive first line.
    pub start_line: u32,
}

/// One indexed path of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Size of the file in bytes.
    pub byte_len: u64,
    /// Fingerprint of the content seen by this pass.
    pub fingerprint: Fingerprint,
    /// Plugin language name, absent when no plugin claims the file.
    pub language: Option<String>,
    /// Fingerprint held by the cache before this pass, if any.
    pub last_indexed_fingerprint: Option<Fingerprint>,
    /// Path relative to the snapshot root.
    pub path: PathBuf,
    /// True when cached symbols were served without re-parsing.
    pub reused: bool,
    /// Number of symbols extracted.
    pub symbol_count: usize,
}

/// A per-file failure recorded during a snapshot-wide pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Classified failure kind.
    pub kind: ErrorKind,
    /// One-based line of a syntax error, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Reason for parse errors; the rendered error otherwise.
    pub message: String,
    /// Path relative to the snapshot root.
    pub path: PathBuf,
}

impl FileFailure {
    /// Record an error against a path.
    pub fn from_error(path: &Path, err: &Error) -> Self {
        let (line, message) = match err {
            Error::ParseFailed { line, reason, .. } => (Some(*line), reason.clone()),
            Error::InvalidSymbolTree { reason, .. } => (None, reason.clone()),
            other => (None, other.to_string()),
        };
        return Self {
            kind: err.kind(),
            line,
            message,
            path: path.to_path_buf(),
        };
    }

    /// Rebuild an error from a recorded parse failure, for callers that asked
    /// about this one path explicitly.
    pub fn to_error(&self) -> Error {
        return match (self.kind, self.line) {
            (ErrorKind::ParseError, Some(line)) => Error::ParseFailed {
                file: self.path.clone(),
                line,
                reason: self.message.clone(),
            },
            (ErrorKind::ParseError, None) => Error::InvalidSymbolTree {
                file: self.path.clone(),
                reason: self.message.clone(),
            },
            _ => Error::Io(std::io::Error::other(self.message.clone())),
        };
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        return write!(f, ": {}", self.message);
    }
}

/// Outcome of indexing a whole snapshot: successes and failures, both sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files that could not be indexed.
    pub failures: Vec<FileFailure>,
    /// Files indexed successfully.
    pub records: Vec<FileRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, parent: Option<usize>, start: u32, end: u32) -> Symbol {
        return Symbol {
            docstring: None,
            end_line: end,
            kind: SymbolKind::Function,
            name: name.to_string(),
            parent,
            signature: None,
            start_line: start,
        };
    }

    #[test]
    fn qualified_name_walks_ancestors() {
        let symbols = vec![
            symbol("outer", None, 1, 20),
            symbol("Inner", Some(0), 2, 10),
            symbol("method", Some(1), 3, 5),
        ];
        assert_eq!(symbols[2].qualified_name(&symbols), "outer.Inner.method");
        assert_eq!(symbols[0].qualified_name(&symbols), "outer");
    }

    #[test]
    fn line_count_is_inclusive() {
        assert_eq!(symbol("f", None, 4, 4).line_count(), 1);
        assert_eq!(symbol("f", None, 4, 9).line_count(), 6);
    }

    #[test]
    fn parse_failure_round_trips_through_record() {
        let err = Error::ParseFailed {
            file: PathBuf::from("bad.py"),
            line: 3,
            reason: "unexpected `)`".to_string(),
        };
        let failure = FileFailure::from_error(Path::new("bad.py"), &err);
        assert_eq!(failure.kind, ErrorKind::ParseError);
        assert_eq!(failure.to_string(), "bad.py:3: unexpected `)`");
        assert!(matches!(failure.to_error(), Error::ParseFailed { line: 3, .. }));
    }

    #[test]
    fn symbol_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SymbolKind::Interface).unwrap();
        assert_eq!(json, "\"interface\"");
    }
}
