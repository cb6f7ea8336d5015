//! Versioned repository index: resolve `(location, ref)` to a snapshot,
//! extract symbols per file through pluggable grammars, and cut files into
//! bounded chunks that respect symbol boundaries.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use repodex::{Config, Indexer};
//!
//! let indexer = Indexer::new(Config::default());
//! let repo = indexer.open("https://github.com/rust-lang/log", Some("0.4.22"))?;
//! for symbol in repo.symbols_for(Path::new("src/lib.rs"))?.iter() {
//!     println!("{} {}", symbol.kind, symbol.name);
//! }
//! # Ok::<(), repodex::Error>(())
//! ```
pub mod cache;
pub mod chunker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod grammar;
pub mod hasher;
pub mod mapper;
pub mod policy;
pub mod repository;
pub mod snapshot;
pub mod types;

pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind};
pub use crate::grammar::{LanguagePlugin, Registry};
pub use crate::repository::{Indexer, Repository};
pub use crate::snapshot::{Location, Snapshot};
pub use crate::types::{
    Chunk, ChunkMode, FileFailure, FileRecord, Fingerprint, IndexReport, RepositoryIdentity, SplitPart, Symbol,
    SymbolKind,
};
