//! The `Repository` handle: one resolved snapshot and everything callers can
//! ask of it.
//!
//! An [`Indexer`] owns the process-scoped state (plugin registry, per-file
//! cache, clone cache) and opens repositories against it. Handles opened from
//! the same indexer share that state, which is what lets a second resolution
//! of an unchanged ref skip every parse.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::Error;
use crate::grammar::Registry;
use crate::hasher;
use crate::mapper::{FileRecords, SymbolMapper};
use crate::snapshot::{Location, Snapshot, SnapshotResolver};
use crate::types::{Chunk, IndexReport, RepositoryIdentity, Symbol};

/// Process-scoped indexing state. Created once, dropped at exit.
#[derive(Debug)]
pub struct Indexer {
    /// Per-file results shared by every opened repository.
    cache: Arc<CacheStore>,
    /// Settings applied to every opened repository.
    config: Config,
    /// Language plugins.
    registry: Arc<Registry>,
    /// Snapshot resolver and its clone cache.
    resolver: SnapshotResolver,
}

impl Indexer {
    /// Indexer with the built-in language plugins.
    pub fn new(config: Config) -> Self {
        return Self::with_registry(config, Registry::with_builtin_languages());
    }

    /// Indexer with a caller-assembled registry.
    pub fn with_registry(config: Config, registry: Registry) -> Self {
        return Self {
            cache: Arc::new(CacheStore::new()),
            resolver: SnapshotResolver::new(config.clone()),
            config,
            registry: Arc::new(registry),
        };
    }

    /// Shared cache, for inspection.
    pub fn cache(&self) -> &CacheStore {
        return &self.cache;
    }

    /// Resolve `location` at `requested_ref` and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns `Error::RefNotFound`, `Error::LocationUnreachable`, or
    /// `Error::NotAGitRepository` when resolution fails.
    pub fn open(&self, location: &str, requested_ref: Option<&str>) -> Result<Repository, Error> {
        let location = Location::parse(location);
        let snapshot = self.resolver.resolve(&location, requested_ref)?;
        let identity = hasher::identity_of(&location, requested_ref);
        let mapper = SymbolMapper::new(
            &snapshot.root,
            identity.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.cache),
            &self.config,
        );
        return Ok(Repository {
            identity,
            mapper,
            snapshot,
        });
    }
}

/// A resolved `(location, ref)` pair.
#[derive(Debug)]
pub struct Repository {
    /// Cache key for this pair.
    identity: RepositoryIdentity,
    /// File-level indexing over the snapshot.
    mapper: SymbolMapper,
    /// Materialized tree and git metadata.
    snapshot: Snapshot,
}

impl Repository {
    /// Open a repository with a private indexer.
    ///
    /// # Errors
    ///
    /// See [`Indexer::open`].
    pub fn open(location: &str, requested_ref: Option<&str>, config: Config) -> Result<Self, Error> {
        return Indexer::new(config).open(location, requested_ref);
    }

    // ── Metadata ────────────────────────────────────────────────────────

    /// Stable identity of this `(location, requested ref)` pair.
    pub const fn identity(&self) -> &RepositoryIdentity {
        return &self.identity;
    }

    /// The resolved snapshot.
    pub const fn snapshot(&self) -> &Snapshot {
        return &self.snapshot;
    }

    /// Full commit sha, absent without git metadata.
    pub fn current_sha(&self) -> Option<&str> {
        return self.snapshot.resolved_commit_sha.as_deref();
    }

    /// Seven-character commit sha.
    pub fn current_sha_short(&self) -> Option<&str> {
        return self.snapshot.short_sha();
    }

    /// Branch name, absent for tags, shas, and detached heads.
    pub fn current_branch(&self) -> Option<&str> {
        return self.snapshot.branch_name.as_deref();
    }

    /// Remote URL, if known.
    pub fn remote_url(&self) -> Option<&str> {
        return self.snapshot.remote_url.as_deref();
    }

    /// Ref as requested.
    pub fn requested_ref(&self) -> Option<&str> {
        return self.snapshot.requested_ref.as_deref();
    }

    /// Absolute root of the snapshot's file tree.
    pub fn root(&self) -> &Path {
        return &self.snapshot.root;
    }

    // ── Files ───────────────────────────────────────────────────────────

    /// Every accepted file, relative to the root, sorted.
    pub fn file_tree(&self) -> Vec<PathBuf> {
        return self.mapper.file_tree();
    }

    /// Whether the ignore policy accepts a relative path.
    pub fn is_path_accepted(&self, path: &Path) -> bool {
        return self.mapper.policy().accepts(path);
    }

    /// Raw bytes of an accepted file.
    ///
    /// # Errors
    ///
    /// See [`SymbolMapper::read_file`].
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>, Error> {
        return self.mapper.read_file(path);
    }

    // ── Symbols and chunks ──────────────────────────────────────────────

    /// Ordered symbols of one file.
    ///
    /// # Errors
    ///
    /// See [`SymbolMapper::symbols_for`].
    pub fn symbols_for(&self, path: &Path) -> Result<Arc<Vec<Symbol>>, Error> {
        return self.mapper.symbols_for(path);
    }

    /// Size-bounded chunks of one file.
    ///
    /// # Errors
    ///
    /// See [`SymbolMapper::chunk_by_lines`].
    pub fn chunk_by_lines(&self, path: &Path, max_lines: usize) -> Result<Vec<Chunk>, Error> {
        return self.mapper.chunk_by_lines(path, max_lines);
    }

    /// Symbol-aligned chunks of one file.
    ///
    /// # Errors
    ///
    /// See [`SymbolMapper::chunk_by_symbols`].
    pub fn chunk_by_symbols(&self, path: &Path, max_lines: usize) -> Result<Vec<Chunk>, Error> {
        return self.mapper.chunk_by_symbols(path, max_lines);
    }

    /// Lazy sequential traversal of the snapshot.
    pub fn index(&self) -> FileRecords<'_> {
        return self.mapper.index();
    }

    /// Parallel traversal collecting records and failures.
    pub fn index_all(&self) -> IndexReport {
        return self.mapper.index_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(cache: &Path) -> Config {
        return Config {
            cache_dir: cache.to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
            ..Config::default()
        };
    }

    #[test]
    fn opening_twice_gives_same_identity_and_symbols() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("m.py"), "class A:\n    def f(self):\n        pass\n").unwrap();
        let location = tree.path().display().to_string();
        let indexer = Indexer::new(config(cache.path()));

        let first = indexer.open(&location, None).unwrap();
        let second = indexer.open(&location, None).unwrap();
        assert_eq!(first.identity(), second.identity());

        let a = first.symbols_for(Path::new("m.py")).unwrap();
        let b = second.symbols_for(Path::new("m.py")).unwrap();
        assert_eq!(serde_json::to_string(&*a).unwrap(), serde_json::to_string(&*b).unwrap());
        assert_eq!(a[1].qualified_name(&a), "A.f");
    }

    #[test]
    fn accessors_without_git_metadata() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("README.md"), "# Title\n\ntext\n").unwrap();
        let repo = Repository::open(&tree.path().display().to_string(), None, config(cache.path())).unwrap();
        assert!(repo.current_sha().is_none());
        assert!(repo.current_sha_short().is_none());
        assert!(repo.current_branch().is_none());
        assert!(repo.remote_url().is_none());
        assert!(repo.requested_ref().is_none());
        assert_eq!(repo.file_tree(), vec![PathBuf::from("README.md")]);
        assert!(repo.is_path_accepted(Path::new("README.md")));
        assert_eq!(repo.read_file(Path::new("README.md")).unwrap(), b"# Title\n\ntext\n");
        assert_eq!(repo.identity().0.len(), 64);
    }
}
