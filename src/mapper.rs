//! Symbol mapper: walks a snapshot, dispatches files to language plugins,
//! and serves symbols and chunks through the per-file cache.
//!
//! Traversal is lexicographic by relative path. Per-file failures are
//! returned as data next to the successes; nothing in one file can abort the
//! walk over the others.
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cache::{CacheEntry, CacheStore, Lookup};
use crate::chunker;
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::grammar::{LanguagePlugin, Registry};
use crate::hasher;
use crate::policy::IgnorePolicy;
use crate::types::{Chunk, FileFailure, FileRecord, Fingerprint, IndexReport, RepositoryIdentity, Symbol};

/// File bytes plus the cache lookup they produced.
struct Loaded {
    /// Raw file content.
    bytes: Vec<u8>,
    /// Cache outcome for the content's fingerprint.
    lookup: Lookup,
    /// True when no plugin ran for this request.
    reused: bool,
}

/// Indexes one snapshot root under one identity.
#[derive(Debug)]
pub struct SymbolMapper {
    /// Shared per-file cache.
    cache: Arc<CacheStore>,
    /// Line budget for the chunks stored alongside symbols.
    chunk_budget: usize,
    /// Identity the cache entries are keyed under.
    identity: RepositoryIdentity,
    /// Accept/reject decisions for paths under `root`.
    policy: IgnorePolicy,
    /// Language dispatch.
    registry: Arc<Registry>,
    /// Absolute snapshot root.
    root: PathBuf,
    /// Worker threads for [`SymbolMapper::index_all`]; 0 uses the global pool.
    threads: usize,
}

impl SymbolMapper {
    /// Mapper for the tree at `root`.
    pub fn new(
        root: &Path,
        identity: RepositoryIdentity,
        registry: Arc<Registry>,
        cache: Arc<CacheStore>,
        config: &Config,
    ) -> Self {
        return Self {
            cache,
            chunk_budget: config.max_lines.max(1),
            identity,
            policy: IgnorePolicy::new(root, config),
            registry,
            root: root.to_path_buf(),
            threads: config.threads,
        };
    }

    /// Ignore policy bound to this snapshot.
    pub const fn policy(&self) -> &IgnorePolicy {
        return &self.policy;
    }

    /// Lazy traversal yielding one result per accepted file, in path order.
    /// Each call starts an independent walk.
    pub fn index(&self) -> FileRecords<'_> {
        return FileRecords {
            files: Box::new(self.accepted_files()),
            mapper: self,
        };
    }

    /// Index every accepted file in parallel. Records and failures are both
    /// sorted by path, so output is identical to draining [`Self::index`].
    pub fn index_all(&self) -> IndexReport {
        let mut report = IndexReport::default();
        let mut paths = Vec::new();
        for item in self.accepted_files() {
            match item {
                Ok(path) => paths.push(path),
                Err(failure) => report.failures.push(failure),
            }
        }

        let run = || {
            return paths
                .par_iter()
                .map(|path| return self.record_for(path))
                .collect::<Vec<_>>();
        };
        let outcomes = match self.dedicated_pool() {
            Some(pool) => pool.install(run),
            None => run(),
        };

        for outcome in outcomes {
            match outcome {
                Ok(record) => report.records.push(record),
                Err(failure) => report.failures.push(failure),
            }
        }
        report.records.sort_by(|a, b| return a.path.cmp(&b.path));
        report.failures.sort_by(|a, b| return a.path.cmp(&b.path));
        tracing::info!(
            records = report.records.len(),
            failures = report.failures.len(),
            root = %self.root.display(),
            "indexed snapshot"
        );
        return report;
    }

    /// Relative paths of every accepted file, in traversal order.
    /// Walk errors are logged and skipped.
    pub fn file_tree(&self) -> Vec<PathBuf> {
        return self
            .accepted_files()
            .filter_map(|item| {
                return item
                    .map_err(|failure| {
                        tracing::warn!(%failure, "walk error");
                        return failure;
                    })
                    .ok();
            })
            .collect();
    }

    /// Raw bytes of one accepted file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` or `Error::PathIgnored` for paths outside
    /// the accepted tree, `Error::Io` if reading fails.
    pub fn read_file(&self, path: &Path) -> Result<Vec<u8>, Error> {
        let relative = self.checked_relative(path)?;
        return Ok(std::fs::read(self.root.join(relative))?);
    }

    /// Ordered symbols of one file.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedLanguage` when no plugin claims the path,
    /// `Error::ParseFailed`/`Error::InvalidSymbolTree` when it cannot be
    /// parsed, and the errors of [`Self::read_file`].
    pub fn symbols_for(&self, path: &Path) -> Result<Arc<Vec<Symbol>>, Error> {
        let relative = self.checked_relative(path)?;
        let loaded = self.load(&relative)?;
        let entry = &loaded.lookup.entry;
        if entry.language.is_none() {
            return Err(Error::UnsupportedLanguage { path: relative });
        }
        return entry.symbols.clone().map_err(|failure| return failure.to_error());
    }

    /// Size-bounded chunks of one file.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotUtf8` for binary content and the errors of [`Self::read_file`].
    pub fn chunk_by_lines(&self, path: &Path, max_lines: usize) -> Result<Vec<Chunk>, Error> {
        let relative = self.checked_relative(path)?;
        let bytes = std::fs::read(self.root.join(&relative))?;
        let text = as_text(&relative, &bytes)?;
        return Ok(chunker::chunk_by_size(text, max_lines));
    }

    /// Symbol-aligned chunks of one file. Files no plugin claims are chunked
    /// with no symbols, which packs whole lines.
    ///
    /// # Errors
    ///
    /// Returns parse errors as [`Self::symbols_for`] does, `Error::NotUtf8`
    /// for binary content, and the errors of [`Self::read_file`].
    pub fn chunk_by_symbols(&self, path: &Path, max_lines: usize) -> Result<Vec<Chunk>, Error> {
        let relative = self.checked_relative(path)?;
        let loaded = self.load(&relative)?;
        let text = as_text(&relative, &loaded.bytes)?;
        let entry = &loaded.lookup.entry;
        let symbols = entry.symbols.as_ref().map_err(|failure| return failure.to_error())?;
        let budget = max_lines.max(1);
        if entry.chunk_budget == budget {
            return Ok(entry.chunks.as_ref().clone());
        }
        return Ok(chunker::chunk_by_symbols(text, symbols, budget));
    }

    // ── Traversal ───────────────────────────────────────────────────────

    /// Lazily walk the root, pruning rejected directories and skipping
    /// rejected files before they are opened.
    fn accepted_files(&self) -> impl Iterator<Item = Result<PathBuf, FileFailure>> + '_ {
        let root = &self.root;
        return WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                return self.policy.accepts_dir(relative);
            })
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err.path().map_or_else(PathBuf::new, |p| {
                            return p.strip_prefix(root).unwrap_or(p).to_path_buf();
                        });
                        return Some(Err(FileFailure {
                            kind: ErrorKind::Io,
                            line: None,
                            message: err.to_string(),
                            path,
                        }));
                    },
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
                let byte_len = entry.metadata().map_or(0, |m| return m.len());
                if !self.policy.accepts_file(&relative, byte_len) {
                    tracing::debug!(path = %relative.display(), "skipped by ignore policy");
                    return None;
                }
                return Some(Ok(relative));
            });
    }

    /// Rayon pool sized by the configured thread count, if one was asked for.
    fn dedicated_pool(&self) -> Option<rayon::ThreadPool> {
        if self.threads == 0 {
            return None;
        }
        return rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| return format!("repodex-index-{i}"))
            .build()
            .map_err(|err| {
                tracing::warn!(%err, "falling back to the global thread pool");
                return err;
            })
            .ok();
    }

    // ── Per-file work ───────────────────────────────────────────────────

    /// Index one accepted file into a record or a failure.
    fn record_for(&self, relative: &Path) -> Result<FileRecord, FileFailure> {
        let loaded = self.load(relative).map_err(|err| {
            tracing::warn!(path = %relative.display(), %err, "failed to read file");
            return FileFailure::from_error(relative, &err);
        })?;
        let entry = &loaded.lookup.entry;
        let symbols = entry.symbols.as_ref().map_err(Clone::clone)?;
        return Ok(FileRecord {
            byte_len: u64::try_from(loaded.bytes.len()).unwrap_or(u64::MAX),
            fingerprint: entry.fingerprint.clone(),
            language: entry.language.clone(),
            last_indexed_fingerprint: loaded.lookup.previous.clone(),
            path: relative.to_path_buf(),
            reused: loaded.reused,
            symbol_count: symbols.len(),
        });
    }

    /// Read a file and fetch or compute its cache entry.
    fn load(&self, relative: &Path) -> Result<Loaded, Error> {
        let bytes = std::fs::read(self.root.join(relative))?;
        let fingerprint = hasher::fingerprint_of(&bytes);
        let plugin = self.registry.plugin_for(relative, &bytes);
        let mut shared = false;
        let lookup = self.cache.get_or_compute(&self.identity, relative, &fingerprint, || {
            return self.compute_entry(relative, &bytes, &fingerprint, plugin.as_deref(), &mut shared);
        });
        return Ok(Loaded {
            reused: lookup.reused || shared,
            bytes,
            lookup,
        });
    }

    /// Build the complete cache entry for one version of a file.
    fn compute_entry(
        &self,
        relative: &Path,
        bytes: &[u8],
        fingerprint: &Fingerprint,
        plugin: Option<&dyn LanguagePlugin>,
        shared: &mut bool,
    ) -> CacheEntry {
        let symbols = match plugin {
            Some(plugin) => self.parse(plugin, relative, bytes, fingerprint, shared),
            None => {
                tracing::debug!(path = %relative.display(), "no language plugin");
                Ok(Arc::new(Vec::new()))
            },
        };
        let chunks = match (std::str::from_utf8(bytes), &symbols) {
            (Ok(text), Ok(symbols)) => chunker::chunk_by_symbols(text, symbols, self.chunk_budget),
            (Ok(text), Err(_)) => chunker::chunk_by_size(text, self.chunk_budget),
            (Err(_), _) => Vec::new(),
        };
        return CacheEntry {
            chunk_budget: self.chunk_budget,
            chunks: Arc::new(chunks),
            fingerprint: fingerprint.clone(),
            language: plugin.map(|p| return p.name().to_string()),
            symbols,
        };
    }

    /// Run the plugin unless identical bytes were already parsed by it.
    fn parse(
        &self,
        plugin: &dyn LanguagePlugin,
        relative: &Path,
        bytes: &[u8],
        fingerprint: &Fingerprint,
        shared: &mut bool,
    ) -> Result<Arc<Vec<Symbol>>, FileFailure> {
        if let Some(symbols) = self.cache.parsed_symbols(plugin.name(), fingerprint) {
            tracing::debug!(path = %relative.display(), "reusing parse of identical content");
            *shared = true;
            return Ok(symbols);
        }
        let outcome = plugin.extract_symbols(relative, bytes).and_then(|symbols| {
            validate_symbols(relative, &symbols)?;
            return Ok(symbols);
        });
        return match outcome {
            Ok(symbols) => {
                let symbols = Arc::new(symbols);
                self.cache.remember_parsed(plugin.name(), fingerprint, Arc::clone(&symbols));
                Ok(symbols)
            },
            Err(err) => {
                tracing::warn!(path = %relative.display(), %err, "parse failed");
                Err(FileFailure::from_error(relative, &err))
            },
        };
    }

    /// Normalize a caller path to one relative to the root and check that it
    /// names an accepted file.
    fn checked_relative(&self, path: &Path) -> Result<PathBuf, Error> {
        let stripped = path.strip_prefix(&self.root).unwrap_or(path);
        let mut relative = PathBuf::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {},
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::FileNotFound { path: path.to_path_buf() });
                },
            }
        }
        if !self.root.join(&relative).is_file() {
            return Err(Error::FileNotFound { path: relative });
        }
        if !self.policy.accepts(&relative) {
            return Err(Error::PathIgnored { path: relative });
        }
        return Ok(relative);
    }
}

/// Lazy, independently restartable traversal returned by [`SymbolMapper::index`].
pub struct FileRecords<'m> {
    /// Accepted paths still to visit.
    files: Box<dyn Iterator<Item = Result<PathBuf, FileFailure>> + 'm>,
    /// Mapper doing the per-file work.
    mapper: &'m SymbolMapper,
}

impl Iterator for FileRecords<'_> {
    type Item = Result<FileRecord, FileFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.files.next()?;
        return Some(next.and_then(|relative| return self.mapper.record_for(&relative)));
    }
}

/// Check the structural invariants of one file's symbol list: ascending
/// start lines, parents listed before children, children inside their
/// parent, and siblings that overlap on at most one shared boundary line.
///
/// # Errors
///
/// Returns `Error::InvalidSymbolTree` naming the first violation.
pub fn validate_symbols(file: &Path, symbols: &[Symbol]) -> Result<(), Error> {
    let invalid = |reason: String| {
        return Err(Error::InvalidSymbolTree {
            file: file.to_path_buf(),
            reason,
        });
    };
    let mut last_sibling: HashMap<Option<usize>, usize> = HashMap::new();
    let mut previous_start = 0_u32;

    for (idx, symbol) in symbols.iter().enumerate() {
        if symbol.start_line == 0 || symbol.end_line < symbol.start_line {
            return invalid(format!(
                "`{}` has an invalid range {}-{}",
                symbol.name, symbol.start_line, symbol.end_line
            ));
        }
        if symbol.start_line < previous_start {
            return invalid(format!("`{}` at line {} is out of order", symbol.name, symbol.start_line));
        }
        previous_start = symbol.start_line;

        if let Some(parent_idx) = symbol.parent {
            let Some(parent) = symbols.get(parent_idx).filter(|_| return parent_idx < idx) else {
                return invalid(format!("`{}` names parent #{parent_idx} which does not precede it", symbol.name));
            };
            if symbol.start_line < parent.start_line || symbol.end_line > parent.end_line {
                return invalid(format!(
                    "`{}` ({}-{}) escapes its parent `{}` ({}-{})",
                    symbol.name, symbol.start_line, symbol.end_line, parent.name, parent.start_line, parent.end_line
                ));
            }
        }

        if let Some(sibling) = last_sibling.get(&symbol.parent).and_then(|&i| return symbols.get(i))
            && symbol.start_line < sibling.end_line
        {
            return invalid(format!(
                "`{}` overlaps its sibling `{}` ({} < {})",
                symbol.name, sibling.name, symbol.start_line, sibling.end_line
            ));
        }
        last_sibling.insert(symbol.parent, idx);
    }
    return Ok(());
}

/// Content as UTF-8 text.
fn as_text<'b>(relative: &Path, bytes: &'b [u8]) -> Result<&'b str, Error> {
    return std::str::from_utf8(bytes).map_err(|_| return Error::NotUtf8 { path: relative.to_path_buf() });
}
