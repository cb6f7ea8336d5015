//! Snapshot resolution: `(location, ref)` to a read-only file tree plus git metadata.
//!
//! Local paths without a ref are indexed in place. Any requested ref, and
//! every remote location, is materialized from git objects into
//! `<cache_dir>/snapshots/<sha>/`, so the caller's working tree and checked
//! out branch are never touched. A materialized tree stays on disk while any
//! snapshot holding it is alive and is removed with the last one. Remote
//! locations are bare-cloned once into `<cache_dir>/clones/<key>/`; later
//! resolutions fetch only when the ref is not a tag or sha already cloned.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use crossbeam_channel::RecvTimeoutError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use git2::{BranchType, ObjectType, Oid, Repository as GitRepository};
use parking_lot::Mutex;
use regex::Regex;

use crate::config::Config;
use crate::error::Error;
use crate::hasher;

/// URL schemes treated as remote locations.
const REMOTE_SCHEMES: &[&str] = &["http://", "https://", "ssh://", "git://", "file://"];

/// Refspecs applied when refreshing an existing clone.
const FETCH_REFSPECS: &[&str] = &["+refs/heads/*:refs/remotes/origin/*", "+refs/tags/*:refs/tags/*"];

/// `user@host:path` shorthand accepted by git for SSH remotes.
#[allow(clippy::expect_used, reason = "hardcoded pattern is a compile-time invariant")]
static SCP_LIKE: LazyLock<Regex> =
    LazyLock::new(|| return Regex::new(r"^[\w.-]+@[\w.-]+:[^/\\]").expect("valid regex"));

/// Distinguishes staging directories created by this process.
static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where a repository lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A directory on the local filesystem, git-managed or not.
    Local(PathBuf),
    /// A URL (or scp-style address) git can clone from.
    Remote(String),
}

impl Location {
    /// Classify a caller-supplied location string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if REMOTE_SCHEMES.iter().any(|scheme| return lower.starts_with(scheme)) || SCP_LIKE.is_match(trimmed) {
            return Self::Remote(trimmed.to_string());
        }
        return Self::Local(PathBuf::from(trimmed));
    }

    /// Canonical string used for identity and clone-cache keys.
    ///
    /// Remote: scheme and host lowercased, trailing `/` and `.git` removed.
    /// Local: the canonical absolute path when it exists, else the path as given.
    pub fn normalized(&self) -> String {
        return match self {
            Self::Local(path) => {
                let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| return path.clone());
                let text = resolved.to_string_lossy().into_owned();
                let stripped = text.trim_end_matches('/');
                if stripped.is_empty() { text } else { stripped.to_string() }
            },
            Self::Remote(url) => normalize_url(url),
        };
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        };
    }
}

/// Lowercase scheme and host, drop trailing slashes and a `.git` suffix.
fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed).trim_end_matches('/');
    if let Some((scheme, rest)) = trimmed.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let mut normalized = format!("{}://{}", scheme.to_ascii_lowercase(), authority.to_ascii_lowercase());
        if !path.is_empty() {
            normalized.push('/');
            normalized.push_str(path);
        }
        return normalized;
    }
    if let Some((host, path)) = trimmed.split_once(':') {
        return format!("{}:{path}", host.to_ascii_lowercase());
    }
    return trimmed.to_string();
}

/// Live lease counts per materialized tree root.
type LeaseCounts = Arc<DashMap<PathBuf, usize>>;

/// Keeps one materialized tree on disk. The last lease dropped for a tree
/// deletes it.
#[derive(Debug)]
pub struct TreeLease {
    /// Counts shared with the resolver that materialized the tree.
    counts: LeaseCounts,
    /// Tree root under `<cache_dir>/snapshots/`.
    path: PathBuf,
}

impl Drop for TreeLease {
    fn drop(&mut self) {
        let Entry::Occupied(mut entry) = self.counts.entry(self.path.clone()) else {
            return;
        };
        let remaining = entry.get().saturating_sub(1);
        if remaining > 0 {
            *entry.get_mut() = remaining;
            return;
        }
        // Still holding the entry, so a concurrent materialize of this sha waits.
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "released snapshot"),
            Err(err) => tracing::warn!(path = %self.path.display(), %err, "could not remove snapshot"),
        }
        entry.remove();
    }
}

/// A materialized, read-only file tree plus the git metadata it came from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Branch name when the ref (or default) is a branch; absent for tags and shas.
    pub branch_name: Option<String>,
    /// Holds a materialized `root` on disk; `None` for trees read in place.
    lease: Option<Arc<TreeLease>>,
    /// Location as requested.
    pub location: Location,
    /// URL of `origin` (or the remote location itself).
    pub remote_url: Option<String>,
    /// Ref exactly as the caller gave it.
    pub requested_ref: Option<String>,
    /// Full hex commit id, absent when the tree has no git metadata.
    pub resolved_commit_sha: Option<String>,
    /// Absolute root of the file tree.
    pub root: PathBuf,
}

impl Snapshot {
    /// First seven hex digits of the resolved commit.
    pub fn short_sha(&self) -> Option<&str> {
        return self.resolved_commit_sha.as_deref().and_then(|sha| return sha.get(..7));
    }
}

/// Process-scoped registry of clone locks, one per normalized location, so
/// resolutions of distinct locations never contend.
#[derive(Debug, Default)]
pub struct CloneCache {
    /// Location key → lock guarding that location's clone directory.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CloneCache {
    /// Lock for one location key.
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        return Arc::clone(self.locks.entry(key.to_string()).or_default().value());
    }
}

/// Turns `(location, ref)` pairs into snapshots.
#[derive(Debug)]
pub struct SnapshotResolver {
    /// Per-location clone locks.
    clones: CloneCache,
    /// Cache directories and fetch timeout.
    config: Config,
    /// Leases on materialized trees.
    leases: LeaseCounts,
}

impl SnapshotResolver {
    /// Resolver writing clones and snapshots under `config.cache_dir`.
    pub fn new(config: Config) -> Self {
        return Self {
            clones: CloneCache::default(),
            config,
            leases: Arc::new(DashMap::new()),
        };
    }

    /// Resolve a location at an optional ref.
    ///
    /// # Errors
    ///
    /// - `Error::LocationUnreachable` if the path is missing or the remote
    ///   cannot be cloned or fetched within the configured timeout.
    /// - `Error::NotAGitRepository` if a ref is requested on a plain directory.
    /// - `Error::RefNotFound` if the ref does not name a commit.
    pub fn resolve(&self, location: &Location, requested_ref: Option<&str>) -> Result<Snapshot, Error> {
        let snapshot = match location {
            Location::Local(path) => self.resolve_local(location, path, requested_ref)?,
            Location::Remote(url) => self.resolve_remote(location, url, requested_ref)?,
        };
        tracing::info!(
            %location,
            requested_ref = requested_ref.unwrap_or("<default>"),
            sha = snapshot.short_sha().unwrap_or("-"),
            root = %snapshot.root.display(),
            "resolved snapshot"
        );
        return Ok(snapshot);
    }

    // ── Local ───────────────────────────────────────────────────────────

    /// Resolve a filesystem path, reading git metadata when present.
    fn resolve_local(&self, location: &Location, path: &Path, requested_ref: Option<&str>) -> Result<Snapshot, Error> {
        let root = std::fs::canonicalize(path).map_err(|e| {
            return Error::LocationUnreachable {
                location: location.to_string(),
                reason: e.to_string(),
            };
        })?;
        if !root.is_dir() {
            return Err(Error::LocationUnreachable {
                location: location.to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let Some(reference) = requested_ref else {
            return Ok(working_tree_snapshot(location, root));
        };

        let repo = GitRepository::open(&root).map_err(|_| return Error::NotAGitRepository { path: root.clone() })?;
        let candidates = [reference.to_string(), format!("refs/tags/{reference}")];
        let commit = find_commit(&repo, &candidates).ok_or_else(|| {
            return Error::RefNotFound {
                location: location.to_string(),
                reference: reference.to_string(),
            };
        })?;
        let branch_name = repo
            .find_branch(reference, BranchType::Local)
            .ok()
            .map(|_| return reference.to_string());
        let lease = self.materialize(&repo, commit)?;

        return Ok(Snapshot {
            branch_name,
            location: location.clone(),
            remote_url: origin_url(&repo),
            requested_ref: Some(reference.to_string()),
            resolved_commit_sha: Some(commit.to_string()),
            root: lease.path.clone(),
            lease: Some(Arc::new(lease)),
        });
    }

    // ── Remote ──────────────────────────────────────────────────────────

    /// Clone or fetch a remote, then materialize the requested commit.
    fn resolve_remote(&self, location: &Location, url: &str, requested_ref: Option<&str>) -> Result<Snapshot, Error> {
        let key = hasher::location_key(location);
        let lock = self.clones.lock_for(&key);
        let _guard = lock.lock();

        let clone_dir = self.config.clones_dir().join(&key);
        let pinned = requested_ref.and_then(|reference| return pinned_in_clone(&clone_dir, reference));
        if pinned.is_some() {
            tracing::debug!(url, "pinned ref already cloned, skipping fetch");
        } else {
            self.sync_clone(url, &clone_dir)?;
        }
        let repo = GitRepository::open_bare(&clone_dir)?;

        let (commit, branch_name) = match (pinned, requested_ref) {
            (Some(commit), _) => (commit, None),
            (None, Some(reference)) => {
                let candidates = [
                    format!("refs/remotes/origin/{reference}"),
                    format!("refs/tags/{reference}"),
                    reference.to_string(),
                ];
                let commit = find_commit(&repo, &candidates).ok_or_else(|| {
                    return Error::RefNotFound {
                        location: url.to_string(),
                        reference: reference.to_string(),
                    };
                })?;
                let is_branch = repo.find_reference(&format!("refs/remotes/origin/{reference}")).is_ok();
                (commit, is_branch.then(|| return reference.to_string()))
            },
            (None, None) => default_branch(&repo, url)?,
        };
        let lease = self.materialize(&repo, commit)?;

        return Ok(Snapshot {
            branch_name,
            location: location.clone(),
            remote_url: Some(url.to_string()),
            requested_ref: requested_ref.map(str::to_string),
            resolved_commit_sha: Some(commit.to_string()),
            root: lease.path.clone(),
            lease: Some(Arc::new(lease)),
        });
    }

    /// Bring the bare clone at `clone_dir` up to date, bounded by the fetch timeout.
    ///
    /// The transfer runs on a worker thread. On timeout the worker is left to
    /// finish or fail on its own; it only ever renames a complete clone into place.
    fn sync_clone(&self, url: &str, clone_dir: &Path) -> Result<(), Error> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker_url = url.to_string();
        let worker_dir = clone_dir.to_path_buf();
        std::thread::Builder::new()
            .name("repodex-fetch".to_string())
            .spawn(move || {
                let _ = tx.send(clone_or_fetch(&worker_url, &worker_dir));
            })?;

        let timeout = self.config.fetch_timeout;
        return match rx.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::LocationUnreachable {
                location: url.to_string(),
                reason: err.message().to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => Err(Error::LocationUnreachable {
                location: url.to_string(),
                reason: format!("timed out after {}s", timeout.as_secs_f32()),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(Error::LocationUnreachable {
                location: url.to_string(),
                reason: "fetch worker exited without a result".to_string(),
            }),
        };
    }

    // ── Materialization ─────────────────────────────────────────────────

    /// Lease the tree of `commit` at `<snapshots>/<sha>/`, writing it first
    /// unless it is already on disk.
    fn materialize(&self, repo: &GitRepository, commit: Oid) -> Result<TreeLease, Error> {
        let snapshots = self.config.snapshots_dir();
        let dest = snapshots.join(commit.to_string());
        let mut count = self.leases.entry(dest.clone()).or_insert(0);

        let written = if dest.is_dir() {
            tracing::debug!(sha = %commit, "snapshot already materialized");
            Ok(())
        } else {
            write_snapshot(repo, commit, &snapshots, &dest)
        };
        if let Err(err) = written {
            let unused = *count == 0;
            drop(count);
            if unused {
                self.leases.remove_if(&dest, |_, n| return *n == 0);
            }
            return Err(err);
        }

        *count = count.saturating_add(1);
        drop(count);
        return Ok(TreeLease {
            counts: Arc::clone(&self.leases),
            path: dest,
        });
    }
}

/// Write the tree of `commit` to a staging directory and move it to `dest`.
fn write_snapshot(repo: &GitRepository, commit: Oid, snapshots: &Path, dest: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(snapshots)?;
    let staging = staging_path(snapshots, &commit.to_string());
    let tree = repo.find_commit(commit)?.tree()?;
    if let Err(err) = write_tree(repo, &tree, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }
    publish(&staging, dest)?;
    tracing::info!(sha = %commit, path = %dest.display(), "materialized snapshot");
    return Ok(());
}

/// Snapshot of a directory as it is on disk, with metadata from any
/// enclosing repository.
fn working_tree_snapshot(location: &Location, root: PathBuf) -> Snapshot {
    let mut snapshot = Snapshot {
        branch_name: None,
        lease: None,
        location: location.clone(),
        remote_url: None,
        requested_ref: None,
        resolved_commit_sha: None,
        root,
    };
    let Ok(repo) = GitRepository::discover(&snapshot.root) else {
        tracing::debug!(root = %snapshot.root.display(), "no git metadata");
        return snapshot;
    };
    snapshot.remote_url = origin_url(&repo);
    if let Ok(head) = repo.head() {
        snapshot.resolved_commit_sha = head.peel_to_commit().ok().map(|c| return c.id().to_string());
        if head.is_branch() {
            snapshot.branch_name = head.shorthand().map(str::to_string);
        }
    }
    return snapshot;
}

/// First candidate spec that peels to a commit.
fn find_commit(repo: &GitRepository, candidates: &[String]) -> Option<Oid> {
    return candidates.iter().find_map(|spec| {
        return repo
            .revparse_single(spec)
            .and_then(|object| return object.peel_to_commit())
            .map(|commit| return commit.id())
            .ok();
    });
}

/// Commit for a tag or full sha that an existing clone already holds.
/// Branch names always go to the network, since branches move.
fn pinned_in_clone(clone_dir: &Path, reference: &str) -> Option<Oid> {
    if !clone_dir.is_dir() {
        return None;
    }
    let repo = GitRepository::open_bare(clone_dir).ok()?;
    if repo.find_reference(&format!("refs/remotes/origin/{reference}")).is_ok() {
        return None;
    }
    if reference.len() == 40 && reference.chars().all(|c| return c.is_ascii_hexdigit()) {
        let oid = Oid::from_str(reference).ok()?;
        return repo.find_commit(oid).ok().map(|commit| return commit.id());
    }
    let tag = repo.find_reference(&format!("refs/tags/{reference}")).ok()?;
    return tag.peel_to_commit().ok().map(|commit| return commit.id());
}

/// Commit and name of a clone's default branch, preferring the freshly
/// fetched remote-tracking ref over the local branch created at clone time.
fn default_branch(repo: &GitRepository, url: &str) -> Result<(Oid, Option<String>), Error> {
    let not_found = || {
        return Error::RefNotFound {
            location: url.to_string(),
            reference: "HEAD".to_string(),
        };
    };
    let head = repo.find_reference("HEAD")?;
    let Some(name) = head.symbolic_target().and_then(|t| return t.strip_prefix("refs/heads/")) else {
        let commit = head.peel_to_commit().map_err(|_| return not_found())?;
        return Ok((commit.id(), None));
    };
    let candidates = [format!("refs/remotes/origin/{name}"), format!("refs/heads/{name}")];
    let commit = find_commit(repo, &candidates).ok_or_else(not_found)?;
    return Ok((commit, Some(name.to_string())));
}

/// URL of the `origin` remote, if configured.
fn origin_url(repo: &GitRepository) -> Option<String> {
    let remote = repo.find_remote("origin").ok()?;
    return remote.url().map(str::to_string);
}

/// Clone `url` bare into `dir`, or fetch into the existing clone.
fn clone_or_fetch(url: &str, dir: &Path) -> Result<(), git2::Error> {
    if dir.is_dir() {
        tracing::info!(url, "fetching");
        let repo = GitRepository::open_bare(dir)?;
        let mut remote = repo.find_remote("origin")?;
        remote.fetch(FETCH_REFSPECS, None, None)?;
        return Ok(());
    }

    tracing::info!(url, path = %dir.display(), "cloning");
    let parent = dir.parent().unwrap_or(dir);
    std::fs::create_dir_all(parent).map_err(|e| return git2::Error::from_str(&e.to_string()))?;
    let name = dir.file_name().map_or_else(String::new, |n| return n.to_string_lossy().into_owned());
    let staging = staging_path(parent, &name);
    let result = git2::build::RepoBuilder::new()
        .bare(true)
        .clone(url, &staging)
        .and_then(|repo| {
            // Tags on commits outside every branch are not auto-followed.
            let mut remote = repo.find_remote("origin")?;
            return remote.fetch(&["+refs/tags/*:refs/tags/*"], None, None);
        });
    if let Err(err) = result {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }
    return publish(&staging, dir).map_err(|e| return git2::Error::from_str(&e.to_string()));
}

/// Recursively write the blobs of `tree` under `dest`. Submodules and
/// symlinks are skipped.
fn write_tree(repo: &GitRepository, tree: &git2::Tree<'_>, dest: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dest)?;
    for entry in tree {
        let Some(name) = entry.name().filter(|n| return is_safe_component(n)) else {
            tracing::warn!(name = %String::from_utf8_lossy(entry.name_bytes()), "skipping tree entry");
            continue;
        };
        let target = dest.join(name);
        match entry.kind() {
            Some(ObjectType::Tree) => {
                let subtree = repo.find_tree(entry.id())?;
                write_tree(repo, &subtree, &target)?;
            },
            Some(ObjectType::Blob) if entry.filemode() != i32::from(git2::FileMode::Link) => {
                let blob = repo.find_blob(entry.id())?;
                std::fs::write(&target, blob.content())?;
            },
            _ => tracing::debug!(path = %target.display(), "skipping submodule or symlink"),
        }
    }
    return Ok(());
}

/// A tree entry name that stays inside its directory.
fn is_safe_component(name: &str) -> bool {
    return !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
}

/// Unique hidden sibling directory for staging `name` under `parent`.
fn staging_path(parent: &Path, name: &str) -> PathBuf {
    let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    return parent.join(format!(".{name}.staging-{}-{n}", std::process::id()));
}

/// Move a finished staging directory into place. If another writer got
/// there first its copy wins and the staging copy is discarded.
fn publish(staging: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::rename(staging, dest) {
        Ok(()) => return Ok(()),
        Err(_) if dest.is_dir() => {
            std::fs::remove_dir_all(staging)?;
            return Ok(());
        },
        Err(err) => {
            let _ = std::fs::remove_dir_all(staging);
            return Err(err);
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn commit_all(repo: &GitRepository, message: &str) -> Oid {
        let mut index = repo.index().unwrap();
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Fixture", "fixture@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| return h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        return repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap();
    }

    fn init_repo(dir: &Path) -> GitRepository {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        return GitRepository::init_opts(dir, &opts).unwrap();
    }

    fn resolver(cache: &Path) -> SnapshotResolver {
        return SnapshotResolver::new(Config {
            cache_dir: cache.to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
            ..Config::default()
        });
    }

    #[test]
    fn classifies_locations() {
        assert!(matches!(Location::parse("https://github.com/o/r"), Location::Remote(_)));
        assert!(matches!(Location::parse("git@github.com:o/r.git"), Location::Remote(_)));
        assert!(matches!(Location::parse("file:///srv/git/r.git"), Location::Remote(_)));
        assert!(matches!(Location::parse("./checkout"), Location::Local(_)));
        assert!(matches!(Location::parse("/abs/path"), Location::Local(_)));
    }

    #[test]
    fn normalizes_remote_urls() {
        assert_eq!(
            Location::parse("HTTPS://GitHub.com/Org/Repo.git/").normalized(),
            "https://github.com/Org/Repo"
        );
        assert_eq!(Location::parse("git@GitHub.com:org/repo.git").normalized(), "git@github.com:org/repo");
        assert_eq!(Location::parse("file:///srv/r.git").normalized(), "file:///srv/r");
    }

    #[test]
    fn plain_directory_has_no_metadata() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("a.py"), "x = 1\n").unwrap();
        let location = Location::parse(&tree.path().display().to_string());
        let snapshot = resolver(cache.path()).resolve(&location, None).unwrap();
        assert!(snapshot.resolved_commit_sha.is_none());
        assert!(snapshot.branch_name.is_none());
        assert!(snapshot.short_sha().is_none());
        assert_eq!(snapshot.root, std::fs::canonicalize(tree.path()).unwrap());
    }

    #[test]
    fn ref_on_plain_directory_is_rejected() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let location = Location::parse(&tree.path().display().to_string());
        let err = resolver(cache.path()).resolve(&location, Some("main")).unwrap_err();
        assert!(matches!(err, Error::NotAGitRepository { .. }), "{err}");
    }

    #[test]
    fn missing_path_is_unreachable() {
        let cache = tempfile::tempdir().unwrap();
        let location = Location::parse("/definitely/not/here/repodex");
        let err = resolver(cache.path()).resolve(&location, None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn working_tree_reports_head_and_branch() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let repo = init_repo(tree.path());
        std::fs::write(tree.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let oid = commit_all(&repo, "init");

        let location = Location::parse(&tree.path().display().to_string());
        let snapshot = resolver(cache.path()).resolve(&location, None).unwrap();
        assert_eq!(snapshot.resolved_commit_sha, Some(oid.to_string()));
        assert_eq!(snapshot.short_sha().map(str::len), Some(7));
        assert_eq!(snapshot.branch_name.as_deref(), Some("main"));
    }

    #[test]
    fn tag_is_materialized_without_touching_working_tree() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let repo = init_repo(tree.path());
        std::fs::create_dir(tree.path().join("src")).unwrap();
        std::fs::write(tree.path().join("src/lib.rs"), "fn old() {}\n").unwrap();
        let first = commit_all(&repo, "v1");
        repo.tag_lightweight("v1.0.0", &repo.find_object(first, None).unwrap(), false).unwrap();
        std::fs::write(tree.path().join("src/lib.rs"), "fn new() {}\n").unwrap();
        commit_all(&repo, "v2");

        let location = Location::parse(&tree.path().display().to_string());
        let snapshot = resolver(cache.path()).resolve(&location, Some("v1.0.0")).unwrap();
        assert_eq!(snapshot.resolved_commit_sha, Some(first.to_string()));
        assert!(snapshot.branch_name.is_none());
        assert!(snapshot.root.starts_with(cache.path()));
        assert_eq!(std::fs::read_to_string(snapshot.root.join("src/lib.rs")).unwrap(), "fn old() {}\n");
        assert_eq!(std::fs::read_to_string(tree.path().join("src/lib.rs")).unwrap(), "fn new() {}\n");
        assert_eq!(repo.head().unwrap().shorthand(), Some("main"));
    }

    #[test]
    fn unknown_ref_is_ref_not_found() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let repo = init_repo(tree.path());
        std::fs::write(tree.path().join("a.txt"), "a\n").unwrap();
        commit_all(&repo, "init");

        let location = Location::parse(&tree.path().display().to_string());
        let err = resolver(cache.path()).resolve(&location, Some("v9.9.9")).unwrap_err();
        assert!(matches!(err, Error::RefNotFound { ref reference, .. } if reference == "v9.9.9"));
    }

    #[test]
    fn materialized_tree_is_removed_with_its_last_snapshot() {
        let tree = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let repo = init_repo(tree.path());
        std::fs::write(tree.path().join("a.txt"), "a\n").unwrap();
        let first = commit_all(&repo, "v1");
        repo.tag_lightweight("v1.0.0", &repo.find_object(first, None).unwrap(), false).unwrap();

        let resolver = resolver(cache.path());
        let location = Location::parse(&tree.path().display().to_string());
        let by_tag = resolver.resolve(&location, Some("v1.0.0")).unwrap();
        let by_sha = resolver.resolve(&location, Some(&first.to_string())).unwrap();
        assert_eq!(by_tag.root, by_sha.root, "same commit shares one tree");

        let root = by_tag.root.clone();
        drop(by_tag);
        assert!(root.join("a.txt").is_file(), "tree removed while still leased");
        let copy = by_sha.clone();
        drop(by_sha);
        assert!(root.is_dir(), "clones share the lease");
        drop(copy);
        assert!(!root.exists(), "last release should remove the tree");

        let again = resolver.resolve(&location, Some("v1.0.0")).unwrap();
        assert_eq!(std::fs::read_to_string(again.root.join("a.txt")).unwrap(), "a\n");
    }

    #[test]
    fn pinned_refs_resolve_from_clone_without_origin() {
        let origin = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let repo = init_repo(origin.path());
        std::fs::write(origin.path().join("a.txt"), "a\n").unwrap();
        let first = commit_all(&repo, "v1");
        repo.tag_lightweight("v1.0.0", &repo.find_object(first, None).unwrap(), false).unwrap();
        drop(repo);

        let resolver = resolver(cache.path());
        let location = Location::parse(&format!("file://{}", origin.path().display()));
        resolver.resolve(&location, Some("main")).unwrap();
        std::fs::remove_dir_all(origin.path().join(".git")).unwrap();

        let by_sha = resolver.resolve(&location, Some(&first.to_string())).unwrap();
        assert_eq!(by_sha.resolved_commit_sha, Some(first.to_string()));
        let by_tag = resolver.resolve(&location, Some("v1.0.0")).unwrap();
        assert_eq!(by_tag.resolved_commit_sha, Some(first.to_string()));
        assert!(by_tag.branch_name.is_none());

        let err = resolver.resolve(&location, Some("main")).unwrap_err();
        assert!(matches!(err, Error::LocationUnreachable { .. }), "branches must refresh: {err}");
    }

    #[test]
    fn unsafe_tree_entry_names_are_refused() {
        assert!(is_safe_component("lib.rs"));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component(""));
    }
}
