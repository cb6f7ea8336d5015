//! Ignore policy: decides which paths of a snapshot participate in indexing.
//!
//! Layers, first match wins:
//! 1. fixed exclusions (VCS metadata, dependency and build directories),
//! 2. the configured `exclude` globs,
//! 3. the tree's own `.gitignore` files (deepest first) and `.git/info/exclude`,
//! 4. the configured `include` whitelist (files only),
//! 5. the size cap (files only).
use std::path::{Path, PathBuf};

use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::WalkDir;

use crate::config::Config;

/// Paths never indexed regardless of ignore files.
const FIXED_EXCLUSIONS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "target/",
    "dist/",
    "__pycache__/",
    ".venv/",
    "venv/",
    ".mypy_cache/",
    ".pytest_cache/",
    "*.pyc",
    "*.min.js",
];

/// Accept/reject decisions for paths under one snapshot root.
#[derive(Debug)]
pub struct IgnorePolicy {
    /// Configured exclusion globs.
    excluded: Gitignore,
    /// Hard-coded exclusions.
    fixed: Gitignore,
    /// Repository ignore files, deepest root first.
    gitignores: Vec<Gitignore>,
    /// Configured whitelist; `None` when every file is eligible.
    included: Option<Gitignore>,
    /// Size cap in bytes.
    max_file_size: u64,
    /// Absolute snapshot root.
    root: PathBuf,
}

impl IgnorePolicy {
    /// Build the policy for a snapshot root, reading every `.gitignore` in the
    /// tree that is not itself inside an excluded directory.
    ///
    /// Invalid patterns in ignore files are skipped with a warning; they never
    /// fail policy construction.
    pub fn new(root: &Path, config: &Config) -> Self {
        let fixed = build_matcher(root, FIXED_EXCLUSIONS.iter().copied());
        let excluded = build_matcher(root, config.exclude.iter().map(String::as_str));
        let included = if config.include.is_empty() {
            None
        } else {
            Some(build_matcher(root, config.include.iter().map(String::as_str)))
        };

        let mut policy = Self {
            excluded,
            fixed,
            gitignores: Vec::new(),
            included,
            max_file_size: config.max_file_size,
            root: root.to_path_buf(),
        };
        policy.gitignores = policy.discover_gitignores();
        return policy;
    }

    /// Absolute snapshot root this policy is bound to.
    pub fn root(&self) -> &Path {
        return &self.root;
    }

    /// Whether a directory (relative to the root) should be descended into.
    pub fn accepts_dir(&self, relative: &Path) -> bool {
        return self.is_excluded(relative, true).is_none();
    }

    /// Whether a file (relative to the root) of the given length participates.
    pub fn accepts_file(&self, relative: &Path, byte_len: u64) -> bool {
        if self.is_excluded(relative, false).is_some() {
            return false;
        }
        if let Some(included) = &self.included
            && !included.matched_path_or_any_parents(relative, false).is_ignore()
        {
            return false;
        }
        return byte_len <= self.max_file_size;
    }

    /// Accept/reject decision for an arbitrary relative path, statting it to
    /// learn whether it is a file or directory. Missing paths are rejected.
    pub fn accepts(&self, relative: &Path) -> bool {
        let Ok(meta) = std::fs::symlink_metadata(self.root.join(relative)) else {
            return false;
        };
        if meta.is_dir() {
            return self.accepts_dir(relative);
        }
        if !meta.is_file() {
            return false;
        }
        return self.ancestors_accepted(relative) && self.accepts_file(relative, meta.len());
    }

    /// Every proper ancestor directory must be accepted for a file to be.
    fn ancestors_accepted(&self, relative: &Path) -> bool {
        return relative
            .ancestors()
            .skip(1)
            .filter(|a| return !a.as_os_str().is_empty())
            .all(|a| return self.accepts_dir(a));
    }

    /// Name of the layer that excludes this path, if any.
    fn is_excluded(&self, relative: &Path, is_dir: bool) -> Option<&'static str> {
        if self.fixed.matched_path_or_any_parents(relative, is_dir).is_ignore() {
            return Some("fixed");
        }
        if self.excluded.matched_path_or_any_parents(relative, is_dir).is_ignore() {
            return Some("config");
        }
        let absolute = self.root.join(relative);
        for gitignore in &self.gitignores {
            if !absolute.starts_with(gitignore.path()) {
                continue;
            }
            match gitignore.matched_path_or_any_parents(&absolute, is_dir) {
                Match::Ignore(_) => return Some("gitignore"),
                Match::Whitelist(_) => return None,
                Match::None => {},
            }
        }
        return None;
    }

    /// Find ignore files under the root, deepest directory first so nested
    /// rules override their ancestors the way git applies them.
    fn discover_gitignores(&self) -> Vec<Gitignore> {
        let mut found: Vec<(usize, Gitignore)> = Vec::new();

        let info_exclude = self.root.join(".git").join("info").join("exclude");
        if info_exclude.is_file() {
            let mut builder = GitignoreBuilder::new(&self.root);
            if let Some(err) = builder.add(&info_exclude) {
                tracing::warn!(path = %info_exclude.display(), %err, "bad ignore pattern");
            }
            if let Ok(matcher) = builder.build() {
                found.push((0, matcher));
            }
        }

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                return relative.as_os_str().is_empty()
                    || self.fixed.matched_path_or_any_parents(relative, true).is_none();
            });

        for entry in walker.filter_map(Result::ok) {
            if entry.file_name() != ".gitignore" || !entry.file_type().is_file() {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(err) = builder.add(entry.path()) {
                tracing::warn!(path = %entry.path().display(), %err, "bad ignore pattern");
            }
            match builder.build() {
                Ok(matcher) => found.push((entry.depth(), matcher)),
                Err(err) => tracing::warn!(path = %entry.path().display(), %err, "ignore file skipped"),
            }
        }

        // Stable sort keeps `.git/info/exclude` behind the root `.gitignore`.
        found.sort_by(|a, b| return b.0.cmp(&a.0));
        return found.into_iter().map(|(_, matcher)| return matcher).collect();
    }
}

/// Compile a list of gitignore-style lines rooted at `root`.
fn build_matcher<'a>(root: &Path, patterns: impl Iterator<Item = &'a str>) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        if let Err(err) = builder.add_line(None, pattern) {
            tracing::warn!(pattern, %err, "invalid glob skipped");
        }
    }
    return builder.build().unwrap_or_else(|err| {
        tracing::warn!(%err, "ignore matcher failed to build");
        return Gitignore::empty();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn fixed_exclusions_reject_vcs_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let policy = IgnorePolicy::new(dir.path(), &Config::default());
        assert!(!policy.accepts_dir(Path::new(".git")));
        assert!(!policy.accepts_dir(Path::new("web/node_modules")));
        assert!(!policy.accepts_file(Path::new("target/debug/build.rs"), 10));
        assert!(policy.accepts_file(Path::new("src/main.rs"), 10));
    }

    #[test]
    fn root_and_nested_gitignores_apply() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "*.log\ngenerated/\n");
        write(dir.path(), "pkg/.gitignore", "secret.py\n!keep.log\n");
        let policy = IgnorePolicy::new(dir.path(), &Config::default());

        assert!(!policy.accepts_file(Path::new("app.log"), 1));
        assert!(!policy.accepts_dir(Path::new("generated")));
        assert!(!policy.accepts_file(Path::new("pkg/secret.py"), 1));
        assert!(policy.accepts_file(Path::new("secret.py"), 1));
        assert!(policy.accepts_file(Path::new("pkg/keep.log"), 1));
    }

    #[test]
    fn config_include_and_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            exclude: vec!["src/vendor/".to_string()],
            include: vec!["src/".to_string()],
            ..Config::default()
        };
        let policy = IgnorePolicy::new(dir.path(), &config);
        assert!(policy.accepts_file(Path::new("src/lib.rs"), 1));
        assert!(!policy.accepts_file(Path::new("docs/readme.md"), 1));
        assert!(!policy.accepts_file(Path::new("src/vendor/x.rs"), 1));
    }

    #[test]
    fn oversized_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { max_file_size: 8, ..Config::default() };
        let policy = IgnorePolicy::new(dir.path(), &config);
        assert!(policy.accepts_file(Path::new("a.rs"), 8));
        assert!(!policy.accepts_file(Path::new("a.rs"), 9));
    }

    #[test]
    fn accepts_checks_ancestors_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "build/\n");
        write(dir.path(), "build/out.rs", "fn main() {}\n");
        write(dir.path(), "src/lib.rs", "fn main() {}\n");
        let policy = IgnorePolicy::new(dir.path(), &Config::default());
        assert!(!policy.accepts(Path::new("build/out.rs")));
        assert!(policy.accepts(Path::new("src/lib.rs")));
        assert!(!policy.accepts(Path::new("src/missing.rs")));
    }
}
