use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Name of the optional per-project config file.
pub const CONFIG_FILE_NAME: &str = ".repodex.toml";

/// Default chunk budget in lines.
const DEFAULT_MAX_LINES: usize = 60;

/// Default cap on indexed file size (1 MiB).
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default remote fetch timeout.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Indexing configuration loaded from `.repodex.toml`.
/// Include/exclude patterns are gitignore-style globs relative to the snapshot root.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the clone and snapshot caches.
    pub cache_dir: PathBuf,
    /// Extra exclusion globs layered over the repository's ignore files.
    pub exclude: Vec<String>,
    /// Upper bound on a remote clone or fetch.
    pub fetch_timeout: Duration,
    /// Whitelist globs; empty means everything not otherwise ignored.
    pub include: Vec<String>,
    /// Files larger than this are skipped by the ignore policy.
    pub max_file_size: u64,
    /// Default chunk budget in lines.
    pub max_lines: usize,
    /// Worker threads for parallel indexing; 0 uses the rayon default.
    pub threads: usize,
}

/// Raw TOML structure for `.repodex.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RepodexTomlConfig {
    /// Overrides the cache root.
    cache_dir: Option<PathBuf>,
    /// Exclusion globs.
    #[serde(default)]
    exclude: Vec<String>,
    /// Fetch timeout in seconds.
    fetch_timeout_secs: Option<u64>,
    /// Whitelist globs.
    #[serde(default)]
    include: Vec<String>,
    /// Size cap in bytes.
    max_file_size: Option<u64>,
    /// Chunk budget in lines.
    max_lines: Option<usize>,
    /// Worker thread count.
    threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            cache_dir: default_cache_dir(),
            exclude: Vec::new(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            include: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_lines: DEFAULT_MAX_LINES,
            threads: 0,
        };
    }
}

impl Config {
    /// Load config from `.repodex.toml` in the given directory, then apply
    /// environment overrides. Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed — never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(Error::Io(e)),
            Ok(content) => Self::parse(&content)?,
        };
        config.apply_env_overrides(|key| return std::env::var(key).ok());
        return Ok(config);
    }

    /// Parse config from TOML text, filling unset keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: RepodexTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();
        return Ok(Self {
            cache_dir: raw.cache_dir.unwrap_or(defaults.cache_dir),
            exclude: raw.exclude,
            fetch_timeout: raw
                .fetch_timeout_secs
                .map_or(defaults.fetch_timeout, Duration::from_secs),
            include: raw.include,
            max_file_size: raw.max_file_size.unwrap_or(defaults.max_file_size),
            max_lines: raw.max_lines.unwrap_or(defaults.max_lines).max(1),
            threads: raw.threads.unwrap_or(defaults.threads),
        });
    }

    /// Apply `REPODEX_*` overrides. The lookup is injected so tests don't
    /// have to mutate process environment.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("REPODEX_CACHE_DIR").filter(|v| return !v.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("REPODEX_FETCH_TIMEOUT_SECS").and_then(|v| return v.parse().ok()) {
            self.fetch_timeout = Duration::from_secs(secs);
        }
    }

    /// Directory holding bare clones of remote locations.
    pub fn clones_dir(&self) -> PathBuf {
        return self.cache_dir.join("clones");
    }

    /// Directory holding materialized commit trees.
    pub fn snapshots_dir(&self) -> PathBuf {
        return self.cache_dir.join("snapshots");
    }
}

/// Platform cache dir, or the temp dir when the platform has none.
fn default_cache_dir() -> PathBuf {
    return dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("repodex");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.max_lines, DEFAULT_MAX_LINES);
        assert!(config.include.is_empty());
    }

    #[test]
    fn parses_all_keys() {
        let config = Config::parse(
            r#"
cache_dir = "/tmp/rdx"
fetch_timeout_secs = 5
max_lines = 40
max_file_size = 2048
threads = 2
include = ["src/**"]
exclude = ["*.min.js"]
"#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/rdx"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.max_lines, 40);
        assert_eq!(config.max_file_size, 2048);
        assert_eq!(config.threads, 2);
        assert_eq!(config.include, vec!["src/**".to_string()]);
        assert_eq!(config.exclude, vec!["*.min.js".to_string()]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "max_lines = \"many\"").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("max_line = 3").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| {
            return match key {
                "REPODEX_CACHE_DIR" => Some("/var/cache/rdx".to_string()),
                "REPODEX_FETCH_TIMEOUT_SECS" => Some("7".to_string()),
                _ => None,
            };
        });
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/rdx"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(7));
    }
}
