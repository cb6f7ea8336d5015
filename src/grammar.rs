//! Language plugin registry: maps a file to the plugin that extracts its symbols.
//!
//! Dispatch is by file extension first, then by the interpreter named in a
//! `#!` line for extensionless scripts. The registry is filled at startup and
//! extended by registration; a later registration for the same extension
//! replaces the earlier one.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tree_sitter::Language;

use crate::error::Error;
use crate::extractor::{self, GrammarSpec};
use crate::types::Symbol;

/// Matches `#!/usr/bin/env -S python3.11 -u` or `#!/bin/bash` and captures the interpreter.
#[allow(clippy::expect_used, reason = "hardcoded pattern is a compile-time invariant")]
static SHEBANG: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^#!\s*\S*?([A-Za-z_-]+)[\d.]*(?:\s|$)(?:(?:-\S+\s+)*([A-Za-z_-]+)[\d.]*)?")
        .expect("valid regex");
});

/// Capability that turns file bytes into an ordered list of symbols.
pub trait LanguagePlugin: Send + Sync {
    /// File extensions claimed, lowercase, without the dot.
    fn extensions(&self) -> &[&str];

    /// Extract symbols in file order.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` when the file is not valid for the language.
    fn extract_symbols(&self, path: &Path, source: &[u8]) -> Result<Vec<Symbol>, Error>;

    /// Interpreter names claimed for `#!` dispatch.
    fn interpreters(&self) -> &[&str] {
        return &[];
    }

    /// Stable language name, e.g. `rust`.
    fn name(&self) -> &str;
}

/// A plugin backed by a tree-sitter grammar and a declaration table.
pub struct TreeSitterPlugin {
    /// Claimed extensions.
    extensions: &'static [&'static str],
    /// Claimed interpreters.
    interpreters: &'static [&'static str],
    /// Compiled grammar.
    language: Language,
    /// Language name.
    name: &'static str,
    /// Declaration table.
    spec: &'static GrammarSpec,
}

impl TreeSitterPlugin {
    /// Wrap a grammar and its declaration table.
    pub const fn new(
        name: &'static str,
        language: Language,
        spec: &'static GrammarSpec,
        extensions: &'static [&'static str],
        interpreters: &'static [&'static str],
    ) -> Self {
        return Self {
            extensions,
            interpreters,
            language,
            name,
            spec,
        };
    }
}

impl LanguagePlugin for TreeSitterPlugin {
    fn extensions(&self) -> &[&str] {
        return self.extensions;
    }

    fn extract_symbols(&self, path: &Path, source: &[u8]) -> Result<Vec<Symbol>, Error> {
        return extractor::extract(path, source, &self.language, self.spec);
    }

    fn interpreters(&self) -> &[&str] {
        return self.interpreters;
    }

    fn name(&self) -> &str {
        return self.name;
    }
}

/// Language tag → plugin mapping.
#[derive(Clone, Default)]
pub struct Registry {
    /// Extension → plugin.
    by_extension: HashMap<String, Arc<dyn LanguagePlugin>>,
    /// Interpreter name → plugin.
    by_interpreter: HashMap<String, Arc<dyn LanguagePlugin>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        return f.debug_struct("Registry").field("extensions", &extensions).finish();
    }
}

impl Registry {
    /// Empty registry; every file is unsupported until plugins are registered.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Registry with every built-in tree-sitter language.
    pub fn with_builtin_languages() -> Self {
        let mut registry = Self::new();
        for plugin in builtin_plugins() {
            registry.register(plugin);
        }
        return registry;
    }

    /// Register a plugin for all of its extensions and interpreters.
    pub fn register(&mut self, plugin: Arc<dyn LanguagePlugin>) {
        for ext in plugin.extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), Arc::clone(&plugin));
        }
        for interpreter in plugin.interpreters() {
            self.by_interpreter.insert((*interpreter).to_string(), Arc::clone(&plugin));
        }
    }

    /// Plugin for a path, consulting `head` (the file's first bytes) for a
    /// `#!` line when the extension is missing or unknown.
    pub fn plugin_for(&self, path: &Path, head: &[u8]) -> Option<Arc<dyn LanguagePlugin>> {
        let by_ext = path
            .extension()
            .and_then(|e| return e.to_str())
            .and_then(|ext| return self.by_extension.get(&ext.to_ascii_lowercase()));
        if let Some(plugin) = by_ext {
            return Some(Arc::clone(plugin));
        }
        let interpreter = shebang_interpreter(head)?;
        return self.by_interpreter.get(&interpreter).map(Arc::clone);
    }

    /// Sorted names of all registered languages.
    pub fn languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_extension
            .values()
            .map(|p| return p.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        return names;
    }
}

/// Interpreter named by a leading `#!` line, with version digits removed.
/// `env` indirection is followed: `#!/usr/bin/env python3` yields `python`.
pub fn shebang_interpreter(head: &[u8]) -> Option<String> {
    let first_line = head.split(|b| return *b == b'\n').next()?;
    let line = std::str::from_utf8(first_line).ok()?.trim_end();
    let captures = SHEBANG.captures(line)?;
    let program = captures.get(1)?.as_str();
    if program == "env" {
        return captures.get(2).map(|m| return m.as_str().to_string());
    }
    return Some(program.to_string());
}

/// All built-in tree-sitter plugins.
fn builtin_plugins() -> Vec<Arc<dyn LanguagePlugin>> {
    return vec![
        Arc::new(TreeSitterPlugin::new(
            "rust",
            tree_sitter_rust::LANGUAGE.into(),
            &extractor::RUST,
            &["rs"],
            &[],
        )),
        Arc::new(TreeSitterPlugin::new(
            "python",
            tree_sitter_python::LANGUAGE.into(),
            &extractor::PYTHON,
            &["py", "pyi"],
            &["python"],
        )),
        Arc::new(TreeSitterPlugin::new(
            "go",
            tree_sitter_go::LANGUAGE.into(),
            &extractor::GO,
            &["go"],
            &[],
        )),
        Arc::new(TreeSitterPlugin::new(
            "typescript",
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            &extractor::TYPESCRIPT,
            &["ts", "mts", "cts"],
            &[],
        )),
        Arc::new(TreeSitterPlugin::new(
            "tsx",
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            &extractor::TYPESCRIPT,
            &["tsx"],
            &[],
        )),
        // JSX is common in plain .js files, so JavaScript rides on the TSX grammar.
        Arc::new(TreeSitterPlugin::new(
            "javascript",
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            &extractor::TYPESCRIPT,
            &["js", "jsx", "mjs", "cjs"],
            &["node", "deno"],
        )),
        Arc::new(TreeSitterPlugin::new(
            "bash",
            tree_sitter_bash::LANGUAGE.into(),
            &extractor::BASH,
            &["sh", "bash"],
            &["sh", "bash"],
        )),
        Arc::new(TreeSitterPlugin::new(
            "markdown",
            tree_sitter_md::LANGUAGE.into(),
            &extractor::MARKDOWN,
            &["md", "markdown"],
            &[],
        )),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_extension() {
        let registry = Registry::with_builtin_languages();
        let name = |p: &str| return registry.plugin_for(Path::new(p), b"").map(|pl| return pl.name().to_string());
        assert_eq!(name("src/lib.rs").as_deref(), Some("rust"));
        assert_eq!(name("a/b.PY").as_deref(), Some("python"));
        assert_eq!(name("web/app.tsx").as_deref(), Some("tsx"));
        assert_eq!(name("web/app.js").as_deref(), Some("javascript"));
        assert_eq!(name("docs/README.md").as_deref(), Some("markdown"));
        assert_eq!(name("data.csv"), None);
    }

    #[test]
    fn falls_back_to_shebang() {
        let registry = Registry::with_builtin_languages();
        let plugin = registry.plugin_for(Path::new("bin/tool"), b"#!/usr/bin/env python3\nprint(1)\n");
        assert_eq!(plugin.map(|p| return p.name().to_string()).as_deref(), Some("python"));
        let plugin = registry.plugin_for(Path::new("run"), b"#!/bin/bash\necho hi\n");
        assert_eq!(plugin.map(|p| return p.name().to_string()).as_deref(), Some("bash"));
        assert!(registry.plugin_for(Path::new("LICENSE"), b"MIT License\n").is_none());
    }

    #[test]
    fn shebang_parsing() {
        assert_eq!(shebang_interpreter(b"#!/usr/bin/env python3.11\n").as_deref(), Some("python"));
        assert_eq!(shebang_interpreter(b"#!/usr/bin/env -S node --flag\n").as_deref(), Some("node"));
        assert_eq!(shebang_interpreter(b"#! /bin/sh\n").as_deref(), Some("sh"));
        assert_eq!(shebang_interpreter(b"no shebang"), None);
    }

    #[test]
    fn later_registration_overrides_extension() {
        struct Stub;
        impl LanguagePlugin for Stub {
            fn extensions(&self) -> &[&str] {
                return &["rs"];
            }
            fn extract_symbols(&self, _: &Path, _: &[u8]) -> Result<Vec<Symbol>, Error> {
                return Ok(Vec::new());
            }
            fn name(&self) -> &str {
                return "stub";
            }
        }
        let mut registry = Registry::with_builtin_languages();
        registry.register(Arc::new(Stub));
        let plugin = registry.plugin_for(Path::new("lib.rs"), b"").unwrap();
        assert_eq!(plugin.name(), "stub");
    }
}
