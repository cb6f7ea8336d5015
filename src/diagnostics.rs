use std::fmt::Write as _;

use crate::error::Error;
use crate::types::FileFailure;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the caller
/// can act on it, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::RefNotFound { location, reference } => render_ref_not_found(location, reference),
        Error::LocationUnreachable { location, reason } => render_unreachable(location, reason),
        Error::NotAGitRepository { path } => render_not_a_repository(path),
        Error::ParseFailed { file, line, reason } => format!(
            "\
# Error: Parse Failed

`{}` line {line}: {reason}
",
            file.display()
        ),
        Error::UnsupportedLanguage { path } => render_unsupported_language(path),
        _ => render_generic(e),
    };
}

/// Render the per-file failures of an index pass as a markdown list.
pub fn render_failures(failures: &[FileFailure]) -> String {
    let mut md = format!("# {} file(s) failed\n\n", failures.len());
    for failure in failures {
        let _ = writeln!(md, "- `{}` ({:?})", failure, failure.kind);
    }
    return md;
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist in the snapshot.
",
            path.display()
        ),

        Error::PathIgnored { path } => format!(
            "\
# Error: Path Ignored

`{}` is excluded by an ignore file, a fixed exclusion, or the size cap.

## Fix

Adjust `include`/`exclude` or `max_file_size` in `.repodex.toml`.
",
            path.display()
        ),

        Error::InvalidSymbolTree { file, reason } => format!(
            "\
# Error: Invalid Symbol Tree

The plugin for `{}` produced malformed symbols: {reason}
",
            file.display()
        ),

        Error::NotUtf8 { path } => format!(
            "\
# Error: Not Text

`{}` is not valid UTF-8 and cannot be chunked.
",
            path.display()
        ),

        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Git(e) => format!(
            "\
# Error: Git

{e}
"
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}

## Fix

Check `.repodex.toml` for typos; unknown keys are rejected.
"
        ),
        // Already handled in render_error, but need exhaustive match.
        _ => format!(
            "\
# Error

{e}
"
        ),
    };
}

fn render_ref_not_found(location: &str, reference: &str) -> String {
    return format!(
        "\
# Error: Ref Not Found

`{reference}` is not a branch, tag, or commit in `{location}`.

## Fix

List what exists:

    git ls-remote {location}
"
    );
}

fn render_unreachable(location: &str, reason: &str) -> String {
    return format!(
        "\
# Error: Location Unreachable

`{location}` could not be reached: {reason}

This is usually transient. Retry, or raise `fetch_timeout_secs` in
`.repodex.toml` (or `REPODEX_FETCH_TIMEOUT_SECS`).
"
    );
}

fn render_not_a_repository(path: &std::path::Path) -> String {
    return format!(
        "\
# Error: Not a Git Repository

A ref was requested but `{}` has no git metadata.

## Fix

Drop `--ref` to index the directory as it is, or run `git init` there.
",
        path.display()
    );
}

fn render_unsupported_language(path: &std::path::Path) -> String {
    let mut md = format!(
        "\
# Error: Unsupported Language

No language plugin handles `{}`.

## Supported

",
        path.display()
    );
    for name in crate::grammar::Registry::with_builtin_languages().languages() {
        let _ = writeln!(md, "- {name}");
    }
    return md;
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn ref_not_found_names_ref_and_location() {
        let md = render_error(&Error::RefNotFound {
            location: "https://example.com/r.git".to_string(),
            reference: "v9".to_string(),
        });
        assert!(md.starts_with("# Error: Ref Not Found"));
        assert!(md.contains("`v9`"));
        assert!(md.contains("git ls-remote https://example.com/r.git"));
    }

    #[test]
    fn unsupported_language_lists_plugins() {
        let md = render_error(&Error::UnsupportedLanguage {
            path: PathBuf::from("data.csv"),
        });
        assert!(md.contains("- python"));
        assert!(md.contains("- rust"));
    }

    #[test]
    fn failures_render_as_list() {
        let failures = vec![FileFailure {
            kind: ErrorKind::ParseError,
            line: Some(2),
            message: "unexpected token".to_string(),
            path: PathBuf::from("bad.py"),
        }];
        let md = render_failures(&failures);
        assert!(md.contains("- `bad.py:2: unexpected token` (ParseError)"));
    }
}
