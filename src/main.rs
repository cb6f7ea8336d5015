use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use repodex::{Chunk, Config, Error, Indexer, Repository, diagnostics};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser)]
#[command(name = "repodex", version, about = "Symbols and chunks for any repository at any ref")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
}

/// Repository selection shared by every subcommand.
#[derive(Args)]
struct Target {
    /// Local path or remote URL.
    location: String,
    /// Branch, tag, or commit; defaults to the working tree or remote default branch.
    #[arg(long = "ref")]
    reference: Option<String>,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show identity and git metadata of the resolved snapshot
    Info {
        /// Repository to resolve.
        #[command(flatten)]
        target: Target,
    },
    /// List files accepted by the ignore policy
    Files {
        /// Repository to resolve.
        #[command(flatten)]
        target: Target,
    },
    /// Index every file and report per-file results (exit 1 on any failure)
    Index {
        /// Repository to resolve.
        #[command(flatten)]
        target: Target,
    },
    /// Print the symbols of one file
    Symbols {
        /// Repository to resolve.
        #[command(flatten)]
        target: Target,
        /// File path relative to the repository root.
        path: PathBuf,
    },
    /// Split one file into chunks
    Chunks {
        /// Repository to resolve.
        #[command(flatten)]
        target: Target,
        /// File path relative to the repository root.
        path: PathBuf,
        /// Chunk budget in lines; defaults to `max_lines` from config.
        #[arg(long)]
        max_lines: Option<usize>,
        /// Align chunk boundaries with top-level symbols.
        #[arg(long)]
        by_symbols: bool,
    },
}

/// `info` output.
#[derive(Serialize)]
struct InfoJson<'a> {
    /// Current branch.
    branch: Option<&'a str>,
    /// Identity hex string.
    identity: String,
    /// Remote URL.
    remote_url: Option<&'a str>,
    /// Requested ref.
    requested_ref: Option<&'a str>,
    /// Snapshot root.
    root: &'a Path,
    /// Full sha.
    sha: Option<&'a str>,
    /// Short sha.
    sha_short: Option<&'a str>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let result = Config::load(Path::new(".")).and_then(|config| return run(cli.command, config));
    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        },
    };
}

/// Log to stderr, filtered by `RUST_LOG` (default `repodex=info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new("repodex=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Dispatch one subcommand.
///
/// # Errors
///
/// Returns resolution, I/O, and per-path errors from the library.
fn run(command: Commands, config: Config) -> Result<ExitCode, Error> {
    let default_budget = config.max_lines;
    let indexer = Indexer::new(config);
    let open = |target: &Target| return indexer.open(&target.location, target.reference.as_deref());

    match command {
        Commands::Info { target } => {
            let repo = open(&target)?;
            print_info(&repo, target.json);
        },
        Commands::Files { target } => {
            let files = open(&target)?.file_tree();
            if target.json {
                print_json(&files);
            } else {
                for file in files {
                    println!("{}", file.display());
                }
            }
        },
        Commands::Index { target } => {
            let report = open(&target)?.index_all();
            if target.json {
                print_json(&report);
            } else {
                for record in &report.records {
                    println!(
                        "{:<8} {:>4} {}{}",
                        record.language.as_deref().unwrap_or("-"),
                        record.symbol_count,
                        record.path.display(),
                        if record.reused { " (cached)" } else { "" }
                    );
                }
                if !report.failures.is_empty() {
                    eprint!("{}", diagnostics::render_failures(&report.failures));
                }
            }
            if !report.failures.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Symbols { target, path } => {
            let symbols = open(&target)?.symbols_for(&path)?;
            if target.json {
                print_json(&*symbols);
            } else {
                for symbol in symbols.iter() {
                    println!(
                        "{}-{}\t{}\t{}",
                        symbol.start_line,
                        symbol.end_line,
                        symbol.kind,
                        symbol.qualified_name(&symbols)
                    );
                }
            }
        },
        Commands::Chunks {
            target,
            path,
            max_lines,
            by_symbols,
        } => {
            let repo = open(&target)?;
            let budget = max_lines.unwrap_or(default_budget);
            let chunks = if by_symbols {
                repo.chunk_by_symbols(&path, budget)?
            } else {
                repo.chunk_by_lines(&path, budget)?
            };
            if target.json {
                print_json(&chunks);
            } else {
                print_chunks(&chunks);
            }
        },
    }
    return Ok(ExitCode::SUCCESS);
}

/// Print snapshot metadata.
fn print_info(repo: &Repository, json: bool) {
    let info = InfoJson {
        branch: repo.current_branch(),
        identity: repo.identity().to_string(),
        remote_url: repo.remote_url(),
        requested_ref: repo.requested_ref(),
        root: repo.root(),
        sha: repo.current_sha(),
        sha_short: repo.current_sha_short(),
    };
    if json {
        print_json(&info);
        return;
    }
    println!("identity:  {}", info.identity);
    println!("root:      {}", info.root.display());
    println!("ref:       {}", info.requested_ref.unwrap_or("-"));
    println!("sha:       {}", info.sha.unwrap_or("-"));
    println!("short:     {}", info.sha_short.unwrap_or("-"));
    println!("branch:    {}", info.branch.unwrap_or("-"));
    println!("remote:    {}", info.remote_url.unwrap_or("-"));
}

/// Print chunks with a header line each.
fn print_chunks(chunks: &[Chunk]) {
    for chunk in chunks {
        let split = chunk.split.as_ref().map_or_else(String::new, |s| {
            return format!(" [{} {}/{}]", s.symbol, s.part, s.total);
        });
        println!("── lines {}-{}{split} ──", chunk.start_line, chunk.end_line);
        print!("{}", chunk.content);
        if !chunk.content.ends_with('\n') {
            println!();
        }
    }
}

/// Pretty JSON to stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) {
    // Serializing these plain data types cannot fail.
    let json = serde_json::to_string_pretty(value).unwrap_or_default();
    println!("{json}");
}
