//! tracefilter CLI: filter recordings, print summaries.

#[cfg(feature = "fast-alloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracefilter::{filter_recording, summarize, EventSelector};

#[derive(Parser)]
#[command(name = "tracefilter", about = "Filter chunked event recordings")]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep selected events and the pool entries they reference
    Filter(FilterArgs),
    /// Print chunks, event counts and checkpoints of a recording
    Summary(SummaryArgs),
}

#[derive(Args)]
struct FilterArgs {
    /// Input recording
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (optional; without -o `<name>.filtered.<ext>` next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Comma-separated event type patterns to keep (`*` wildcard)
    #[arg(long, value_name = "PATTERNS")]
    include_events: Option<String>,

    /// Comma-separated event type patterns to drop (wins over --include-events)
    #[arg(long, value_name = "PATTERNS")]
    exclude_events: Option<String>,
}

#[derive(Args)]
struct SummaryArgs {
    /// Input recording
    #[arg(short, long)]
    input: PathBuf,

    /// JSON instead of text (2-space indent)
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    // RUST_LOG gewinnt gegen -v
    if std::env::var_os("RUST_LOG").is_none() {
        match verbose {
            0 => {}
            1 => {
                builder.filter_level(log::LevelFilter::Debug);
            }
            _ => {
                builder.filter_level(log::LevelFilter::Trace);
            }
        }
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Filter(args) => run_filter(args),
        Command::Summary(args) => run_summary(args),
    }
}

fn selector(args: &FilterArgs) -> EventSelector {
    let mut selector = EventSelector::default();
    if let Some(list) = &args.include_events {
        selector = selector.with_include_list(list);
    }
    if let Some(list) = &args.exclude_events {
        selector = selector.with_exclude_list(list);
    }
    selector
}

fn run_filter(args: FilterArgs) -> Result<(), String> {
    let output = resolve_output_path(args.output.as_deref(), &args.input)?;
    if is_same_file(&args.input, &output) {
        return Err(format!("Ein- und Ausgabe sind dieselbe Datei: {}", output.display()));
    }
    let predicate = selector(&args).into_predicate().map_err(|e| e.to_string())?;

    // Erst in .tmp schreiben, bei Erfolg umbenennen; bei Fehler löscht der
    // Writer die .tmp-Datei selbst.
    let mut tmp = output.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let stats = filter_recording(&args.input, &tmp, predicate).map_err(|e| e.to_string())?;
    std::fs::rename(&tmp, &output).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        format!("Rename-Fehler: {e}")
    })?;

    eprintln!(
        "{}: {} of {} events, {} pool entries kept, {} purged ({} bytes)",
        output.display(),
        stats.events_written,
        stats.events_read,
        stats.entries_written,
        stats.entries_purged,
        stats.bytes_purged
    );
    Ok(())
}

fn run_summary(args: SummaryArgs) -> Result<(), String> {
    let summary = summarize(&args.input).map_err(|e| e.to_string())?;
    if args.json {
        let text = serde_json::to_string_pretty(&summary.to_json()).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        print!("{summary}");
    }
    Ok(())
}

/// Leitet den Output-Pfad ab: explizites `-o` direkt, sonst
/// `<stem>.filtered.<ext>` (bzw. `<name>.filtered` ohne Extension).
fn resolve_output_path(explicit: Option<&Path>, input: &Path) -> Result<PathBuf, String> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "ungueltiger Eingabepfad".to_string())?;
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.filtered.{ext}"),
        None => format!("{stem}.filtered"),
    };
    Ok(input.with_file_name(name))
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
