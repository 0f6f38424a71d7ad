use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use notetool_core::config::{NoteConfig, load_config};
use notetool_core::extract::extract_key_passages;
use notetool_core::fetcher::{ContentFetcher, HttpFetcher};
use notetool_core::pipeline::{RunOptions, run_daily};
use notetool_core::report::RunReport;
use notetool_core::store::EtapiClient;

#[derive(Debug, Parser)]
#[command(
    name = "notetool",
    version,
    about = "Daily maintenance pipeline for a Trilium note store"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file path")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Extra env file to load")]
    env_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Also load ~/.notetool/.env")]
    global_env: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the daily batch against the configured note store")]
    Run(RunArgs),
    #[command(about = "Fetch a URL and print the extracted article")]
    Fetch(FetchArgs),
    #[command(about = "Extract highlighted passages from a local HTML file")]
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value_t = 1, value_name = "DAYS")]
    days_back: u32,
    #[arg(long, default_value_t = 100, value_name = "N")]
    max_notes: usize,
    #[arg(long, value_name = "ID", help = "Process a single note instead of the daily selection")]
    note_id: Option<String>,
    #[arg(long, help = "Print per-note events")]
    verbose: bool,
    #[arg(long, conflicts_with = "verbose", help = "Only print errors")]
    quiet: bool,
    #[arg(long, help = "Print the full report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct FetchArgs {
    url: String,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    load_env(&cli)?;
    let config = load_config(&config_path(&cli))?;

    match &cli.command {
        Commands::Run(args) => run_batch(&config, args),
        Commands::Fetch(args) => run_fetch(&config, args),
        Commands::Extract(args) => run_extract(args),
    }
}

fn load_env(cli: &Cli) -> Result<()> {
    dotenvy::dotenv().ok();
    if cli.global_env
        && let Some(home) = std::env::var_os("HOME")
    {
        let global = PathBuf::from(home).join(".notetool").join(".env");
        if global.exists() {
            let _ = dotenvy::from_path_override(&global);
        }
    }
    if let Some(path) = &cli.env_file {
        dotenvy::from_path_override(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
    }
    Ok(())
}

fn config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    let local = PathBuf::from("notetool.toml");
    if local.exists() {
        return local;
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".notetool").join("config.toml"),
        None => local,
    }
}

fn run_batch(config: &NoteConfig, args: &RunArgs) -> Result<()> {
    let (server_url, _) = config.require_connection()?;
    let mut store = EtapiClient::from_config(config)?;
    let fetcher = HttpFetcher::from_config(config)?;

    if !args.quiet && !args.json {
        println!("daily run");
        println!("server: {server_url}");
        println!("days_back: {}", args.days_back);
        println!("max_notes: {}", args.max_notes);
        if let Some(note_id) = &args.note_id {
            println!("note_id: {note_id}");
        }
    }

    let options = RunOptions {
        days_back: args.days_back,
        max_notes: args.max_notes,
        note_id: args.note_id.clone(),
    };
    let report = run_daily(&mut store, &fetcher, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if !args.quiet {
        print_report(&report, args.verbose);
    }
    print_errors(&report);
    Ok(())
}

fn print_report(report: &RunReport, verbose: bool) {
    println!("created_selected: {}", report.created_selected);
    println!("modified_selected: {}", report.modified_selected);
    println!("revisions.total: {}", report.revisions.total);
    println!("revisions.successful: {}", report.revisions.successful);
    println!("revisions.failed: {}", report.revisions.failed);
    println!("clips.processed: {}", report.clips.processed);
    println!("clips.merged: {}", report.clips.merged);
    println!("clips.titles_updated: {}", report.clips.titles_updated);
    println!("links.processed: {}", report.links.processed);
    println!("links.urls_found: {}", report.links.urls_found);
    println!("links.content_fetched: {}", report.links.content_fetched);
    println!("reads.processed: {}", report.reads.processed);
    println!(
        "reads.highlights_extracted: {}",
        report.reads.highlights_extracted
    );
    println!("requests: {}", report.request_count);
    if verbose && !report.events.is_empty() {
        println!("events:");
        for event in &report.events {
            println!("  {} {:?}: {}", event.note_id, event.kind, event.message);
        }
    }
}

fn print_errors(report: &RunReport) {
    println!("errors.count: {}", report.errors.len());
    for error in &report.errors {
        println!("  - {error}");
    }
}

fn run_fetch(config: &NoteConfig, args: &FetchArgs) -> Result<()> {
    let fetcher = HttpFetcher::from_config(config)?;
    let Some(article) = fetcher.fetch_article(&args.url) else {
        bail!("could not fetch an article from {}", args.url);
    };

    println!("url: {}", args.url);
    println!("title: {}", article.title);
    if !article.authors.is_empty() {
        println!("authors: {}", article.authors.join(", "));
    }
    if let Some(date) = &article.publish_date {
        println!("date: {date}");
    }
    println!();
    println!("{}", article.html);
    Ok(())
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    let content = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    match extract_key_passages(&content) {
        Some(condensed) => {
            println!("{condensed}");
            Ok(())
        }
        None => bail!("no highlighted text or links found in {}", args.file.display()),
    }
}
