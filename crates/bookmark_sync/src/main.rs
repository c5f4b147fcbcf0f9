use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bookmark_sync_core::chrome_export::parse_chrome_projection;
use bookmark_sync_core::config::{SyncConfig, load_config};
use bookmark_sync_core::filesystem::{display_path, latest_json_file};
use bookmark_sync_core::logging::{LOG_LEVEL_ENV, default_log_level, init_logging};
use bookmark_sync_core::model::BookmarkNode;
use bookmark_sync_core::pipeline::{
    RunOptions, StageReport, load_forest, merge_snapshots, require_stage_output,
    resolve_live_chrome, run_all, snapshot_chrome, snapshot_safari, sync_to_chrome,
    sync_to_safari,
};
use bookmark_sync_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, absolutize, init_layout,
    inspect_runtime, resolve_paths,
};
use bookmark_sync_core::stats::{
    NodeCounts, chrome_leaf_pairs, count_chrome_document, count_forest, leaf_pairs,
    verify_normalized,
};
use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;

#[derive(Debug, Parser)]
#[command(
    name = "bookmark-sync",
    version,
    about = "Merge Chrome and Safari bookmarks and project them back into each browser's format"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "trace|debug|info|warn|error|off (default: BOOKMARK_SYNC_LOG or build default)"
    )]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .bookmark_sync/ and a commented config.toml")]
    Init(InitArgs),
    #[command(about = "Snapshot one browser's bookmarks into the common tree model")]
    Parse(ParseArgs),
    #[command(about = "Merge the newest Chrome and Safari snapshots")]
    Merge,
    #[command(about = "Project the newest merged forest into browser formats")]
    Sync(SyncArgs),
    #[command(about = "Parse, merge and sync in one run")]
    Run(RunArgs),
    #[command(about = "Count folders and bookmarks in a forest or Chrome document")]
    Stats(StatsArgs),
    #[command(about = "Check stage outputs for normalization and leaf preservation")]
    Verify(VerifyArgs),
    Status,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
    #[arg(long, help = "Skip writing .bookmark_sync/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[command(subcommand)]
    browser: Browser,
}

#[derive(Debug, Subcommand)]
enum Browser {
    Chrome(SourceArgs),
    Safari(SourceArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[arg(long, value_name = "PATH", help = "Source file (overrides env and config)")]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[command(subcommand)]
    target: SyncTarget,
}

#[derive(Debug, Subcommand)]
enum SyncTarget {
    Chrome(LiveArgs),
    Safari,
    All(LiveArgs),
}

#[derive(Debug, Args)]
struct LiveArgs {
    #[arg(long, help = "Only write the chrome_sync/ stage output")]
    no_live: bool,
    #[arg(long, value_name = "PATH", help = "Live Chrome Bookmarks file to replace")]
    live_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_name = "PATH")]
    chrome_file: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    safari_file: Option<PathBuf>,
    #[command(flatten)]
    live: LiveArgs,
}

#[derive(Debug, Args)]
struct StatsArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[command(subcommand)]
    target: VerifyTarget,
}

#[derive(Debug, Subcommand)]
enum VerifyTarget {
    #[command(about = "Every merged node carries the sentinel path and depth 0")]
    Merged,
    #[command(about = "The Chrome projection holds the same bookmarks as the merged forest")]
    Chrome,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    start_logging(cli.log_level.as_deref())?;
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Parse(ParseArgs { browser })) => run_parse(&runtime, browser),
        Some(Commands::Merge) => run_merge(&runtime),
        Some(Commands::Sync(SyncArgs { target })) => match target {
            SyncTarget::Chrome(live) => run_sync_chrome(&runtime, &live),
            SyncTarget::Safari => run_sync_safari(&runtime),
            SyncTarget::All(live) => {
                run_sync_chrome(&runtime, &live)?;
                run_sync_safari(&runtime)
            }
        },
        Some(Commands::Run(args)) => run_pipeline(&runtime, args),
        Some(Commands::Stats(StatsArgs { file })) => run_stats(&file),
        Some(Commands::Verify(VerifyArgs { target })) => match target {
            VerifyTarget::Merged => run_verify_merged(&runtime),
            VerifyTarget::Chrome => run_verify_chrome(&runtime),
        },
        Some(Commands::Status) => run_status(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn start_logging(flag: Option<&str>) -> Result<()> {
    dotenvy::dotenv().ok();
    let level = match flag {
        Some(level) => level.to_string(),
        None => env::var(LOG_LEVEL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default_log_level().to_string()),
    };
    init_logging(&level)
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;
    println!("Initialized bookmark-sync runtime layout");
    println!("project_root: {}", display_path(&paths.project_root));
    println!("state_dir: {}", display_path(&paths.state_dir));
    println!("config_path: {}", display_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_parse(runtime: &RuntimeOptions, browser: Browser) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let now = Local::now();
    let report = match browser {
        Browser::Chrome(args) => {
            let source = chrome_source(&paths, &config, args.file)?;
            println!("source: {}", display_path(&source));
            snapshot_chrome(&paths, &source, now)?
        }
        Browser::Safari(args) => {
            let source = safari_source(&paths, &config, args.file)?;
            println!("source: {}", display_path(&source));
            snapshot_safari(&paths, &source, now)?
        }
    };
    print_stage_report(&report);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_merge(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = merge_snapshots(&paths, Local::now())?;
    print_stage_report(&report);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_sync_chrome(runtime: &RuntimeOptions, live: &LiveArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let source = chrome_source(&paths, &config, None).ok();
    let live_file = live_target(&paths, &config, live, source);

    let report = sync_to_chrome(&paths, live_file.as_deref(), Local::now())?;
    println!("stage: sync_chrome");
    println!("output: {}", display_path(&report.output));
    for (root, counts) in &report.counts {
        print_counts(&format!("roots.{root}"), counts);
    }
    println!(
        "live_target: {}",
        report
            .live_target
            .as_deref()
            .map(display_path)
            .unwrap_or_else(|| "<skipped>".to_string())
    );
    println!(
        "backup_path: {}",
        report
            .backup_path
            .as_deref()
            .map(display_path)
            .unwrap_or_else(|| "<none>".to_string())
    );
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_sync_safari(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = sync_to_safari(&paths, Local::now())?;
    println!("stage: sync_safari");
    println!("json_output: {}", display_path(&report.json_output));
    println!("html_output: {}", display_path(&report.html_output));
    println!(
        "instructions_output: {}",
        display_path(&report.instructions_output)
    );
    println!("bookmarks: {}", report.bookmarks);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_pipeline(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let chrome = chrome_source(&paths, &config, args.chrome_file)?;
    let options = RunOptions {
        live_chrome: live_target(&paths, &config, &args.live, Some(chrome.clone())),
        chrome_source: chrome,
        safari_source: safari_source(&paths, &config, args.safari_file)?,
    };

    let report = run_all(&paths, &options, Local::now())?;
    print_stage_report(&report.chrome_snapshot);
    print_stage_report(&report.safari_snapshot);
    print_stage_report(&report.merged);
    println!("chrome_sync.output: {}", display_path(&report.chrome_sync.output));
    println!(
        "chrome_sync.backup_path: {}",
        report
            .chrome_sync
            .backup_path
            .as_deref()
            .map(display_path)
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!(
        "safari_sync.html_output: {}",
        display_path(&report.safari_sync.html_output)
    );
    println!("safari_sync.bookmarks: {}", report.safari_sync.bookmarks);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_stats(file: &Path) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    println!("file: {}", display_path(file));
    if value.get("roots").is_some() {
        let document = parse_chrome_projection(&bytes)?;
        println!("kind: chrome_document");
        for (root, counts) in count_chrome_document(&document) {
            print_counts(&format!("roots.{root}"), &counts);
        }
    } else {
        let forest: Vec<BookmarkNode> = serde_json::from_value(value).with_context(|| {
            format!("{} is neither a forest nor a Chrome document", file.display())
        })?;
        println!("kind: forest");
        println!("top_level: {}", forest.len());
        for (source, counts) in count_forest(&forest) {
            print_counts(&format!("sources.{source}"), &counts);
        }
    }
    Ok(())
}

fn run_verify_merged(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let merged_path = require_stage_output(&paths.merged_dir, "merge")?;
    let merged = load_forest(&merged_path)?;
    println!("verify merged");
    println!("file: {}", display_path(&merged_path));
    if let Some(violation) = verify_normalized(&merged) {
        bail!(
            "node `{}` is not normalized (path={:?}, depth={})",
            violation.name,
            violation.path,
            violation.depth
        );
    }
    println!("normalized: yes");
    Ok(())
}

fn run_verify_chrome(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let merged_path = require_stage_output(&paths.merged_dir, "merge")?;
    let projected_path = require_stage_output(&paths.chrome_sync_dir, "sync chrome")?;
    let merged = load_forest(&merged_path)?;
    let projected_bytes = fs::read(&projected_path)
        .with_context(|| format!("failed to read {}", projected_path.display()))?;
    let document = parse_chrome_projection(&projected_bytes)?;

    let mut expected = leaf_pairs(&merged);
    let mut actual = chrome_leaf_pairs(&document);
    expected.sort();
    actual.sort();
    println!("verify chrome");
    println!("merged: {}", display_path(&merged_path));
    println!("projected: {}", display_path(&projected_path));
    println!("merged_bookmarks: {}", expected.len());
    println!("projected_bookmarks: {}", actual.len());
    if expected != actual {
        bail!("projected Chrome document does not hold the same bookmarks as the merged forest");
    }
    println!("bookmarks_preserved: yes");
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    let config = load_config(&paths.config_path)?;
    println!("runtime status");
    println!("project_root: {}", display_path(&paths.project_root));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "sources.chrome: {}",
        display_optional(config.chrome_bookmarks().as_deref())
    );
    println!(
        "sources.safari: {}",
        display_optional(config.safari_bookmarks().as_deref())
    );
    println!("sync.write_live_chrome: {}", format_flag(config.write_live_chrome()));
    for (label, dir) in [
        ("chrome", &paths.chrome_snapshot_dir),
        ("safari", &paths.safari_snapshot_dir),
        ("merged", &paths.merged_dir),
        ("chrome_sync", &paths.chrome_sync_dir),
    ] {
        println!(
            "latest.{label}: {}",
            display_optional(latest_json_file(dir)?.as_deref())
        );
    }
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn chrome_source(
    paths: &ResolvedPaths,
    config: &SyncConfig,
    flag: Option<PathBuf>,
) -> Result<PathBuf> {
    match flag.or_else(|| config.chrome_bookmarks()) {
        Some(path) => Ok(absolutize(&path, &paths.project_root)),
        None => bail!(
            "no Chrome bookmarks file: pass --file, set BOOKMARK_SYNC_CHROME, or set [sources] chrome"
        ),
    }
}

fn safari_source(
    paths: &ResolvedPaths,
    config: &SyncConfig,
    flag: Option<PathBuf>,
) -> Result<PathBuf> {
    match flag.or_else(|| config.safari_bookmarks()) {
        Some(path) => Ok(absolutize(&path, &paths.project_root)),
        None => bail!(
            "no Safari bookmarks file: pass --file, set BOOKMARK_SYNC_SAFARI, or set [sources] safari"
        ),
    }
}

/// Live Chrome file: `--live-file`, else the Chrome source this command reads.
fn live_target(
    paths: &ResolvedPaths,
    config: &SyncConfig,
    live: &LiveArgs,
    chrome_source: Option<PathBuf>,
) -> Option<PathBuf> {
    let enabled = !live.no_live && config.write_live_chrome();
    if !enabled {
        info!("event=live_write_skipped reason=disabled");
    }
    let explicit = live
        .live_file
        .as_deref()
        .map(|path| absolutize(path, &paths.project_root));
    let target = resolve_live_chrome(enabled, explicit, chrome_source);
    if enabled && target.is_none() {
        info!("event=live_write_skipped reason=no_chrome_source");
    }
    target
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn print_stage_report(report: &StageReport) {
    println!("stage: {}", report.stage);
    println!("output: {}", display_path(&report.output));
    println!("top_level: {}", report.top_level);
    println!("nodes: {}", report.nodes);
}

fn print_counts(prefix: &str, counts: &NodeCounts) {
    println!("{prefix}.folders: {}", counts.folders);
    println!("{prefix}.urls: {}", counts.urls);
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn display_optional(path: Option<&Path>) -> String {
    path.map(display_path)
        .unwrap_or_else(|| "<unset>".to_string())
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
