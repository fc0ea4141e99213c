//! promptpack - pick the files of a project that go into an LLM prompt.
//!
//! Usage:
//!   ppk scan [PATH]            Scan (or reuse the cached scan) and summarize
//!   ppk tree [PATH]            Show the tree with inclusion markers
//!   ppk toggle PATHS...        Exclude or re-include paths
//!   ppk all [PATH]             Include everything
//!   ppk none [PATH]            Exclude everything
//!   ppk files [PATH]           List the files that go into the prompt
//!   ppk status [PATH]          Selection totals
//!   ppk workspaces             List known workspaces
//!   ppk close [PATH]           Forget a workspace from the recent list
//!   ppk --help                 Show help

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use itertools::Itertools;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use promptpack_core::{ProjectTree, path};
use promptpack_select::{AssembleOptions, EffectiveState, Inclusion, ToggleOutcome, estimate_tokens};
use promptpack_workspace::{
    CacheOptions, ConfigFile, ExclusionStore, ProjectCache, ScanEvent, ScanReport, Session,
    start_open,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PROMPTPACK_LOG";

#[derive(Parser)]
#[command(
    name = "promptpack",
    version,
    about = "Pick the files of a project that go into an LLM prompt",
    long_about = "promptpack scans a project, remembers which folders and files you \
                  excluded, and lists the files that remain so they can be packed \
                  into a prompt. Exclusions cascade to everything below a folder."
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for cached scans (defaults to the platform cache directory)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write cached scans
    #[arg(long, global = true)]
    no_cache: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RootArg {
    /// Workspace root
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[derive(Args)]
struct ScanArgs {
    /// Always walk the tree, even if the cached scan looks current
    #[arg(short, long)]
    force: bool,

    /// Also compare every file's size and mtime against the cache
    #[arg(long)]
    verify: bool,
}

impl ScanArgs {
    fn options(&self) -> CacheOptions {
        CacheOptions {
            force: self.force,
            verify_files: self.verify,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Scan a workspace and summarize what changed
    Scan {
        #[command(flatten)]
        root: RootArg,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Show the tree with inclusion markers
    Tree {
        #[command(flatten)]
        root: RootArg,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Show all entries (no depth limit on display)
        #[arg(short, long)]
        all: bool,
    },

    /// Exclude a path, or re-include it if it is excluded
    Toggle {
        /// Paths relative to the workspace root
        #[arg(required = true)]
        paths: Vec<String>,

        /// Workspace root
        #[arg(short = 'C', long, default_value = ".")]
        root: PathBuf,
    },

    /// Include everything
    All(RootArg),

    /// Exclude everything
    None(RootArg),

    /// List the files that go into the prompt
    Files {
        #[command(flatten)]
        root: RootArg,

        /// Only files below this folder
        #[arg(long)]
        folder: Option<String>,

        /// Stop after this many files
        #[arg(short = 'n', long)]
        max_files: Option<usize>,

        /// Leave out files that look binary
        #[arg(long)]
        skip_binary: bool,

        /// Estimate the prompt size in tokens
        #[arg(long)]
        tokens: bool,
    },

    /// Show selection totals
    Status(RootArg),

    /// List known workspaces, most recent first
    Workspaces,

    /// Forget a workspace from the recent list
    Close {
        #[command(flatten)]
        root: RootArg,

        /// Also delete its cached scan
        #[arg(long)]
        purge_cache: bool,
    },
}

struct App {
    store: Arc<ConfigFile>,
    cache: ProjectCache,
    session: Arc<Session>,
    json: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let app = App::new(&cli);

    match cli.command {
        Command::Scan { root, scan } => app.run_scan(&root.path, scan.options()),
        Command::Tree { root, depth, all } => {
            app.run_tree(&root.path, if all { None } else { Some(depth) })
        }
        Command::Toggle { paths, root } => app.run_toggle(&root, &paths),
        Command::All(root) => app.run_bulk(&root.path, true),
        Command::None(root) => app.run_bulk(&root.path, false),
        Command::Files {
            root,
            folder,
            max_files,
            skip_binary,
            tokens,
        } => {
            let options = AssembleOptions {
                max_files,
                skip_binary,
            };
            app.run_files(&root.path, folder.as_deref(), options, tokens)
        }
        Command::Status(root) => app.run_status(&root.path),
        Command::Workspaces => app.run_workspaces(),
        Command::Close { root, purge_cache } => app.run_close(&root.path, purge_cache),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl App {
    fn new(cli: &Cli) -> Self {
        let config_path = cli.config.clone().unwrap_or_else(ConfigFile::default_path);
        debug!(config = %config_path.display(), "using config file");
        let store = Arc::new(ConfigFile::open(config_path));
        let cache = if cli.no_cache {
            ProjectCache::disabled()
        } else {
            ProjectCache::new(cli.cache_dir.clone().unwrap_or_else(ProjectCache::default_dir))
        };
        let session = Arc::new(Session::new(store.clone(), cache.clone()));
        Self {
            store,
            cache,
            session,
            json: cli.json,
        }
    }

    /// Open a workspace quietly, reusing the cache when possible.
    fn open(&self, root: &Path) -> Result<PathBuf> {
        let report = self
            .session
            .open_workspace(root, CacheOptions::default())
            .with_context(|| format!("Failed to open {}", root.display()))?;
        Ok(report.root_path)
    }

    fn run_scan(&self, root: &Path, options: CacheOptions) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
        let report = runtime.block_on(async {
            let mut rx = start_open(self.session.clone(), root.to_path_buf(), options);
            let mut result = None;
            while let Some(event) = rx.recv().await {
                match event {
                    ScanEvent::Progress(progress) if !self.json => {
                        eprint!(
                            "\rScanning... {} files, {} folders",
                            progress.files_scanned, progress.dirs_scanned
                        );
                        let _ = std::io::stderr().flush();
                    }
                    ScanEvent::Progress(_) => {}
                    ScanEvent::Complete(outcome) => result = Some(outcome),
                }
            }
            result
        });
        if !self.json {
            eprint!("\r\x1b[2K");
        }

        let Some(report) = report else {
            bail!("Scan task ended without a result");
        };
        let report = report.with_context(|| format!("Failed to scan {}", root.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        print_report(&report);
        Ok(())
    }

    fn run_tree(&self, root: &Path, max_depth: Option<u32>) -> Result<()> {
        let root = self.open(root)?;
        let tree = self.session.tree(&root)?;
        let effective = self.session.effective(&root)?;

        if self.json {
            let entries: Vec<_> = tree
                .iter()
                .filter(|node| !node.is_root())
                .map(|node| {
                    serde_json::json!({
                        "path": node.path,
                        "kind": node.kind,
                        "size": node.size,
                        "state": effective.get(&node.path),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        print_node(&tree, &effective, path::ROOT, 0, max_depth.unwrap_or(u32::MAX));
        Ok(())
    }

    fn run_toggle(&self, root: &Path, paths: &[String]) -> Result<()> {
        let root = self.open(root)?;
        let mut outcomes = Vec::with_capacity(paths.len());
        for raw in paths {
            let outcome = self.session.toggle(&root, raw)?;
            outcomes.push((path::normalize(raw), outcome));
        }

        if self.json {
            let entries: Vec<_> = outcomes
                .iter()
                .map(|(path, outcome)| serde_json::json!({ "path": path, "result": outcome }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        for (path, outcome) in &outcomes {
            println!("{}", describe_toggle(path, outcome));
        }
        Ok(())
    }

    fn run_bulk(&self, root: &Path, included: bool) -> Result<()> {
        let root = self.open(root)?;
        let counts = self.session.bulk_set(&root, included)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&counts)?);
        } else {
            println!(
                "{} files included ({}), {} excluded",
                counts.included_files,
                format_size(counts.included_bytes),
                counts.excluded_files
            );
        }
        Ok(())
    }

    fn run_files(
        &self,
        root: &Path,
        folder: Option<&str>,
        options: AssembleOptions,
        tokens: bool,
    ) -> Result<()> {
        let root = self.open(root)?;
        if let Some(folder) = folder {
            let tree = self.session.tree(&root)?;
            if !tree.get(&path::normalize(folder)).is_some_and(|n| n.is_folder()) {
                bail!("No folder {folder} in {}", root.display());
            }
        }

        let assembly = self.session.assemble(&root, options, folder)?;
        let token_estimate = tokens.then(|| {
            assembly
                .files
                .iter()
                .map(|file| {
                    std::fs::read(path::to_fs(&root, file))
                        .map(|bytes| estimate_tokens(&String::from_utf8_lossy(&bytes)))
                        .unwrap_or(0)
                })
                .sum::<usize>()
        });

        if self.json {
            let value = serde_json::json!({
                "files": assembly.files,
                "truncated": assembly.truncated,
                "skipped_binary": assembly.skipped_binary,
                "tokens": token_estimate,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        for file in &assembly.files {
            println!("{file}");
        }
        if assembly.truncated {
            eprintln!("(stopped after {} files)", assembly.files.len());
        }
        if !assembly.skipped_binary.is_empty() {
            eprintln!(
                "skipped {} binary file(s): {}",
                assembly.skipped_binary.len(),
                assembly.skipped_binary.iter().join(", ")
            );
        }
        if let Some(tokens) = token_estimate {
            eprintln!("~{tokens} tokens");
        }
        Ok(())
    }

    fn run_status(&self, root: &Path) -> Result<()> {
        let root = self.open(root)?;
        let counts = self.session.counts(&root)?;
        let record = self.session.record(&root)?;

        if self.json {
            let value = serde_json::json!({
                "root": root,
                "counts": counts,
                "excluded": record.exclusions.iter().collect::<Vec<_>>(),
                "dormant": record.dormant_count(),
                "last_scanned_at": record.last_scanned_at(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        println!("{}", "─".repeat(60));
        println!(" {}", root.display());
        println!(
            " {} files included ({}), {} files excluded, {} folders excluded",
            counts.included_files,
            format_size(counts.included_bytes),
            counts.excluded_files,
            counts.excluded_folders
        );
        println!(
            " Last scanned {}",
            record.last_scanned_at().format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("{}", "─".repeat(60));
        if !record.exclusions.is_empty() {
            println!(" Excluded: {}", record.exclusions.iter().join(", "));
        }
        if record.dormant_count() > 0 {
            println!(
                " {} exclusion(s) name paths that no longer exist",
                record.dormant_count()
            );
        }
        Ok(())
    }

    fn run_workspaces(&self) -> Result<()> {
        let config = self.store.config();

        if self.json {
            let value = serde_json::json!({
                "active": config.active_workspace,
                "recent": config.recent_workspaces,
                "workspaces": config.workspaces,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if config.recent_workspaces.is_empty() {
            println!("No recent workspaces.");
            return Ok(());
        }
        for root in &config.recent_workspaces {
            let marker = if config.active_workspace.as_ref() == Some(root) {
                "*"
            } else {
                " "
            };
            let excluded = config.entry(root).map_or(0, |e| e.exclusion_set.len());
            println!("{marker} {} ({excluded} excluded)", root.display());
        }
        Ok(())
    }

    fn run_close(&self, root: &Path, purge_cache: bool) -> Result<()> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        self.store
            .closed(&root)
            .with_context(|| format!("Failed to update {}", self.store.path().display()))?;
        if purge_cache {
            self.cache.remove(&root)?;
        }
        if !self.json {
            println!("Closed {}", root.display());
        }
        Ok(())
    }
}

fn print_report(report: &ScanReport) {
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        report.root_path.display(),
        format_size(report.stats.total_size)
    );
    println!(
        " {} files, {} folders",
        report.stats.total_files, report.stats.total_folders
    );
    if report.fast_path {
        println!(" Cached scan is current");
    } else if report.changes.is_empty() {
        println!(" Scanned, no changes");
    } else {
        println!(
            " {} added, {} removed, {} modified",
            report.changes.added.len(),
            report.changes.removed.len(),
            report.changes.modified.len()
        );
    }
    println!("{}", "─".repeat(60));

    for added in &report.changes.added {
        println!(" + {added}");
    }
    for removed in &report.changes.removed {
        println!(" - {removed}");
    }
    for modified in &report.changes.modified {
        println!(" ~ {modified}");
    }
    if report.warnings > 0 {
        println!();
        println!("{} warning(s) during scan", report.warnings);
    }
    if report.dormant > 0 {
        println!("{} exclusion(s) name paths that no longer exist", report.dormant);
    }
}

/// Print a node and its children.
fn print_node(
    tree: &ProjectTree,
    effective: &EffectiveState,
    path: &str,
    depth: u32,
    max_depth: u32,
) {
    let Some(node) = tree.get(path) else {
        return;
    };

    let marker = match effective.get(path) {
        Some(Inclusion::Included) => "[x]",
        Some(Inclusion::Excluded) => "[ ]",
        Some(Inclusion::ExcludedByAncestor) | None => "[-]",
    };
    let indent = "  ".repeat(depth as usize);
    let name = if node.is_folder() {
        format!("{}/", node.name)
    } else {
        node.name.to_string()
    };
    println!(
        "{indent}{marker} {:<40} {:>10}",
        truncate(&name, 40),
        format_size(node.size)
    );

    if node.is_folder() && depth < max_depth {
        for child in &node.children {
            print_node(tree, effective, child, depth + 1, max_depth);
        }
    } else if node.is_folder() && !node.children.is_empty() {
        let indent = "  ".repeat((depth + 1) as usize);
        println!("{indent}    ... {} more", node.children.len());
    }
}

fn describe_toggle(path: &str, outcome: &ToggleOutcome) -> String {
    match outcome {
        ToggleOutcome::Excluded => format!("excluded {path}"),
        ToggleOutcome::Included => format!("included {path}"),
        ToggleOutcome::Unlisted { blocked_by } => {
            format!("unlisted {path} (still excluded by {blocked_by})")
        }
        ToggleOutcome::Blocked { ancestor } => {
            format!("{path} is excluded by {ancestor}; toggle {ancestor} first")
        }
        ToggleOutcome::NotFound => format!("{path} is not in the tree"),
        ToggleOutcome::Root => "the root cannot be toggled; use `all` or `none`".to_string(),
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
