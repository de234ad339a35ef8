use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use colored::{ColoredString, Colorize};
use quarry_remote::{Credentials, DEFAULT_TOKEN_ENV};
use quarry_sdk::{
    EntryStatus, ErrorClass, Outcome, Repository, SdkError, TransferOptions, TransferReport,
};
use quarry_server::{QuarryServer, ServerConfig, ServerError};
use tracing::warn;

use crate::cli::*;

/// Worst failure class seen by a command that otherwise ran to completion.
pub type Failure = Option<ErrorClass>;

pub async fn run_command(cli: Cli) -> anyhow::Result<Failure> {
    let cwd = working_dir(cli.directory.as_deref())?;
    let ctx = Invocation {
        cwd,
        jobs: cli.jobs.map(|j| j.get()),
        remote: cli.remote,
    };
    match cli.command {
        Command::Init(args) => cmd_init(&ctx, args),
        Command::Track(args) => cmd_track(&ctx, args),
        Command::Untrack(args) => cmd_untrack(&ctx, args),
        Command::Push(args) => cmd_push(&ctx, args).await,
        Command::Pull(args) => cmd_pull(&ctx, args).await,
        Command::Status(args) => cmd_status(&ctx, args),
        Command::Checkout(args) => cmd_checkout(&ctx, args).await,
        Command::Remote(args) => cmd_remote(&ctx, args),
        Command::Gc(args) => cmd_gc(&ctx, args),
        Command::Serve(args) => cmd_serve(&ctx, args).await,
    }
}

/// Exit code for an error that stopped a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    let class = if let Some(e) = err.downcast_ref::<SdkError>() {
        e.class()
    } else if let Some(e) = err.downcast_ref::<ServerError>() {
        e.class()
    } else {
        ErrorClass::Other
    };
    class.exit_code()
}

struct Invocation {
    cwd: PathBuf,
    jobs: Option<usize>,
    remote: Option<String>,
}

impl Invocation {
    fn repo(&self) -> anyhow::Result<Repository> {
        Ok(Repository::discover(&self.cwd)?)
    }

    fn resolve(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| absolutize(&self.cwd, p)).collect()
    }

    /// Transfer options whose cancel token fires on Ctrl-C.
    fn options(&self, repo: &Repository) -> TransferOptions {
        let options = repo.transfer_options(self.jobs);
        let cancel = options.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} interrupted, finishing transfers in flight", "!".yellow().bold());
                cancel.cancel();
            }
        });
        options
    }
}

fn working_dir(directory: Option<&Path>) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    match directory {
        Some(dir) => std::fs::canonicalize(cwd.join(dir))
            .map_err(|e| anyhow::Error::from(SdkError::InvalidArgument(format!("-C {}: {e}", dir.display())))),
        None => Ok(cwd),
    }
}

/// Join `path` onto `base` and fold away `.` and `..` without touching the
/// filesystem (the path may not exist yet).
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn worse(a: Failure, b: ErrorClass) -> Failure {
    Some(a.map_or(b, |a| a.min(b)))
}

fn cmd_init(ctx: &Invocation, args: InitArgs) -> anyhow::Result<Failure> {
    let root = match &args.path {
        Some(p) => absolutize(&ctx.cwd, p),
        None => ctx.cwd.clone(),
    };
    std::fs::create_dir_all(&root).map_err(|e| SdkError::Io {
        path: root.clone(),
        source: e,
    })?;
    let repo = Repository::init(&root)?;
    println!(
        "{} Initialized quarry repository in {}",
        "✓".green().bold(),
        repo.root().display().to_string().bold()
    );
    println!("  Algorithm: {}", repo.config().core.algorithm.to_string().cyan());
    Ok(None)
}

fn cmd_track(ctx: &Invocation, args: TrackArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let mut failure = None;
    for path in ctx.resolve(&args.paths) {
        match repo.track(&path) {
            Ok(tracked) if tracked.changed() => println!(
                "  {} {} {} ({})",
                "tracked:".green(),
                tracked.entry.path,
                tracked.entry.digest.short_hex().dimmed(),
                human_bytes(tracked.entry.size)
            ),
            Ok(tracked) => println!("  {} {}", "unchanged:".dimmed(), tracked.entry.path),
            Err(e) => {
                eprintln!("  {} {}: {e}", "error:".red().bold(), path.display());
                failure = worse(failure, e.class());
            }
        }
    }
    Ok(failure)
}

fn cmd_untrack(ctx: &Invocation, args: TrackArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let mut failure = None;
    for path in ctx.resolve(&args.paths) {
        match repo.untrack(&path) {
            Ok(tracked) => println!("  {} {}", "untracked:".yellow(), tracked),
            Err(e) => {
                eprintln!("  {} {}: {e}", "error:".red().bold(), path.display());
                failure = worse(failure, e.class());
            }
        }
    }
    Ok(failure)
}

fn colorize_label(label: &'static str) -> ColoredString {
    let padded = format!("{label:<16}");
    match label {
        "uploaded" | "downloaded" | "restored" => padded.green(),
        "failed" | "unreadable" => padded.red().bold(),
        _ => padded.dimmed(),
    }
}

fn print_report<O: Outcome>(verb: &str, report: &TransferReport<O>) -> Failure {
    for item in &report.entries {
        let label = colorize_label(item.outcome.label());
        match item.outcome.failure() {
            Some(err) => println!("  {label} {}: {}", item.entry.path, err.to_string().red()),
            None => println!("  {label} {}", item.entry.path),
        }
    }
    for skipped in &report.unreadable {
        println!(
            "  {} {}: {}",
            colorize_label("unreadable"),
            skipped.pointer.display(),
            skipped.error.to_string().red()
        );
    }
    let mark = if report.is_success() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{mark} {verb}: {} ({})",
        report.summary(),
        human_bytes(report.bytes_transferred())
    );
    report.worst_class()
}

async fn cmd_push(ctx: &Invocation, args: PathsArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let options = ctx.options(&repo);
    let report = repo
        .push(&ctx.resolve(&args.paths), ctx.remote.as_deref(), options)
        .await?;
    Ok(print_report("push", &report))
}

async fn cmd_pull(ctx: &Invocation, args: PathsArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let options = ctx.options(&repo);
    let report = repo
        .pull(&ctx.resolve(&args.paths), ctx.remote.as_deref(), options)
        .await?;
    Ok(print_report("pull", &report))
}

async fn cmd_checkout(ctx: &Invocation, args: PathsArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let options = ctx.options(&repo);
    let report = repo
        .checkout(&ctx.resolve(&args.paths), ctx.remote.as_deref(), options)
        .await?;
    Ok(print_report("checkout", &report))
}

fn cmd_status(ctx: &Invocation, args: PathsArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let report = repo.status(&ctx.resolve(&args.paths))?;
    for (entry, status) in &report.entries {
        let label = format!("{:<10}", status.to_string());
        let label = match status {
            EntryStatus::Unchanged => label.dimmed(),
            EntryStatus::Modified => label.yellow(),
            EntryStatus::Missing => label.red(),
        };
        println!("  {label} {}", entry.path);
    }
    if report.is_clean() {
        println!("{} {} tracked, working copy matches", "✓".green().bold(), report.entries.len());
    } else {
        println!(
            "{} unchanged, {} modified, {} missing",
            report.count(EntryStatus::Unchanged),
            report.count(EntryStatus::Modified).to_string().yellow(),
            report.count(EntryStatus::Missing).to_string().red()
        );
    }
    Ok(None)
}

fn cmd_remote(ctx: &Invocation, args: RemoteArgs) -> anyhow::Result<Failure> {
    let mut repo = ctx.repo()?;
    match args.action {
        RemoteAction::Set { url, name, token_env } => {
            repo.set_remote(&name, &url, token_env)?;
            println!("{} Remote {} → {}", "✓".green().bold(), name.bold(), url.blue());
        }
        RemoteAction::List => {
            let config = repo.config();
            if config.remotes.is_empty() {
                println!("No remotes configured.");
            }
            for (name, remote) in &config.remotes {
                let marker = if config.core.remote.as_deref() == Some(name.as_str()) { "*" } else { " " };
                let token = remote.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
                let auth = match remote.credentials() {
                    Credentials::Anonymous => "anonymous".dimmed(),
                    Credentials::Bearer(_) => format!("token from ${token}").cyan(),
                };
                println!("{marker} {}  {}  ({auth})", name.bold(), remote.url.blue());
            }
        }
        RemoteAction::Remove { name } => {
            repo.remove_remote(&name)?;
            println!("Removed remote {}", name.bold());
        }
    }
    Ok(None)
}

fn cmd_gc(ctx: &Invocation, args: GcArgs) -> anyhow::Result<Failure> {
    let repo = ctx.repo()?;
    let keep = ctx.resolve(&args.keep);
    let report = repo.gc(args.dry_run, &keep)?;
    for digest in &report.removed {
        println!("  {} {}", "removed:".yellow(), digest.blob_ref());
    }
    let verb = if report.dry_run { "would remove" } else { "removed" };
    if report.stale_staging > 0 {
        println!("  {} {} stale staging file(s)", format!("{verb}:").yellow(), report.stale_staging);
    }
    println!(
        "{} GC: {verb} {} of {} blobs, {} freed",
        "✓".green().bold(),
        report.removed.len(),
        report.scanned,
        human_bytes(report.bytes_freed)
    );
    Ok(None)
}

async fn cmd_serve(ctx: &Invocation, args: ServeArgs) -> anyhow::Result<Failure> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(&absolutize(&ctx.cwd, path))?,
        None => ServerConfig {
            root: ctx.cwd.clone(),
            ..ServerConfig::default()
        },
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = &args.root {
        config.root = absolutize(&ctx.cwd, root);
    }
    if let Some(limit) = args.max_object_size {
        config.max_object_size = limit;
    }
    if let Some(var) = &args.token_env {
        match Credentials::from_env(var) {
            Credentials::Bearer(token) => config.auth_token = Some(token),
            Credentials::Anonymous => {
                return Err(SdkError::InvalidArgument(format!("${var} is not set")).into())
            }
        }
    }

    println!(
        "Quarry object store on {} (root: {}, auth: {})",
        config.bind_addr.to_string().bold(),
        config.root.display(),
        if config.auth_token.is_some() { "token" } else { "none" }
    );
    QuarryServer::new(config)
        .serve_with_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("cannot listen for Ctrl-C; stop the server with a signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(None)
}
