use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quarry_sdk::DEFAULT_REMOTE_NAME;

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry: version large datasets and models by content hash",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Parallel transfers (overrides transfer.jobs)
    #[arg(short, long, global = true)]
    pub jobs: Option<NonZeroUsize>,

    /// Remote to use instead of the default
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a quarry repository in the current directory
    Init(InitArgs),
    /// Hash artifacts into the cache and write their pointer files
    Track(TrackArgs),
    /// Remove pointer files (cached and remote blobs are kept)
    Untrack(TrackArgs),
    /// Upload cached blobs the remote does not have
    Push(PathsArgs),
    /// Download blobs missing from the cache
    Pull(PathsArgs),
    /// Compare working files against their pointers
    Status(PathsArgs),
    /// Restore working files from the cache, pulling when needed
    Checkout(PathsArgs),
    /// Manage remotes
    Remote(RemoteArgs),
    /// Delete cached blobs no pointer file references
    Gc(GcArgs),
    /// Serve a directory as an HTTP object store
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct TrackArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct PathsArgs {
    /// Artifacts or pointer files; every pointer file when omitted
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Add or replace a remote
    Set {
        url: String,
        #[arg(long, default_value = DEFAULT_REMOTE_NAME)]
        name: String,
        /// Environment variable holding the bearer token
        #[arg(long)]
        token_env: Option<String>,
    },
    /// List configured remotes
    List,
    /// Remove a remote
    Remove { name: String },
}

#[derive(Args)]
pub struct GcArgs {
    /// Report what would be removed without deleting anything
    #[arg(long)]
    pub dry_run: bool,
    /// Extra pointer files whose blobs must be kept
    #[arg(long)]
    pub keep: Vec<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address [default: 127.0.0.1:8417]
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Object directory [default: .]
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Require the bearer token stored in this environment variable
    #[arg(long)]
    pub token_env: Option<String>,
    /// Server config file (TOML); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Largest accepted upload in bytes [default: 1 GiB]
    #[arg(long)]
    pub max_object_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["quarry", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(_)));
    }

    #[test]
    fn parse_track_requires_paths() {
        assert!(Cli::try_parse_from(["quarry", "track"]).is_err());
        let cli = Cli::try_parse_from(["quarry", "track", "a.csv", "b.csv"]).unwrap();
        if let Command::Track(args) = cli.command {
            assert_eq!(args.paths, vec![PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_push_without_paths() {
        let cli = Cli::try_parse_from(["quarry", "push"]).unwrap();
        if let Command::Push(args) = cli.command {
            assert!(args.paths.is_empty());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "quarry", "pull", "data.csv.qp", "--jobs", "8", "--remote", "backup", "-C", "/repo", "-v",
        ])
        .unwrap();
        assert_eq!(cli.jobs.map(NonZeroUsize::get), Some(8));
        assert_eq!(cli.remote.as_deref(), Some("backup"));
        assert_eq!(cli.directory, Some(PathBuf::from("/repo")));
        assert!(cli.verbose);
    }

    #[test]
    fn zero_jobs_rejected() {
        assert!(Cli::try_parse_from(["quarry", "push", "--jobs", "0"]).is_err());
    }

    #[test]
    fn parse_remote_set() {
        let cli = Cli::try_parse_from(["quarry", "remote", "set", "https://x"]).unwrap();
        if let Command::Remote(RemoteArgs { action: RemoteAction::Set { url, name, token_env } }) = cli.command {
            assert_eq!(url, "https://x");
            assert_eq!(name, "origin");
            assert!(token_env.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_remote_remove() {
        let cli = Cli::try_parse_from(["quarry", "remote", "remove", "backup"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Remote(RemoteArgs { action: RemoteAction::Remove { .. } })
        ));
    }

    #[test]
    fn parse_gc() {
        let cli = Cli::try_parse_from(["quarry", "gc", "--dry-run", "--keep", "old.qp", "--keep", "older.qp"]).unwrap();
        if let Command::Gc(args) = cli.command {
            assert!(args.dry_run);
            assert_eq!(args.keep.len(), 2);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["quarry", "serve", "--bind", "0.0.0.0:8080", "--token-env", "TOKEN"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse::<SocketAddr>().unwrap()));
            assert!(args.root.is_none());
            assert_eq!(args.token_env.as_deref(), Some("TOKEN"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["quarry", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.bind.is_none());
            assert!(args.token_env.is_none());
            assert!(args.config.is_none());
        } else { panic!("wrong command"); }
    }
}
