use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures_util::FutureExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use shelfsync_engine::{
    SnapshotListener, SyncOrigin, TransferResult, null_progress_listener, synchronize_origins,
    to_sync_doc_map,
};
use shelfsync_store::{Datastore, DiskDatastore, HttpDatastore};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run(RunOptions),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct RunOptions {
    local: Option<String>,
    remote: Option<String>,
    mirror: Option<String>,
    token: Option<String>,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut options = RunOptions::default();
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--local" => {
                options.local = Some(args.next().context("--local requires a directory")?);
            }
            "--remote" => {
                options.remote = Some(args.next().context("--remote requires a url")?);
            }
            "--mirror" => {
                options.mirror = Some(args.next().context("--mirror requires a directory")?);
            }
            "--token" => {
                options.token = Some(args.next().context("--token requires a value")?);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(CliMode::Run(options))
}

fn print_usage() {
    println!("Usage: shelfsync --local DIR (--remote URL | --mirror DIR) [--token TOKEN]");
    println!("  --local DIR    local library root (or SHELFSYNC_LOCAL)");
    println!("  --remote URL   remote store base url");
    println!("  --mirror DIR   second on-disk store instead of a remote");
    println!("  --token TOKEN  bearer token for --remote (or SHELFSYNC_TOKEN)");
}

fn summarize(direction: &str, result: &TransferResult) {
    eprintln!(
        "[shelfsync] {direction}: {}/{} documents written, {}/{} files written, {} failed",
        result.doc_meta.writes,
        result.doc_meta.total,
        result.files.writes,
        result.files.total,
        result.failed_docs
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            print_usage();
            return Ok(());
        }
        CliMode::Run(options) => options,
    };

    let local_root = options
        .local
        .or_else(|| std::env::var("SHELFSYNC_LOCAL").ok())
        .context("--local DIR (or SHELFSYNC_LOCAL) is required")?;
    let local: Arc<dyn Datastore> =
        Arc::new(DiskDatastore::open("local", PathBuf::from(&local_root)).await?);

    let cloud: Arc<dyn Datastore> = match (&options.remote, &options.mirror) {
        (Some(url), None) => {
            let token = options
                .token
                .or_else(|| std::env::var("SHELFSYNC_TOKEN").ok())
                .context("--token (or SHELFSYNC_TOKEN) is required with --remote")?;
            Arc::new(HttpDatastore::new("cloud", url, token)?)
        }
        (None, Some(dir)) => Arc::new(DiskDatastore::open("cloud", PathBuf::from(dir)).await?),
        _ => anyhow::bail!("exactly one of --remote URL or --mirror DIR is required"),
    };

    let local_origin = SyncOrigin::new(
        local.clone(),
        to_sync_doc_map(local, &null_progress_listener()).await?,
    );
    let cloud_origin = SyncOrigin::new(
        cloud.clone(),
        to_sync_doc_map(cloud, &null_progress_listener()).await?,
    );

    let listener: SnapshotListener = Arc::new(|event| {
        async move {
            debug!(
                origin = %event.origin,
                progress = event.progress.value,
                "reconciled document"
            );
        }
        .boxed()
    });

    let (local_to_cloud, cloud_to_local) =
        synchronize_origins(&local_origin, &cloud_origin, listener).await?;

    summarize("local -> cloud", &local_to_cloud);
    summarize("cloud -> local", &cloud_to_local);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("shelfsync")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_cli_mode_defaults_to_empty_run() {
        let mode = parse_cli_mode(args(&[])).unwrap();
        assert_eq!(mode, CliMode::Run(RunOptions::default()));
    }

    #[test]
    fn parse_cli_mode_collects_options() {
        let mode = parse_cli_mode(args(&[
            "--local", "/tmp/a", "--remote", "https://x", "--token", "t",
        ]))
        .unwrap();
        let CliMode::Run(options) = mode else {
            panic!("expected run mode");
        };
        assert_eq!(options.local.as_deref(), Some("/tmp/a"));
        assert_eq!(options.remote.as_deref(), Some("https://x"));
        assert_eq!(options.token.as_deref(), Some("t"));
        assert!(options.mirror.is_none());
    }

    #[test]
    fn parse_cli_mode_supports_help() {
        let mode = parse_cli_mode(args(&["--help"])).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_arguments() {
        assert!(parse_cli_mode(args(&["--bogus"])).is_err());
    }

    #[test]
    fn parse_cli_mode_requires_flag_values() {
        assert!(parse_cli_mode(args(&["--local"])).is_err());
    }
}
