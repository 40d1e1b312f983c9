//! Autonomic dispatcher CLI.
//!
//! Thin wrapper over the routing core for shell use:
//!
//!   autonomic "summarize recent container restarts"
//!   autonomic --local "show status"
//!   autonomic --test-connectivity
//!   autonomic --stats
//!   autonomic --bridge-status
//!   autonomic --set-threshold 0.65

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use autonomic::{ConfigStore, Dispatcher, ShellLocalExecutor, SshRemoteExecutor};

#[derive(Parser, Debug)]
#[command(name = "autonomic")]
#[command(about = "Task router for the home-lab diagnostic agent")]
struct Args {
    /// Task text to dispatch.
    task: Vec<String>,

    /// State directory for configs and the outcome log.
    #[arg(long, env = "AUTONOMIC_STATE_DIR", default_value = "agent_memory")]
    state_dir: String,

    /// Force local execution regardless of score.
    #[arg(long, conflicts_with = "remote")]
    local: bool,

    /// Force remote execution regardless of score.
    #[arg(long)]
    remote: bool,

    /// Probe the remote peer and exit.
    #[arg(long)]
    test_connectivity: bool,

    /// Print aggregate dispatch statistics and exit.
    #[arg(long)]
    stats: bool,

    /// Print the bridge status snapshot and exit.
    #[arg(long)]
    bridge_status: bool,

    /// Set the delegation threshold and exit.
    #[arg(long, value_name = "VALUE")]
    set_threshold: Option<f64>,

    /// Local executor command; receives the task on stdin.
    #[arg(long, default_value = "cat")]
    local_cmd: String,

    /// Command executed on the peer; receives the task on stdin.
    #[arg(long, default_value = "cat")]
    remote_cmd: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    let store = Arc::new(ConfigStore::open(&args.state_dir).context("failed to open config store")?);
    let routing = store.routing();

    let local = Arc::new(ShellLocalExecutor::new(args.local_cmd.clone(), vec![]));
    let remote = Arc::new(SshRemoteExecutor::new(
        routing.peer.clone(),
        routing.bridge.probe.clone(),
        args.remote_cmd.clone(),
    ));
    let dispatcher =
        Dispatcher::new(store, local, remote).context("failed to build dispatcher")?;

    if let Some(threshold) = args.set_threshold {
        dispatcher.set_threshold(threshold)?;
        println!("delegation threshold set to {:.2}", threshold);
        return Ok(());
    }

    if args.test_connectivity {
        let (ok, message) = dispatcher.test_connectivity().await;
        println!("connectivity test: {}", if ok { "PASS" } else { "FAIL" });
        println!("{}", message);
        std::process::exit(if ok { 0 } else { 1 });
    }

    if args.stats {
        let stats = dispatcher.dispatch_stats();
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if args.bridge_status {
        let status = dispatcher.bridge_status();
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let task = args.task.join(" ");
    if task.trim().is_empty() {
        bail!("no task given; see --help");
    }

    let result = dispatcher.dispatch(&task, args.local, args.remote).await?;
    println!("{}", result);
    Ok(())
}
