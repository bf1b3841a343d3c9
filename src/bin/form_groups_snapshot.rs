use anyhow::{Context, Result};
use clap::Parser;
use plot_grouping_rs::services::grouping::loader::{build_snapshot, PlotRow};
use plot_grouping_rs::services::grouping::{
    form_groups_from_snapshot, GroupingParameters, RunSummary,
};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(about = "Run plot group formation over a JSON plot snapshot (no database).")]
struct Args {
    /// JSON array of plot rows; boundaries are GeoJSON in a projected CRS.
    #[arg(long)]
    snapshot: PathBuf,

    /// JSON grouping parameters. Defaults are used when omitted.
    #[arg(long)]
    parameters: Option<PathBuf>,

    #[arg(long, default_value_t = 4)]
    max_parallel_partitions: usize,

    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf, label: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {label} {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {label} {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let rows: Vec<PlotRow> = read_json(&args.snapshot, "snapshot")?;
    let params = match args.parameters.as_ref() {
        Some(path) => read_json::<GroupingParameters>(path, "parameters")?,
        None => GroupingParameters::default(),
    };

    let snapshot = build_snapshot(rows);
    tracing::info!(
        plots = snapshot.plots.len(),
        malformed = snapshot.malformed.len(),
        "snapshot decoded"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let started = Instant::now();
    let result = form_groups_from_snapshot(snapshot, &params, args.max_parallel_partitions, &cancel)
        .await
        .context("group formation failed")?;
    ctrl_c.abort();
    RunSummary::from_result(&result).log(started.elapsed());

    let output = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");
    Ok(())
}
