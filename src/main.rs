// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use laundry_tracker::notify::snapshot;
use laundry_tracker::telemetry::init_tracing;
use laundry_tracker::{default_layout, load_csv, seed_machines, Config, LaundryService, MachineFilter};
use std::env;
use std::path::Path;
use tokio::runtime::Runtime;

const USAGE: &str = "usage: laundry-tracker <seed [machines.csv] | status [floor] | board>";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config = Config::from_env_or_file()?;
    init_tracing(&config.log_level);

    let runtime = Runtime::new().context("Failed to start tokio runtime")?;

    match args.get(1).map(String::as_str) {
        Some("seed") => runtime.block_on(run_seed(&config, args.get(2).map(Path::new))),
        Some("status") => {
            let floor = args
                .get(2)
                .map(|f| f.parse::<i64>().with_context(|| format!("'{}' is not a floor", f)))
                .transpose()?;
            runtime.block_on(run_status(&config, floor))
        }
        Some("board") | None => run_board(&config, &runtime),
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

async fn run_seed(config: &Config, csv_path: Option<&Path>) -> Result<()> {
    let machines = match csv_path {
        Some(path) => {
            println!("📂 Loading {}...", path.display());
            load_csv(path)?
        }
        None => {
            println!("🏢 Using the default layout...");
            default_layout()
        }
    };
    println!("✓ Loaded {} machines", machines.len());

    let service = LaundryService::open(config).context("Failed to open storage")?;
    let report = seed_machines(&service.registry, machines).await?;
    service.shutdown().await;

    println!("✓ Inserted: {} machines", report.inserted);
    println!("✓ Skipped existing: {}", report.skipped);
    Ok(())
}

async fn run_status(config: &Config, floor: Option<i64>) -> Result<()> {
    let service = LaundryService::open(config).context("Failed to open storage")?;
    let filter = MachineFilter {
        floor,
        ..Default::default()
    };
    let floors = snapshot(&service.registry, &filter).await?;
    service.shutdown().await;

    if floors.is_empty() {
        println!("No machines found. Run: laundry-tracker seed");
        return Ok(());
    }

    for summary in floors {
        println!("{}\n", summary.render_text());
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_board(config: &Config, runtime: &Runtime) -> Result<()> {
    let service = runtime
        .block_on(async { LaundryService::open(config) })
        .context("Failed to open storage")?;
    let filter = MachineFilter::default();

    let load = || -> Result<_> { Ok(runtime.block_on(snapshot(&service.registry, &filter))?) };

    let mut app = ui::App::new(load()?);
    ui::run_ui(&mut app, load)?;

    runtime.block_on(service.shutdown());
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_board(_config: &Config, _runtime: &Runtime) -> Result<()> {
    eprintln!("❌ Board not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: laundry-tracker status");
    std::process::exit(1);
}
