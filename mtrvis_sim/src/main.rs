//! MTR-Vis Simulator CLI
//!
//! Run deterministic synthetic scenarios through the ego-view pipeline.

use clap::Parser;
use mtrvis_core::ViewConfig;
use mtrvis_sim::scenarios::ScenarioId;
use mtrvis_sim::{export_rendered, ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// MTR-Vis Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "mtrvis-sim")]
#[command(about = "Run deterministic synthetic scenarios through mtrvis_core", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Agents per scenario (scenarios may override)
    #[arg(short, long, default_value = "6")]
    agents: usize,

    /// Scenario to run (straight_road, disjoint_roads, dense_traffic, occluded_pivot, long_polylines, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// View configuration as a JSON file
    #[arg(long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the views of a single scenario to this JSON file
    #[arg(long)]
    export: Option<String>,
}

fn load_view_config(path: Option<&str>) -> ViewConfig {
    let Some(path) = path else {
        return ViewConfig::default();
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| ViewConfig::from_json_str(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: cannot load config {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | views={} skipped={} chunks={}",
            result.scenario.name(),
            result.seed,
            result.pivots_rendered,
            result.pivots_skipped,
            result.metrics.chunks
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("MTR-Vis Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: straight_road, disjoint_roads, dense_traffic, occluded_pivot, long_polylines, all");
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let view_config = load_view_config(args.config.as_deref());

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let runner = ScenarioRunner::new(base_seed, args.agents).with_view_config(view_config.clone());
        info!("Rendering {} (seed={}) for export", scenarios[0].name(), runner.seed());
        let rendered = match runner.render(scenarios[0]) {
            Ok(r) => r,
            Err(e) => {
                error!("✗ {} FAILED: {}", scenarios[0].name(), e);
                std::process::exit(1);
            }
        };
        match export_rendered(&rendered, view_config.reference_timestep, export_path) {
            Ok(summary) => info!(
                "Exported {} views to {} (summary: {})",
                rendered.views.len(),
                export_path,
                summary.display()
            ),
            Err(e) => {
                error!("Failed to write export: {}", e);
                std::process::exit(1);
            }
        }
        if !rendered.violations.is_empty() {
            std::process::exit(1);
        }
        return;
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed, args.agents).with_view_config(view_config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "pivots_rendered": r.pivots_rendered,
                    "pivots_skipped": r.pivots_skipped,
                    "chunks": r.metrics.chunks,
                    "max_rigidity_error": r.metrics.max_rigidity_error,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{:#}", summary);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
