use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use bevy_ecs::prelude::World;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use dispatch_cli::config::RunConfig;
use dispatch_cli::kml::BoundingPolygon;
use dispatch_cli::report::{print_report, ReportEnvironment};
use dispatch_cli::{map_loader, trips};
use dispatch_core::clock::SimulationClock;
use dispatch_core::runner::{run_next_event, simulation_schedule};
use dispatch_core::scenario::{build_world, SimulationEndTime};
use dispatch_core::telemetry::{finalize_score, ScoreTelemetry};
use dispatch_core::telemetry_export::{
    write_approach_records_parquet, write_completed_trips_parquet,
};
use dispatch_core::traffic::TrafficPattern;

#[derive(Parser)]
#[command(
    name = "dispatch",
    about = "Replay a day of recorded trips against a dispatch policy on a real street network"
)]
struct Cli {
    /// Path to the key=value configuration file.
    #[arg(long, default_value = "etc/config.properties")]
    config: PathBuf,

    /// Override `number_of_agents` from the config.
    #[arg(long)]
    number_of_agents: Option<usize>,

    /// Override `agent_placement_seed` from the config.
    #[arg(long)]
    seed: Option<u64>,

    /// Write per-trip Parquet tables and a summary JSON into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = RunConfig::from_file(&cli.config)
        .with_context(|| format!("bad configuration {}", cli.config.display()))?;
    if let Some(agents) = cli.number_of_agents {
        config.number_of_agents = agents;
    }
    init_logging(config.logging);

    let seed = cli.seed.unwrap_or_else(|| config.resolved_seed());

    println!("Creating map...");
    println!("Pre-computing all pair travel times...");
    let map = map_loader::load_map(&config.map_json_file)?;
    log::info!(
        "map: {} intersections, {} roads, {} links",
        map.num_intersections(),
        map.roads().len(),
        map.links().len()
    );

    let polygon = BoundingPolygon::from_kml_file(&config.bounding_polygon_kml_file)?;

    println!("Loading and map-matching resources...");
    let (records, stats) = trips::load_trips(
        &config.dataset_file,
        &polygon,
        config.time_zone_offset,
        &map,
    )?;
    log::info!(
        "dataset: {} trips kept, {} outside polygon, {} degenerate, {} unparseable",
        stats.kept,
        stats.outside_polygon,
        stats.degenerate,
        stats.unparseable
    );

    println!(
        "Randomly placing {} agents on the map...",
        config.number_of_agents
    );
    let params = config.simulation_params(seed);
    let mut world = World::new();
    build_world(&mut world, map, records, &params);

    println!("Running the simulation...");
    let simulation_start_time = world
        .resource_mut::<SimulationClock>()
        .next_event_time()
        .unwrap_or(0);
    let simulation_end_time = world.resource::<SimulationEndTime>().0;

    let bar = ProgressBar::new(100).with_style(
        ProgressStyle::with_template("{bar:40} {pos}% {elapsed}").expect("valid progress template"),
    );
    let span = simulation_end_time.saturating_sub(simulation_start_time).max(1);
    let mut schedule = simulation_schedule();
    let mut steps: u64 = 0;
    while run_next_event(&mut world, &mut schedule) {
        steps += 1;
        if steps % 1024 == 0 {
            let now = world.resource::<SimulationClock>().now();
            let progress = (now.saturating_sub(simulation_start_time) * 100 / span).min(100);
            bar.set_position(progress);
        }
    }
    bar.finish_and_clear();
    println!("Simulation finished after {steps} events.");

    let final_simulation_time = world.resource::<SimulationClock>().now();
    let summary = finalize_score(&mut world);

    {
        let score = world.resource::<ScoreTelemetry>();
        let pattern = world.resource::<TrafficPattern>();
        let environment = ReportEnvironment {
            config: &config,
            seed,
            simulation_start_time,
            simulation_end_time,
            final_simulation_time,
        };
        print_report(&environment, summary.as_ref(), score, pattern);
    }

    if let Some(dir) = &cli.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;
        let score = world.resource::<ScoreTelemetry>();
        write_completed_trips_parquet(dir.join("trips.parquet"), score)
            .map_err(|e| anyhow::anyhow!("trip export failed: {e}"))?;
        write_approach_records_parquet(dir.join("approaches.parquet"), score)
            .map_err(|e| anyhow::anyhow!("approach export failed: {e}"))?;
        if let Some(summary) = &summary {
            let file = File::create(dir.join("summary.json"))?;
            serde_json::to_writer_pretty(file, summary)?;
        }
        log::info!("run artifacts written to {}", dir.display());
    }

    Ok(())
}
