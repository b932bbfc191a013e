use anyhow::{Context, Result};
use bridge_sim::simulation::{
    time_limit_for, BridgeConfig, BridgeController, Direction, DEFAULT_CAR_WIDTH,
};
use clap::{Parser, ValueEnum};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Only the arrivals given on the command line
    Normal,
    /// Heavy up traffic with a single down car
    Starvation,
    /// Protection off, both sides flooded
    Deadlock,
}

#[derive(Parser)]
#[command(name = "bridge_sim")]
#[command(about = "Single-lane bridge traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "3000")]
    ticks: u64,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Stress scenario to load before running
    #[arg(long, value_enum, default_value_t = Scenario::Normal)]
    scenario: Scenario,

    /// Car width, also the minimum gap between cars
    #[arg(long, default_value_t = DEFAULT_CAR_WIDTH)]
    car_width: i32,

    /// Cars created per minute
    #[arg(long)]
    frequency: Option<i32>,

    /// Raw speed input, divided by 30 to get units per tick
    #[arg(long)]
    speed: Option<i32>,

    /// Force a switch for cars kept waiting too long
    #[arg(long)]
    time_limit: bool,

    /// Keep creating cars in random directions
    #[arg(long)]
    auto: bool,

    /// Let both directions onto the bridge at once
    #[arg(long)]
    unprotected: bool,

    /// Explicit up cars to queue
    #[arg(long, default_value_t = 0)]
    up: usize,

    /// Explicit down cars to queue
    #[arg(long, default_value_t = 0)]
    down: usize,

    /// Ticks between progress reports
    #[arg(long, default_value = "500")]
    report_every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,bridge_sim=info"),
    )
    .init();

    let cli = Cli::parse();

    let config = BridgeConfig {
        car_width: cli.car_width,
        time_limit: time_limit_for(cli.time_limit),
        protect: !cli.unprotected,
        auto_create: cli.auto,
        seed: cli.seed,
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).context("Invalid bridge configuration")?;

    if let Some(frequency) = cli.frequency {
        bridge
            .set_create_frequency(frequency)
            .context("Invalid creation frequency")?;
    }
    if let Some(speed) = cli.speed {
        bridge.set_car_speed(speed).context("Invalid car speed")?;
    }
    for _ in 0..cli.up {
        bridge.create_car(Direction::Up);
    }
    for _ in 0..cli.down {
        bridge.create_car(Direction::Down);
    }

    match cli.scenario {
        Scenario::Normal => {}
        Scenario::Starvation => bridge.starvation_scenario()?,
        Scenario::Deadlock => bridge.deadlock_scenario()?,
    }

    run_headless(&mut bridge, cli.ticks, cli.report_every.max(1))
}

/// Run the simulation without any visual output
fn run_headless(bridge: &mut BridgeController, ticks: u64, report_every: u64) -> Result<()> {
    info!("Running bridge simulation for up to {} ticks", ticks);

    for _ in 0..ticks {
        bridge.tick()?;

        if bridge.time() % report_every == 0 {
            info!("--- After tick {} ---", bridge.time());
            info!("{}", bridge.stats().summary());
        }
        if bridge.is_idle() {
            info!("All cars crossed at tick {}", bridge.time());
            break;
        }
        if bridge.is_deadlocked() {
            break;
        }
    }

    bridge.log_summary();

    let stats = bridge.stats();
    let queued = bridge.waiting_count(Direction::Up) + bridge.waiting_count(Direction::Down);
    let on_bridge = bridge.crossing_count(Direction::Up) + bridge.crossing_count(Direction::Down);
    info!("=== SIMULATION COMPLETE ===");
    info!("Elapsed ticks: {}", bridge.time());
    info!("Total cars created: {}", stats.cars_created);
    info!("Total cars exited: {}", stats.total_exited());
    info!("Queued cars: {}", queued);
    info!("Cars on bridge: {}", on_bridge);
    info!("Fair switches: {}", stats.fair_switches);
    info!("Forced switches: {}", stats.forced_switches);
    info!("Longest wait: {} ticks", stats.overall_longest_wait());
    info!("Deadlocked: {}", bridge.is_deadlocked());

    Ok(())
}
