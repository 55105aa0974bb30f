//! Tweenr CLI
//!
//! Play animation scenes and inspect easing curves from the terminal.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tweenr_animation::{Easing, ManualClock, Scheduler, SchedulerConfig};

mod scene;

use scene::{Playback, Scene};

#[derive(Parser)]
#[command(name = "tweenr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tweenr animation CLI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scene, printing the target's values on every tick
    Play {
        /// Scene file
        scene: PathBuf,

        /// Fixed delta per tick in milliseconds (defaults to the scene's frame duration)
        #[arg(long)]
        dt: Option<f64>,

        /// Tick on the wall clock instead of a simulated one
        #[arg(long)]
        realtime: bool,

        /// Give up after this many ticks (looping scenes never finish)
        #[arg(long, default_value = "1000")]
        max_ticks: u64,
    },

    /// Validate a scene and print it back normalized
    Check {
        /// Scene file
        scene: PathBuf,
    },

    /// Print every named easing curve sampled over [0, 1]
    Easings {
        /// Number of intervals to sample
        #[arg(short, long, default_value = "10")]
        samples: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Play {
            scene,
            dt,
            realtime,
            max_ticks,
        } => cmd_play(&scene, dt, realtime, max_ticks),

        Commands::Check { scene } => cmd_check(&scene),

        Commands::Easings { samples } => cmd_easings(samples),
    }
}

fn cmd_play(path: &Path, dt: Option<f64>, realtime: bool, max_ticks: u64) -> Result<()> {
    let scene = Scene::load(path)?;
    let config = SchedulerConfig::default().with_tick_rate(scene.tick_rate_hz);
    config.validate()?;

    let dt_ms = dt.unwrap_or_else(|| config.frame_duration_ms());
    if !(dt_ms.is_finite() && dt_ms >= 0.0) {
        anyhow::bail!("Invalid --dt '{}': must be a non-negative number of milliseconds", dt_ms);
    }

    let clock = ManualClock::new();
    let scheduler = if realtime {
        Scheduler::with_config(config)?
    } else {
        Scheduler::with_clock(config, clock.clone())?
    };
    let playback = scene.instantiate(&scheduler.handle())?;

    info!(
        "Playing {} ({} steps, {} ms at {} Hz{})",
        scene.title(),
        playback.timeline.step_count(),
        playback.timeline.total_duration_ms(),
        scheduler.tick_rate_hz(),
        if realtime { ", realtime" } else { "" }
    );

    let mut ticks = 0;
    print_tick(ticks, &playback);
    while !playback.timeline.state().is_terminal() && ticks < max_ticks {
        if realtime {
            let wait = scheduler.time_until_next_tick();
            if wait > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait / 1000.0));
            }
            if !scheduler.poll() {
                continue;
            }
        } else {
            clock.advance(dt_ms);
            scheduler.tick();
        }
        ticks += 1;
        print_tick(ticks, &playback);
    }

    if playback.timeline.state().is_terminal() {
        info!(
            "Finished after {} ticks ({} call steps fired)",
            ticks,
            playback.calls.borrow().len()
        );
    } else {
        warn!("Stopped after {} ticks without finishing", ticks);
    }

    Ok(())
}

fn print_tick(tick: u64, playback: &Playback) {
    let values = playback
        .sample()
        .iter()
        .map(|(name, value)| format!("{name}={value:.3}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "{:>5} {:>9.1}ms  {}",
        tick,
        playback.timeline.elapsed_ms(),
        values
    );
}

fn cmd_check(path: &Path) -> Result<()> {
    let scene = Scene::load(path)?;
    SchedulerConfig::default()
        .with_tick_rate(scene.tick_rate_hz)
        .validate()?;

    // Queue the steps for real to catch unknown properties and easings
    let scheduler = Scheduler::with_clock(SchedulerConfig::default(), ManualClock::new())?;
    let playback = scene.instantiate(&scheduler.handle())?;

    info!(
        "{} is valid: {} steps, {} ms",
        path.display(),
        playback.timeline.step_count(),
        playback.timeline.total_duration_ms()
    );
    print!("{}", scene.to_toml()?);
    Ok(())
}

fn cmd_easings(samples: u32) -> Result<()> {
    if samples == 0 {
        anyhow::bail!("--samples must be at least 1");
    }

    for (name, easing) in Easing::NAMED {
        let curve = (0..=samples)
            .map(|i| format!("{:.3}", easing.apply(i as f32 / samples as f32)))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{name:<12} {curve}");
    }
    Ok(())
}
