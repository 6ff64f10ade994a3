use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dorling::dataset::LegendEntry;
use dorling::io::{FileGeometry, FileStatistics};
use dorling::model::CircleSnapshot;
use dorling::render::{FnSubscriber, RenderEvent};
use dorling::runtime::{self, Command};
use dorling::{Cartogram, DorlingConfig, NutsLevel, Phase};

/// Animated Dorling cartograms from region centroids and JSON-stat data.
#[derive(Parser)]
#[command(name = "dorling")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (YAML); missing fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding nutspt_{n}.json, size_{geo}.json and color_{geo}.json
    #[arg(short, long, global = true, default_value = "data")]
    data: PathBuf,

    /// Geographic level (0 = countries, 1 to 3 = NUTS levels)
    #[arg(short, long, global = true)]
    level: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a converged layout and write it as JSON
    Layout {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the map/cartogram cycle, printing render events as JSON lines
    Animate {
        /// Stop after this many cycles (runs until interrupted when omitted)
        #[arg(long)]
        cycles: Option<u32>,

        /// Read commands from stdin: p toggle, r restart, 0-3 level, q quit
        #[arg(short, long)]
        interactive: bool,

        /// Also print every tick frame
        #[arg(long)]
        ticks: bool,
    },
}

#[derive(Serialize)]
struct Layout {
    level: NutsLevel,
    width: f64,
    circles: Vec<CircleSnapshot>,
    legend: Vec<LegendEntry>,
}

fn load_config(cli: &Cli) -> anyhow::Result<DorlingConfig> {
    let mut config = match &cli.config {
        Some(path) => DorlingConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => DorlingConfig::default(),
    };
    if let Some(level) = cli.level {
        config.nuts_level = NutsLevel::try_from(level)?;
    }
    config.validate()?;
    Ok(config)
}

fn open(config: DorlingConfig, data: &Path) -> Cartogram {
    let geometry = FileGeometry::new(data, config.width, config.fit_padding);
    let statistics = FileStatistics::new(data);
    Cartogram::new(config, Box::new(geometry), Box::new(statistics))
}

fn layout(config: DorlingConfig, data: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let mut cartogram = open(config.with_animate(false), data);
    cartogram
        .start()
        .with_context(|| format!("loading data from {}", data.display()))?;
    while cartogram.step() {}

    let layout = Layout {
        level: cartogram.config().nuts_level,
        width: cartogram.config().width,
        circles: cartogram
            .entities()
            .iter()
            .map(CircleSnapshot::from)
            .collect(),
        legend: cartogram
            .dataset()
            .map(|d| d.size_legend.clone())
            .unwrap_or_default(),
    };
    let json = serde_json::to_string_pretty(&layout)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(
                circles = layout.circles.len(),
                path = %path.display(),
                "layout written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn animate(
    config: DorlingConfig,
    data: &Path,
    cycles: Option<u32>,
    interactive: bool,
    ticks: bool,
) -> anyhow::Result<()> {
    let mut cartogram = open(config.with_animate(true), data);
    let (tx, rx) = mpsc::channel(16);

    if let Some(cycles) = cycles {
        let stop = tx.clone();
        let mut completed = 0;
        cartogram.subscribe(FnSubscriber(move |event: &RenderEvent| {
            if let RenderEvent::PhaseChanged { to: Phase::Map, .. } = event {
                completed += 1;
                if completed >= cycles {
                    let _ = stop.try_send(Command::Shutdown);
                }
            }
        }));
    }
    cartogram.subscribe(FnSubscriber(move |event: &RenderEvent| {
        if !ticks && matches!(event, RenderEvent::Tick { .. }) {
            return;
        }
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, kind = event.kind(), "could not encode render event"),
        }
    }));

    cartogram
        .start()
        .with_context(|| format!("loading data from {}", data.display()))?;

    if interactive {
        tokio::spawn(read_console(tx.clone()));
    }
    let interrupt = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt.send(Command::Shutdown).await;
        }
    });
    drop(tx);

    let cartogram = runtime::drive(cartogram, rx).await;
    info!(
        generation = cartogram.generation().0,
        phase = %cartogram.phase(),
        "animation stopped"
    );
    Ok(())
}

async fn read_console(commands: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match Command::from_console(&line) {
            Some(command) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            None => warn!(input = %line.trim(), "unknown command"),
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dorling=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Layout { output } => {
            layout(config, &cli.data, output.as_deref())?;
        }
        Commands::Animate {
            cycles,
            interactive,
            ticks,
        } => {
            animate(config, &cli.data, cycles, interactive, ticks).await?;
        }
    }

    Ok(())
}
