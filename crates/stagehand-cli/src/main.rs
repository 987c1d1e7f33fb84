use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use stagehand_core::{DefaultStageLoader, EngineConfig, Manager, StageLoader};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the stage JSON file
    #[arg(value_name = "STAGE")]
    stage: PathBuf,

    /// Engine configuration JSON; missing fields keep their defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds between updates
    #[arg(long, default_value_t = 1.0 / 30.0)]
    tick: f64,

    /// Stop at this stage time, in seconds
    #[arg(long, default_value_t = 600.0)]
    until: f64,

    /// Stop after this many beats
    #[arg(long)]
    max_beats: Option<usize>,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(level: LogLevel, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.to_string().parse()?)
        .from_env_lossy();

    // Logs go to stderr; stdout carries the event stream.
    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            EngineConfig::from_json(&json).with_context(|| format!("Invalid config {:?}", path))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Ticks the stage, advancing whenever a beat runs out, and writes every event
/// as one JSON line.
fn play(cli: &Cli, manager: &mut Manager, out: &mut impl Write) -> Result<()> {
    let mut beats = 1;
    let mut step: u64 = 0;
    loop {
        let time = step as f64 * cli.tick;
        if time > cli.until {
            warn!(time, "Stopped at --until");
            break;
        }
        let remaining = manager.update(time)?;
        for event in manager.drain_events() {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }

        if remaining <= 0.0 {
            if cli.max_beats.is_some_and(|max| beats >= max) {
                info!(beats, "Reached --max-beats");
                break;
            }
            if !manager.advance()? {
                info!(time, "Stage finished");
                break;
            }
            beats += 1;
            for event in manager.drain_events() {
                writeln!(out, "{}", serde_json::to_string(&event)?)?;
            }
        }
        step += 1;
    }
    out.flush()?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    if cli.tick <= 0.0 {
        anyhow::bail!("--tick must be positive");
    }

    let path = cli.stage.to_string_lossy().to_string();
    info!("Loading stage: {}", path);
    let stage = DefaultStageLoader.load_stage(&path)?;

    let mut manager = Manager::new(config);
    manager.load_stage(stage)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    play(&cli, &mut manager, &mut out)?;
    manager.unload();
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level, cli.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
