//! # Stagehand
//!
//! `stagehand` plays back scripted narrative scenes driven by an external
//! clock. This crate re-exports [`stagehand_core`] and adds a fixed-step
//! playback driver for hosts that do not run their own clock.
//!
//! ```rust,no_run
//! use stagehand::{parse_stage, play, EngineConfig, Manager};
//!
//! let stage = parse_stage(r#"{ "name": "empty" }"#).unwrap();
//! let mut manager = Manager::new(EngineConfig::default());
//! manager.load_stage(stage).unwrap();
//! let playback = play(&mut manager, 0.1, 60.0).unwrap();
//! println!("{} events over {} beats", playback.events.len(), playback.beats);
//! ```

pub use stagehand_core::*;

use anyhow::{ensure, Result};

/// Outcome of [`play`].
#[derive(Debug, Default)]
pub struct Playback {
    /// Every event, in emission order.
    pub events: Vec<Event>,
    /// Beats started, including the first.
    pub beats: usize,
    /// Stage time of the last update.
    pub end_time: f64,
    /// Whether every beat ran out before `until`.
    pub finished: bool,
}

/// Updates `manager` every `tick` seconds from stage time zero, advancing each
/// time the current beat reports no time left, until the stage is finished or
/// `until` is passed.
pub fn play(manager: &mut Manager, tick: f64, until: f64) -> Result<Playback> {
    ensure!(tick > 0.0, "tick must be positive, got {}", tick);
    let mut playback = Playback {
        beats: usize::from(manager.beat_index().is_some()),
        ..Default::default()
    };
    playback.events.extend(manager.drain_events());

    let mut step: u64 = 0;
    loop {
        let time = step as f64 * tick;
        if time > until {
            break;
        }
        let remaining = manager.update(time)?;
        playback.end_time = time;
        playback.events.extend(manager.drain_events());

        if remaining <= 0.0 {
            if !manager.advance()? {
                playback.finished = true;
                break;
            }
            playback.beats += 1;
            playback.events.extend(manager.drain_events());
        }
        step += 1;
    }
    Ok(playback)
}

/// Parses, loads and plays a JSON stage with the default configuration.
pub fn play_json(json: &str, tick: f64, until: f64) -> Result<(Manager, Playback)> {
    let stage = parse_stage(json)?;
    let mut manager = Manager::new(EngineConfig::default());
    manager.load_stage(stage)?;
    let playback = play(&mut manager, tick, until)?;
    Ok((manager, playback))
}
