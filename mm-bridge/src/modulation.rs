//! CC sweeps and a software LFO

use std::future::Future;
use std::time::Duration;

use tracing::info;

use mm_common::MidiChannel;

use crate::midi::MidiSink;
use crate::{Error, Result};

/// LFO update period
pub const LFO_STEP: Duration = Duration::from_millis(20);

/// Triangle wave over one cycle: 0 → 1 at phase 0.5 → 0
pub fn triangle(phase: f64) -> f64 {
    let phase = phase.rem_euclid(1.0);
    if phase < 0.5 {
        phase * 2.0
    } else {
        2.0 - phase * 2.0
    }
}

/// Triangle LFO on one controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lfo {
    pub cc: u8,
    pub min: u8,
    pub max: u8,
    pub rate_hz: f64,
}

impl Lfo {
    pub fn new(cc: u8, min: u8, max: u8, rate_hz: f64) -> Result<Self> {
        if cc > 127 || min > 127 || max > 127 {
            return Err(Error::InvalidInput("LFO cc, min and max must be 0-127".to_string()));
        }
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(Error::InvalidInput(format!("LFO rate {} Hz must be positive", rate_hz)));
        }
        Ok(Self { cc, min, max, rate_hz })
    }

    /// Updates per cycle at [`LFO_STEP`], at least one
    pub fn steps_per_cycle(&self) -> usize {
        let period = 1.0 / self.rate_hz;
        ((period / LFO_STEP.as_secs_f64()).round() as usize).max(1)
    }

    /// Controller value at `step`
    pub fn value_at(&self, step: usize) -> u8 {
        let steps = self.steps_per_cycle();
        let phase = (step % steps) as f64 / steps as f64;
        let span = self.max as f64 - self.min as f64;
        (self.min as f64 + triangle(phase) * span) as u8
    }

    /// Modulate until `stop` resolves; returns the number of values sent
    pub async fn run<F>(&self, sink: &mut dyn MidiSink, channel: MidiChannel, stop: F) -> Result<usize>
    where
        F: Future<Output = ()>,
    {
        info!(
            "LFO started: CC{} [{}-{}] @ {}Hz",
            self.cc, self.min, self.max, self.rate_hz
        );
        tokio::pin!(stop);
        let mut ticker = tokio::time::interval(LFO_STEP);
        let mut step = 0usize;

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    sink.send_cc(channel, self.cc, self.value_at(step))?;
                    step += 1;
                }
            }
        }

        info!("LFO stopped after {} update(s)", step);
        Ok(step)
    }
}

/// Every value from `start` to `end` inclusive, in order
pub fn sweep_values(start: u8, end: u8) -> Vec<u8> {
    if start <= end {
        (start..=end).collect()
    } else {
        (end..=start).rev().collect()
    }
}

/// Step a controller from `start` to `end` spread over `duration`
pub async fn sweep(
    sink: &mut dyn MidiSink,
    channel: MidiChannel,
    cc: u8,
    start: u8,
    end: u8,
    duration: Duration,
) -> Result<usize> {
    if start == end {
        return Ok(0);
    }

    let values = sweep_values(start, end);
    let delay = duration / (values.len() as u32 - 1);
    info!("Sweeping CC{} {}→{} over {:?}", cc, start, end, duration);

    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        sink.send_cc(channel, cc, *value)?;
    }
    Ok(values.len())
}
