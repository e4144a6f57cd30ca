use std::time::Duration;

use crate::code::ShareCode;
use crate::error::{ChimeError, Result};
use crate::spectrum::Peak;
use crate::symbols::{is_near, nearest_symbol, symbol_at};
use crate::{
    CODE_PREFIX, END_FREQ, GAP_MS, MARKER_MS, NOISE_GATE, PAYLOAD_LEN, START_FREQ,
    SYMBOL_HOLDOFF_MS, TOLERANCE, TONE_MS,
};

/// Receive session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingStart,
    Decoding,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

/// How data symbols are picked out of the stream of peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingStrategy {
    /// Accept a symbol at most once per hold-off period, and only when it
    /// differs from the previously accepted one. A code with the same symbol
    /// twice in a row cannot be received this way.
    #[default]
    Deduplicate,
    /// Sample once per (tone + gap) slot measured from the start marker.
    /// Repeated symbols decode correctly; a missed slot fails the decode.
    SlotTimed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiverConfig {
    pub tolerance_hz: f32,
    /// Peaks at or below this strength are ignored
    pub noise_gate: u8,
    pub sampling: SamplingStrategy,
    /// Give up if no start marker arrives within this time. None waits forever.
    ///
    /// Measured in stream time while frames arrive; a `Listener` whose source
    /// delivers nothing applies it against the wall clock instead.
    pub start_timeout: Option<Duration>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            tolerance_hz: TOLERANCE,
            noise_gate: NOISE_GATE,
            sampling: SamplingStrategy::Deduplicate,
            start_timeout: None,
        }
    }
}

/// Decoder state machine for one receive attempt
///
/// Fed one `(time, peak)` pair per poll. Timestamps must be monotonic within
/// a session; their epoch is arbitrary.
#[derive(Debug, Clone)]
pub struct Receiver {
    config: ReceiverConfig,
    phase: Phase,
    buffer: String,
    last_symbol: Option<char>,
    last_accept_at: Option<Duration>,
    start_marker_at: Option<Duration>,
    session_started_at: Option<Duration>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            buffer: String::with_capacity(PAYLOAD_LEN),
            last_symbol: None,
            last_accept_at: None,
            start_marker_at: None,
            session_started_at: None,
        }
    }

    /// Begin a fresh session, discarding anything from a previous one
    pub fn start(&mut self) {
        *self = Self::new(self.config);
        self.phase = Phase::AwaitingStart;
        log::debug!("Receiver awaiting start marker");
    }

    /// Return to Idle, dropping all session state
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Symbols accepted so far in this session
    pub fn symbols(&self) -> &str {
        &self.buffer
    }

    /// Partial code as decoded so far, e.g. `DS-3F9`
    pub fn partial(&self) -> String {
        format!("{}{}", CODE_PREFIX, self.buffer)
    }

    /// Advance the state machine by one poll
    ///
    /// Returns `Ok(Some(code))` once the end marker completes a 6-symbol
    /// buffer, `Ok(None)` while still listening (or when not listening at
    /// all), and an error when the session fails.
    pub fn feed(&mut self, now: Duration, peak: Peak) -> Result<Option<ShareCode>> {
        if !matches!(self.phase, Phase::AwaitingStart | Phase::Decoding) {
            return Ok(None);
        }

        let session_started = *self.session_started_at.get_or_insert(now);

        if self.phase == Phase::AwaitingStart {
            if let Some(timeout) = self.config.start_timeout {
                if now.saturating_sub(session_started) >= timeout {
                    log::warn!("No start marker within {:?}", timeout);
                    self.fail();
                    return Err(ChimeError::Timeout);
                }
            }
        }

        if peak.strength <= self.config.noise_gate {
            return Ok(None);
        }

        let tolerance = self.config.tolerance_hz;
        let freq = peak.frequency_hz;

        match self.phase {
            Phase::AwaitingStart => {
                if is_near(freq, START_FREQ, tolerance) {
                    self.buffer.clear();
                    self.last_symbol = None;
                    self.last_accept_at = Some(now);
                    self.start_marker_at = Some(now);
                    self.phase = Phase::Decoding;
                    log::debug!("Start marker at {:?} ({} Hz)", now, freq);
                }
                Ok(None)
            }
            Phase::Decoding => {
                if is_near(freq, END_FREQ, tolerance) {
                    return self.finish(now);
                }
                self.sample_symbol(now, freq);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn sample_symbol(&mut self, now: Duration, freq: f32) {
        if self.buffer.len() >= PAYLOAD_LEN {
            return;
        }

        let Some(index) = nearest_symbol(freq, self.config.tolerance_hz) else {
            return;
        };
        let Ok(symbol) = symbol_at(index) else {
            return;
        };

        let accept = match self.config.sampling {
            SamplingStrategy::Deduplicate => {
                let holdoff = Duration::from_millis(SYMBOL_HOLDOFF_MS as u64);
                let elapsed = self
                    .last_accept_at
                    .map_or(holdoff, |at| now.saturating_sub(at));
                elapsed >= holdoff && self.last_symbol != Some(symbol)
            }
            SamplingStrategy::SlotTimed => self.current_slot(now) == Some(self.buffer.len()),
        };

        if accept {
            self.buffer.push(symbol);
            self.last_symbol = Some(symbol);
            self.last_accept_at = Some(now);
            log::debug!(
                "Symbol {} accepted at {:?} ({} Hz), have {}",
                symbol,
                now,
                freq,
                self.partial()
            );
        }
    }

    /// Data slot whose tone portion covers `now`, counted from the start marker
    fn current_slot(&self, now: Duration) -> Option<usize> {
        let start = self.start_marker_at?;
        let since_start = now.checked_sub(start)?.as_millis() as u64;
        let first_tone = (MARKER_MS + GAP_MS) as u64;
        let slot_len = (TONE_MS + GAP_MS) as u64;

        let offset = since_start.checked_sub(first_tone)?;
        let slot = (offset / slot_len) as usize;
        if slot < PAYLOAD_LEN && offset % slot_len < TONE_MS as u64 {
            Some(slot)
        } else {
            None
        }
    }

    fn finish(&mut self, now: Duration) -> Result<Option<ShareCode>> {
        if self.buffer.len() == PAYLOAD_LEN {
            let code = ShareCode::from_payload(&self.buffer)?;
            self.phase = Phase::Complete;
            log::info!("End marker at {:?}, decoded {}", now, code);
            Ok(Some(code))
        } else {
            let received = self.buffer.len();
            log::warn!(
                "End marker at {:?} with only {} symbols ({})",
                now,
                received,
                self.partial()
            );
            self.fail();
            Err(ChimeError::IncompleteDecode { received })
        }
    }

    fn fail(&mut self) {
        self.phase = Phase::Failed;
        self.buffer.clear();
        self.last_symbol = None;
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new(ReceiverConfig::default())
    }
}
