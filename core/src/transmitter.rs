use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::envelope::{samples_for_ms, synthesize_tone, EnvelopeConfig};
use crate::error::{ChimeError, Result};
use crate::planner::{ToneEvent, TonePlan};

/// Audio output capability used by the transmitter
///
/// `play` and `silence` return once the requested audio has been emitted
/// (or queued, for non-realtime sinks).
pub trait AudioSink {
    /// Acquire the output device
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn play(&mut self, frequency_hz: f32, duration_ms: u32, envelope: &EnvelopeConfig) -> Result<()>;

    fn silence(&mut self, duration_ms: u32) -> Result<()>;

    /// Release the output device. Called exactly once per `Transmitter::play`.
    fn release(&mut self) {}
}

/// Shared stop flag for one transmit or receive attempt
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a playback attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Completed,
    /// Stopped before event `at_event` started
    Cancelled { at_event: usize },
}

/// Plays tone plans on an audio sink
///
/// Cancellation is checked before each event, never mid-tone, so a stop
/// request takes effect within one tone plus gap.
pub struct Transmitter {
    envelope: EnvelopeConfig,
    cancel: CancelToken,
}

impl Transmitter {
    pub fn new() -> Self {
        Self::with_envelope(EnvelopeConfig::default())
    }

    pub fn with_envelope(envelope: EnvelopeConfig) -> Self {
        Self {
            envelope,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the in-flight plan from another thread or task
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn envelope(&self) -> &EnvelopeConfig {
        &self.envelope
    }

    /// Play every event of `plan` in order
    ///
    /// Any sink failure aborts the remaining plan. The sink is released on
    /// every exit path.
    pub fn play<S: AudioSink + ?Sized>(&mut self, plan: &TonePlan, sink: &mut S) -> Result<Playback> {
        if self.cancel.is_cancelled() {
            log::info!("Transmission of {} cancelled before start", plan.code);
            return Ok(Playback::Cancelled { at_event: 0 });
        }

        if let Err(e) = sink.open() {
            log::warn!("Audio output failed to open: {}", e);
            return Err(e);
        }

        log::debug!(
            "Transmitting {} ({} events, {} ms)",
            plan.code,
            plan.events.len(),
            plan.duration_ms()
        );

        let result = self.play_events(plan, sink);
        sink.release();

        match &result {
            Ok(Playback::Completed) => log::info!("Transmitted {}", plan.code),
            Ok(Playback::Cancelled { at_event }) => {
                log::info!("Transmission of {} cancelled at event {}", plan.code, at_event)
            }
            Err(e) => log::warn!("Transmission of {} aborted: {}", plan.code, e),
        }
        result
    }

    fn play_events<S: AudioSink + ?Sized>(&self, plan: &TonePlan, sink: &mut S) -> Result<Playback> {
        for (i, event) in plan.events.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(Playback::Cancelled { at_event: i });
            }
            match *event {
                ToneEvent::Tone {
                    frequency_hz,
                    duration_ms,
                } => sink.play(frequency_hz, duration_ms, &self.envelope)?,
                ToneEvent::Gap { duration_ms } => sink.silence(duration_ms)?,
            }
        }
        Ok(Playback::Completed)
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that renders the plan into an in-memory PCM buffer
pub struct BufferSink {
    sample_rate: u32,
    samples: Vec<f32>,
}

impl BufferSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl AudioSink for BufferSink {
    fn play(&mut self, frequency_hz: f32, duration_ms: u32, envelope: &EnvelopeConfig) -> Result<()> {
        let tone = synthesize_tone(frequency_hz, duration_ms, self.sample_rate, envelope);
        self.samples.extend_from_slice(&tone);
        Ok(())
    }

    fn silence(&mut self, duration_ms: u32) -> Result<()> {
        let len = self.samples.len() + samples_for_ms(duration_ms, self.sample_rate);
        self.samples.resize(len, 0.0);
        Ok(())
    }
}

/// Sink that streams rendered audio over a channel, one chunk per event
///
/// With pacing enabled each call blocks for the event's duration, mimicking
/// a realtime output device.
pub struct ChannelSink {
    sample_rate: u32,
    sender: Sender<Vec<f32>>,
    paced: bool,
}

impl ChannelSink {
    pub fn new(sample_rate: u32, sender: Sender<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            sender,
            paced: false,
        }
    }

    pub fn with_pacing(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    fn send(&mut self, chunk: Vec<f32>, duration_ms: u32) -> Result<()> {
        self.sender
            .send(chunk)
            .map_err(|_| ChimeError::AudioUnavailable("output channel closed".to_string()))?;
        if self.paced {
            thread::sleep(Duration::from_millis(duration_ms as u64));
        }
        Ok(())
    }
}

impl AudioSink for ChannelSink {
    fn play(&mut self, frequency_hz: f32, duration_ms: u32, envelope: &EnvelopeConfig) -> Result<()> {
        let tone = synthesize_tone(frequency_hz, duration_ms, self.sample_rate, envelope);
        self.send(tone, duration_ms)
    }

    fn silence(&mut self, duration_ms: u32) -> Result<()> {
        let gap = vec![0.0f32; samples_for_ms(duration_ms, self.sample_rate)];
        self.send(gap, duration_ms)
    }
}
