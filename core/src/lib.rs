//! Sound-based share code link
//!
//! Encodes a `DS-XXXXXX` share code as a framed sequence of audio tones and
//! recovers it from a live audio stream using spectral peak detection.

pub mod error;
pub mod symbols;
pub mod code;
pub mod planner;
pub mod envelope;
pub mod transmitter;
pub mod spectrum;
pub mod receiver;
pub mod source;
pub mod listener;
pub mod resample;

pub use code::ShareCode;
pub use envelope::EnvelopeConfig;
pub use error::{ChimeError, Result};
pub use listener::{Listener, Progress};
pub use planner::{build_plan, plan_for, ToneEvent, TonePlan};
pub use receiver::{Phase, Receiver, ReceiverConfig, SamplingStrategy};
pub use source::{AudioSource, ChannelSource, Frame, Framer, MemorySource};
pub use spectrum::{dominant_frequency, AnalyzerConfig, Peak, SpectralAnalyzer};
pub use transmitter::{AudioSink, BufferSink, CancelToken, ChannelSink, Playback, Transmitter};

// Symbol alphabet (index = position)
pub const ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const NUM_SYMBOLS: usize = 36;

/// Number of data symbols carried by one code
pub const PAYLOAD_LEN: usize = 6;

/// Fixed prefix of every share code
pub const CODE_PREFIX: &str = "DS-";

// Frequency plan (Hz)
pub const START_FREQ: f32 = 900.0;
pub const END_FREQ: f32 = 1800.0;
pub const BASE_FREQ: f32 = 1000.0; // symbol 0
pub const STEP: f32 = 20.0; // 1000..1700 Hz for 36 symbols
pub const TOLERANCE: f32 = 35.0;

// Timing (ms)
pub const TONE_MS: u32 = 180;
pub const GAP_MS: u32 = 70;
pub const MARKER_MS: u32 = 220;

/// Minimum spacing between two accepted symbols (220 ms)
pub const SYMBOL_HOLDOFF_MS: u32 = TONE_MS + GAP_MS - 30;

/// Strength at or below which a spectral peak is treated as silence (0-255 scale)
pub const NOISE_GATE: u8 = 110;

// Audio defaults
pub const SAMPLE_RATE: u32 = 48000;
pub const FFT_SIZE: usize = 4096; // 11.7 Hz bins at 48 kHz
pub const DEFAULT_HOP_SAMPLES: usize = SAMPLE_RATE as usize / 100; // 10 ms poll cadence
