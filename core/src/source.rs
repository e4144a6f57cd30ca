use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use crate::error::Result;

/// One analysis window taken from an input stream
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Stream time of the newest sample in the window
    pub timestamp: Duration,
    pub samples: Vec<f32>,
}

/// Audio input capability used by the listener
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    /// Acquire the input device; fails with `MicrophoneUnavailable`
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next analysis frame, or None if no new audio has arrived since the last one
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// True once the stream has ended and every frame has been handed out
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Release the input device
    fn close(&mut self) {}
}

/// Sliding analysis window over a sample stream
///
/// Keeps the most recent `window` samples (silence before the stream
/// starts) and emits one frame per `hop` new samples.
#[derive(Debug, Clone)]
pub struct Framer {
    sample_rate: u32,
    hop: usize,
    history: Vec<f32>,
    pending: VecDeque<f32>,
    consumed: u64,
}

impl Framer {
    pub fn new(sample_rate: u32, window: usize, hop: usize) -> Self {
        Self {
            sample_rate,
            hop: hop.max(1),
            history: vec![0.0; window],
            pending: VecDeque::new(),
            consumed: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.pending.extend(samples.iter().copied());
    }

    /// Whether enough audio is buffered for another frame
    pub fn has_frame(&self) -> bool {
        self.pending.len() >= self.hop
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        if !self.has_frame() {
            return None;
        }

        let window = self.history.len();
        let hop = self.hop.min(window);
        // Hops larger than the window skip the oldest pending samples
        let skip = self.hop - hop;
        self.pending.drain(..skip);
        self.history.drain(..hop);
        self.history.extend(self.pending.drain(..hop));
        self.consumed += self.hop as u64;

        Some(Frame {
            timestamp: self.stream_time(),
            samples: self.history.clone(),
        })
    }

    /// Time covered by the samples consumed so far
    fn stream_time(&self) -> Duration {
        let rate = self.sample_rate.max(1) as u64;
        let whole = self.consumed / rate;
        let rest = self.consumed % rate;
        Duration::from_secs(whole) + Duration::from_nanos(rest * 1_000_000_000 / rate)
    }
}

/// Source over a fixed, fully buffered recording
pub struct MemorySource {
    framer: Framer,
}

impl MemorySource {
    pub fn new(samples: &[f32], sample_rate: u32, window: usize, hop: usize) -> Self {
        let mut framer = Framer::new(sample_rate, window, hop);
        framer.push(samples);
        Self { framer }
    }
}

impl AudioSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.framer.sample_rate()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.framer.next_frame())
    }

    fn is_exhausted(&self) -> bool {
        !self.framer.has_frame()
    }
}

/// Source fed with sample chunks from another thread
///
/// Pairs with `ChannelSink` for in-process loopback.
pub struct ChannelSource {
    framer: Framer,
    receiver: Receiver<Vec<f32>>,
    disconnected: bool,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<Vec<f32>>, sample_rate: u32, window: usize, hop: usize) -> Self {
        Self {
            framer: Framer::new(sample_rate, window, hop),
            receiver,
            disconnected: false,
        }
    }

    fn drain_channel(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => self.framer.push(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}

impl AudioSource for ChannelSource {
    fn sample_rate(&self) -> u32 {
        self.framer.sample_rate()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.framer.has_frame() {
            self.drain_channel();
        }
        Ok(self.framer.next_frame())
    }

    fn is_exhausted(&self) -> bool {
        self.disconnected && !self.framer.has_frame()
    }
}
