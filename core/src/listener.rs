use std::time::Instant;

use crate::code::ShareCode;
use crate::error::{ChimeError, Result};
use crate::receiver::{Phase, Receiver, ReceiverConfig};
use crate::source::AudioSource;
use crate::spectrum::{AnalyzerConfig, SpectralAnalyzer};
use crate::transmitter::CancelToken;
use crate::CODE_PREFIX;

/// Result of one listener poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// No session is active; the poll did nothing
    Inactive,
    /// Session active but no new audio frame was available
    Waiting,
    /// A frame was analyzed; the session is still running
    Listening(Phase),
    /// The session completed and released its source
    Decoded(ShareCode),
    /// The input ended before a complete code was heard
    SourceEnded,
}

struct Session<S> {
    source: S,
    analyzer: SpectralAnalyzer,
    receiver: Receiver,
    cancel: CancelToken,
    started: Instant,
}

/// Owner of the single active receive session and its audio input
///
/// Starting a session while one is active stops the old one first. Stopping
/// closes the source before returning. All operations take `&mut self`;
/// share across threads behind a `Mutex` and stop remotely with the
/// session's `CancelToken`.
pub struct Listener<S: AudioSource> {
    receiver_config: ReceiverConfig,
    analyzer_config: AnalyzerConfig,
    session: Option<Session<S>>,
}

impl<S: AudioSource> Listener<S> {
    pub fn new(receiver_config: ReceiverConfig) -> Self {
        Self::with_analyzer(receiver_config, AnalyzerConfig::default())
    }

    pub fn with_analyzer(receiver_config: ReceiverConfig, analyzer_config: AnalyzerConfig) -> Self {
        Self {
            receiver_config,
            analyzer_config,
            session: None,
        }
    }

    /// Open `source` and begin a fresh session in `AwaitingStart`
    pub fn start_listening(&mut self, mut source: S) -> Result<CancelToken> {
        if self.session.is_some() {
            log::info!("Replacing active listening session");
            self.stop_listening();
        }

        if let Err(e) = source.open() {
            log::warn!("Audio input failed to open: {}", e);
            return Err(match e {
                ChimeError::MicrophoneUnavailable(_) => e,
                other => ChimeError::MicrophoneUnavailable(other.to_string()),
            });
        }

        let analyzer = match SpectralAnalyzer::with_config(source.sample_rate(), self.analyzer_config) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };

        let mut receiver = Receiver::new(self.receiver_config);
        receiver.start();

        let cancel = CancelToken::new();
        log::info!(
            "Listening at {} Hz ({:.1} Hz bins)",
            source.sample_rate(),
            analyzer.bin_width()
        );
        self.session = Some(Session {
            source,
            analyzer,
            receiver,
            cancel: cancel.clone(),
            started: Instant::now(),
        });
        Ok(cancel)
    }

    /// End the active session, if any, and release its source
    pub fn stop_listening(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.source.close();
            log::debug!("Listening stopped in phase {:?}", session.receiver.phase());
        }
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Phase of the active session; `Idle` when not listening
    pub fn phase(&self) -> Phase {
        self.session
            .as_ref()
            .map_or(Phase::Idle, |s| s.receiver.phase())
    }

    /// Partial code decoded so far in the active session
    pub fn partial(&self) -> String {
        self.session
            .as_ref()
            .map_or_else(|| CODE_PREFIX.to_string(), |s| s.receiver.partial())
    }

    /// Analyze at most one new frame and advance the session
    ///
    /// Meant to be called on a fixed cadence by the host. A cancelled or
    /// stopped session makes this a no-op. Terminal outcomes (decoded code,
    /// decode failure, source error, end of input) release the source before
    /// returning.
    pub fn poll(&mut self) -> Result<Progress> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Progress::Inactive);
        };

        if session.cancel.is_cancelled() {
            self.stop_listening();
            return Ok(Progress::Inactive);
        }

        let frame = match session.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                if session.source.is_exhausted() {
                    log::info!("Input ended in phase {:?}", session.receiver.phase());
                    self.stop_listening();
                    return Ok(Progress::SourceEnded);
                }
                // Stream time is frozen while the source is stalled
                if let Some(timeout) = self.receiver_config.start_timeout {
                    if session.receiver.phase() == Phase::AwaitingStart
                        && session.started.elapsed() >= timeout
                    {
                        log::warn!("No audio or start marker within {:?}", timeout);
                        self.stop_listening();
                        return Err(ChimeError::Timeout);
                    }
                }
                return Ok(Progress::Waiting);
            }
            Err(e) => {
                self.stop_listening();
                return Err(e);
            }
        };

        let peak = match session.analyzer.dominant_frequency(&frame.samples) {
            Ok(peak) => peak,
            Err(e) => {
                self.stop_listening();
                return Err(e);
            }
        };

        match session.receiver.feed(frame.timestamp, peak) {
            Ok(Some(code)) => {
                self.stop_listening();
                Ok(Progress::Decoded(code))
            }
            Ok(None) => Ok(Progress::Listening(session.receiver.phase())),
            Err(e) => {
                self.stop_listening();
                Err(e)
            }
        }
    }

    /// Poll until the session ends or no frame is immediately available
    pub fn poll_available(&mut self) -> Result<Progress> {
        loop {
            match self.poll()? {
                Progress::Listening(_) => continue,
                other => return Ok(other),
            }
        }
    }
}

impl<S: AudioSource> Default for Listener<S> {
    fn default() -> Self {
        Self::new(ReceiverConfig::default())
    }
}

impl<S: AudioSource> Drop for Listener<S> {
    fn drop(&mut self) {
        self.stop_listening();
    }
}
