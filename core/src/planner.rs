use crate::code::ShareCode;
use crate::error::Result;
use crate::symbols::{frequency_of, index_of};
use crate::{ChimeError, END_FREQ, GAP_MS, MARKER_MS, START_FREQ, TONE_MS};

/// One step of a transmission: a tone or a stretch of silence
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ToneEvent {
    Tone { frequency_hz: f32, duration_ms: u32 },
    Gap { duration_ms: u32 },
}

impl ToneEvent {
    pub fn duration_ms(&self) -> u32 {
        match *self {
            ToneEvent::Tone { duration_ms, .. } | ToneEvent::Gap { duration_ms } => duration_ms,
        }
    }

    pub fn frequency_hz(&self) -> Option<f32> {
        match *self {
            ToneEvent::Tone { frequency_hz, .. } => Some(frequency_hz),
            ToneEvent::Gap { .. } => None,
        }
    }
}

/// Ordered tone sequence for one share code
///
/// Layout: start marker, then each of the 6 data tones, then the end marker,
/// with a gap after every tone except the last.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TonePlan {
    pub code: ShareCode,
    pub events: Vec<ToneEvent>,
}

impl TonePlan {
    /// Total airtime in milliseconds
    pub fn duration_ms(&self) -> u32 {
        self.events.iter().map(ToneEvent::duration_ms).sum()
    }

    /// Only the tone frequencies, in order
    pub fn frequencies(&self) -> Vec<f32> {
        self.events.iter().filter_map(ToneEvent::frequency_hz).collect()
    }
}

/// Build the tone plan for a code string
///
/// The input is normalized (trim, uppercase) and must then be `DS-` plus
/// 6 alphabet symbols, otherwise `InvalidCodeFormat`.
pub fn build_plan(code: &str) -> Result<TonePlan> {
    plan_for(ShareCode::parse(code)?)
}

/// Build the tone plan for an already validated code
pub fn plan_for(code: ShareCode) -> Result<TonePlan> {
    let mut events = Vec::with_capacity(15);

    events.push(ToneEvent::Tone {
        frequency_hz: START_FREQ,
        duration_ms: MARKER_MS,
    });
    events.push(ToneEvent::Gap { duration_ms: GAP_MS });

    for symbol in code.symbols() {
        let index = index_of(symbol).ok_or_else(|| ChimeError::InvalidCodeFormat(code.to_string()))?;
        events.push(ToneEvent::Tone {
            frequency_hz: frequency_of(index)?,
            duration_ms: TONE_MS,
        });
        events.push(ToneEvent::Gap { duration_ms: GAP_MS });
    }

    events.push(ToneEvent::Tone {
        frequency_hz: END_FREQ,
        duration_ms: MARKER_MS,
    });

    Ok(TonePlan { code, events })
}
