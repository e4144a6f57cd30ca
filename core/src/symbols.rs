use crate::error::{ChimeError, Result};
use crate::{ALPHABET, BASE_FREQ, END_FREQ, NUM_SYMBOLS, START_FREQ, STEP};

/// Index of a symbol in the alphabet, or `None` for characters outside `0-9A-Z`.
///
/// Lookup is exact: lowercase letters are not symbols. Codes are normalized
/// before they reach this table.
pub fn index_of(symbol: char) -> Option<usize> {
    ALPHABET.find(symbol)
}

/// Symbol at a given alphabet index
pub fn symbol_at(index: usize) -> Result<char> {
    ALPHABET
        .as_bytes()
        .get(index)
        .map(|&b| b as char)
        .ok_or(ChimeError::OutOfRange(index))
}

/// Tone frequency for a symbol index
/// freq_hz = BASE_FREQ + index * STEP
pub fn frequency_of(index: usize) -> Result<f32> {
    if index >= NUM_SYMBOLS {
        return Err(ChimeError::OutOfRange(index));
    }
    Ok(BASE_FREQ + index as f32 * STEP)
}

/// Whether `freq` lies within `tolerance` Hz of `target`
pub fn is_near(freq: f32, target: f32, tolerance: f32) -> bool {
    (freq - target).abs() <= tolerance
}

/// Map a measured frequency to the nearest data symbol index
///
/// Returns None when the nearest slot is outside the alphabet or the
/// measured frequency is further than `tolerance` from it.
pub fn nearest_symbol(freq: f32, tolerance: f32) -> Option<usize> {
    // Halves round up, so 990 Hz still reads as symbol 0
    let slot = ((freq - BASE_FREQ) / STEP + 0.5).floor();
    if slot < 0.0 || slot >= NUM_SYMBOLS as f32 {
        return None;
    }
    let index = slot as usize;
    let target = BASE_FREQ + index as f32 * STEP;
    if is_near(freq, target, tolerance) {
        Some(index)
    } else {
        None
    }
}

/// True when `freq` could be read as either marker
pub fn is_marker(freq: f32, tolerance: f32) -> bool {
    is_near(freq, START_FREQ, tolerance) || is_near(freq, END_FREQ, tolerance)
}
