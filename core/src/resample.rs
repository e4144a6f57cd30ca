//! Helpers for conditioning host audio before analysis

use crate::error::{ChimeError, Result};
use crate::{FFT_SIZE, SAMPLE_RATE, STEP};

/// Average interleaved multi-channel audio down to mono
///
/// # Arguments
/// * `samples` - Interleaved frames `[c0, c1, .., c0, c1, ..]`
/// * `channels` - Number of interleaved channels
pub fn downmix(samples: &[f32], channels: usize) -> Result<Vec<f32>> {
    if channels == 0 {
        return Err(ChimeError::InvalidConfig("channel count must be non-zero".to_string()));
    }
    if samples.len() % channels != 0 {
        return Err(ChimeError::InvalidConfig(format!(
            "{} samples is not a whole number of {}-channel frames",
            samples.len(),
            channels
        )));
    }
    if channels == 1 {
        return Ok(samples.to_vec());
    }

    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Resample with linear interpolation
pub fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = ((samples.len() as f64) * ratio).ceil() as usize;
    let mut resampled = Vec::with_capacity(new_length);

    for i in 0..new_length {
        let src = i as f64 / ratio;
        let floor = src.floor() as usize;
        let fraction = (src - floor as f64) as f32;

        let value = match (samples.get(floor), samples.get(floor + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - fraction) + b * fraction,
            (Some(&a), None) => a,
            _ => samples[samples.len() - 1],
        };
        resampled.push(value);
    }

    resampled
}

/// Whether the default analysis window resolves symbols at this rate
pub fn supports_sample_rate(sample_rate: u32) -> bool {
    sample_rate > 0 && sample_rate as f32 / FFT_SIZE as f32 <= STEP
}

/// Bring audio to a rate the default analyzer can use
///
/// Audio that is already usable is returned unchanged; anything else is
/// resampled to `SAMPLE_RATE`. A zero sample rate is rejected.
pub fn conform(samples: Vec<f32>, sample_rate: u32) -> Result<(Vec<f32>, u32)> {
    if sample_rate == 0 {
        return Err(ChimeError::InvalidConfig("sample rate must be non-zero".to_string()));
    }
    if supports_sample_rate(sample_rate) {
        Ok((samples, sample_rate))
    } else {
        log::debug!("Resampling input from {} Hz to {} Hz", sample_rate, SAMPLE_RATE);
        Ok((resample_audio(&samples, sample_rate, SAMPLE_RATE), SAMPLE_RATE))
    }
}
