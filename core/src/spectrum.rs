use std::f32::consts::PI;
use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};

use crate::error::{ChimeError, Result};
use crate::{FFT_SIZE, STEP};

/// Analyzer settings
///
/// Magnitudes are mapped to a byte scale the way browser analysers do it:
/// `min_decibels` maps to 0 and `max_decibels` to 255.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: FFT_SIZE,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Strongest spectral component of one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency_hz: f32,
    /// Peak magnitude on a 0-255 scale
    pub strength: u8,
}

impl Peak {
    pub fn new(frequency_hz: f32, strength: u8) -> Self {
        Self {
            frequency_hz,
            strength,
        }
    }
}

/// Dominant frequency estimator
///
/// Stateless between calls: the same buffer always yields the same peak.
/// Frequency resolution is `sample_rate / fft_size` and must not exceed the
/// 20 Hz symbol spacing.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    config: AnalyzerConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_config(sample_rate, AnalyzerConfig::default())
    }

    pub fn with_config(sample_rate: u32, config: AnalyzerConfig) -> Result<Self> {
        if config.fft_size < 32 || config.fft_size % 2 != 0 {
            return Err(ChimeError::InvalidConfig(format!(
                "fft_size must be an even number >= 32, got {}",
                config.fft_size
            )));
        }
        if sample_rate == 0 {
            return Err(ChimeError::InvalidConfig("sample rate must be non-zero".to_string()));
        }
        let bin_width = sample_rate as f32 / config.fft_size as f32;
        if bin_width > STEP {
            return Err(ChimeError::InvalidConfig(format!(
                "bin width {:.1} Hz exceeds symbol spacing {} Hz (sample rate {}, fft_size {})",
                bin_width, STEP, sample_rate, config.fft_size
            )));
        }
        if config.min_decibels >= config.max_decibels {
            return Err(ChimeError::InvalidConfig(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                config.min_decibels, config.max_decibels
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.fft_size);

        Ok(Self {
            sample_rate,
            config,
            fft,
            window: blackman_window(config.fft_size),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Number of magnitude bins (half the transform size)
    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.config.fft_size as f32
    }

    /// Byte-scaled magnitude spectrum of the most recent `fft_size` samples
    ///
    /// Shorter buffers are treated as preceded by silence.
    pub fn spectrum(&self, buffer: &[f32]) -> Result<Vec<u8>> {
        let n = self.config.fft_size;
        let mut input = self.fft.make_input_vec();

        let recent = &buffer[buffer.len().saturating_sub(n)..];
        let offset = n - recent.len();
        input[offset..].copy_from_slice(recent);

        // Remove DC offset so a biased input can't win bin 0
        if !recent.is_empty() {
            let mean = recent.iter().sum::<f32>() / recent.len() as f32;
            for sample in input[offset..].iter_mut() {
                *sample -= mean;
            }
        }

        for (sample, &weight) in input.iter_mut().zip(self.window.iter()) {
            *sample *= weight;
        }

        let mut output = self.fft.make_output_vec();
        self.fft
            .process(&mut input, &mut output)
            .map_err(|e| ChimeError::FftError(format!("forward FFT failed: {:?}", e)))?;

        let scale = 1.0 / n as f32;
        let range = self.config.max_decibels - self.config.min_decibels;
        let bytes = output[..self.bin_count()]
            .iter()
            .map(|c| {
                let magnitude = c.norm() * scale;
                let db = 20.0 * magnitude.max(1e-12).log10();
                let scaled = 255.0 * (db - self.config.min_decibels) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect();

        Ok(bytes)
    }

    /// Frequency and strength of the strongest bin
    ///
    /// frequency = (bin / bin_count) * (sample_rate / 2). Ties go to the lowest bin.
    pub fn dominant_frequency(&self, buffer: &[f32]) -> Result<Peak> {
        let spectrum = self.spectrum(buffer)?;

        let mut max_bin = 0;
        let mut max_strength = 0u8;
        for (bin, &strength) in spectrum.iter().enumerate() {
            if strength > max_strength {
                max_strength = strength;
                max_bin = bin;
            }
        }

        let nyquist = self.sample_rate as f32 / 2.0;
        let frequency_hz = (max_bin as f32 / spectrum.len() as f32) * nyquist;
        Ok(Peak::new(frequency_hz, max_strength))
    }
}

/// One-shot dominant frequency with the default analyzer settings
pub fn dominant_frequency(buffer: &[f32], sample_rate: u32) -> Result<Peak> {
    SpectralAnalyzer::new(sample_rate)?.dominant_frequency(buffer)
}

/// Blackman window, the analysis window used by browser analysers
fn blackman_window(len: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..len)
        .map(|i| {
            let x = i as f32 / len as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
