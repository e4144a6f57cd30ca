use std::f32::consts::PI;

/// Gain near silence used at the very start and end of each tone
const ENVELOPE_FLOOR_GAIN: f32 = 0.0001;

/// Amplitude envelope applied to every tone
///
/// Linear ramp from near-silence up to `peak_gain` over `attack_ms`, a slow
/// linear ease down to `sustain_gain`, then a linear ramp back to
/// near-silence over the last `release_ms`. Gains stay well below full scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeConfig {
    pub attack_ms: u32,
    pub release_ms: u32,
    pub peak_gain: f32,
    pub sustain_gain: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack_ms: 20,
            release_ms: 20,
            peak_gain: 0.12,
            sustain_gain: 0.10,
        }
    }
}

impl EnvelopeConfig {
    /// Gain at `t_ms` into a tone lasting `duration_ms`
    pub fn gain_at(&self, t_ms: f32, duration_ms: f32) -> f32 {
        if duration_ms <= 0.0 || t_ms < 0.0 || t_ms >= duration_ms {
            return ENVELOPE_FLOOR_GAIN;
        }

        // Short tones shrink both ramps proportionally
        let mut attack = self.attack_ms as f32;
        let mut release = self.release_ms as f32;
        if attack + release > duration_ms {
            let scale = duration_ms / (attack + release);
            attack *= scale;
            release *= scale;
        }
        let release_start = duration_ms - release;

        if t_ms < attack {
            lerp(ENVELOPE_FLOOR_GAIN, self.peak_gain, t_ms / attack)
        } else if t_ms < release_start {
            let sustain_len = release_start - attack;
            lerp(self.peak_gain, self.sustain_gain, (t_ms - attack) / sustain_len)
        } else if release > 0.0 {
            lerp(self.sustain_gain, ENVELOPE_FLOOR_GAIN, (t_ms - release_start) / release)
        } else {
            self.sustain_gain
        }
    }
}

fn lerp(from: f32, to: f32, progress: f32) -> f32 {
    from + (to - from) * progress.clamp(0.0, 1.0)
}

/// Render one enveloped sine tone
pub fn synthesize_tone(
    frequency_hz: f32,
    duration_ms: u32,
    sample_rate: u32,
    envelope: &EnvelopeConfig,
) -> Vec<f32> {
    let num_samples = samples_for_ms(duration_ms, sample_rate);
    let sample_rate = sample_rate as f32;
    let duration = duration_ms as f32;

    let mut samples = vec![0.0f32; num_samples];
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f32 / sample_rate;
        let gain = envelope.gain_at(t * 1000.0, duration);
        *sample = (2.0 * PI * frequency_hz * t).sin() * gain;
    }
    samples
}

/// Number of samples covering `duration_ms` at `sample_rate`
pub fn samples_for_ms(duration_ms: u32, sample_rate: u32) -> usize {
    (duration_ms as u64 * sample_rate as u64 / 1000) as usize
}
