//! # Pitch Detection Module
//!
//! This module implements fundamental-frequency estimation for monophonic
//! input (a hummed or sung melody) using the YIN algorithm,
//! de Cheveigné & Kawahara (2002).
//!
//! ## Features
//! - Absolute-threshold lag search with local-minimum refinement
//! - Cumulative mean normalized difference function (CMNDF)
//! - Parabolic interpolation for sub-sample accuracy
//! - Amplitude gating to filter out silence

/// YIN pitch detector configured for a fixed sample rate and search range.
///
/// The detector is stateless across calls; only the configuration is held.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    sample_rate: u32,
    /// Lowest detectable frequency in Hz.
    min_freq: f32,
    /// Highest detectable frequency in Hz.
    max_freq: f32,
    /// Absolute CMNDF threshold for the lag search.
    threshold: f32,
}

/// RMS level below which a frame is treated as silence.
const SILENCE_RMS: f32 = 0.01;

impl PitchDetector {
    /// Creates a detector with the default search range of 80-1000 Hz
    /// (roughly D2 to B5, covering hummed melodies) and threshold 0.15.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            min_freq: 80.0,
            max_freq: 1000.0,
            threshold: 0.15,
        }
    }

    /// Creates a detector with an explicit frequency search range.
    pub fn with_range(sample_rate: u32, min_freq: f32, max_freq: f32) -> Self {
        Self {
            sample_rate,
            min_freq,
            max_freq,
            threshold: 0.15,
        }
    }

    /// Shortest lag to search, corresponding to `max_freq`.
    fn min_tau(&self) -> usize {
        (self.sample_rate as f32 / self.max_freq) as usize
    }

    /// Longest lag to search, corresponding to `min_freq`.
    fn max_tau(&self) -> usize {
        (self.sample_rate as f32 / self.min_freq) as usize
    }

    /// Estimates the fundamental frequency of one analysis frame.
    ///
    /// The frame must contain normalized samples in -1.0..1.0 and be at least
    /// `2 * max_tau` samples long, otherwise no detection is reported.
    ///
    /// # Arguments
    /// * `samples` - One fixed-length analysis frame
    ///
    /// # Returns
    /// * `Some(frequency)` - Detected fundamental in Hz, inside the search range
    /// * `None` - Silence, no clear periodicity, or out-of-range result
    pub fn detect(&self, samples: &[f32]) -> Option<f32> {
        let min_tau = self.min_tau();
        let max_tau = self.max_tau();
        if samples.len() < max_tau * 2 {
            return None;
        }

        // --- Silence gate: skip frames with no usable energy ---
        let rms = (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
        if rms < SILENCE_RMS {
            return None;
        }

        let half_window = (samples.len() / 2).min(max_tau + 1);

        // --- Step 1: difference function ---
        let mut diff = vec![0.0f32; half_window];
        for tau in min_tau..half_window {
            let mut sum = 0.0f32;
            for i in 0..half_window {
                let delta = samples[i] - samples[i + tau];
                sum += delta * delta;
            }
            diff[tau] = sum;
        }

        // --- Step 2: cumulative mean normalized difference (CMNDF) ---
        let mut cmndf = vec![0.0f32; half_window];
        cmndf[0] = 1.0;
        let mut running_sum = 0.0f32;
        for tau in 1..half_window {
            running_sum += diff[tau];
            cmndf[tau] = if running_sum == 0.0 {
                0.0
            } else {
                diff[tau] * tau as f32 / running_sum
            };
        }

        // --- Step 3: absolute threshold search with local-minimum refinement ---
        let mut tau = min_tau;
        while tau < half_window {
            if cmndf[tau] < self.threshold {
                // Walk forward while the dip keeps deepening
                while tau + 1 < half_window && cmndf[tau + 1] < cmndf[tau] {
                    tau += 1;
                }
                break;
            }
            tau += 1;
        }
        if tau >= half_window || cmndf[tau] >= self.threshold {
            return None;
        }

        // --- Step 4: parabolic interpolation around the chosen lag ---
        let better_tau = if tau > 0 && tau < half_window - 1 {
            let s0 = cmndf[tau - 1];
            let s1 = cmndf[tau];
            let s2 = cmndf[tau + 1];
            let denom = 2.0 * (2.0 * s1 - s2 - s0);
            if denom.abs() > 1e-6 {
                tau as f32 + (s2 - s0) / denom
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };

        let frequency = self.sample_rate as f32 / better_tau;
        if frequency >= self.min_freq && frequency <= self.max_freq {
            Some(frequency)
        } else {
            None
        }
    }
}
