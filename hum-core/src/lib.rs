// hum-core/src/lib.rs

//! The core logic for the hum-to-chords tool.
//! This crate turns a hummed melody captured from the microphone into a
//! quantized, beat-aligned note sequence, proposes playable chords for it,
//! and synthesizes chords back into audio. It is completely headless
//! and contains no UI code.
//!
//! The moving parts during a recording are three independently cancellable
//! activities: the capture/analysis loop ([`capture`]), the metronome
//! ([`beat`]) and the aggregation of both ([`session`]). They communicate
//! over one-directional crossbeam channels; no mutable state is shared.

pub mod aggregate;
pub mod audio;
pub mod beat;
pub mod capture;
pub mod chord;
pub mod pitch;
pub mod segment;
pub mod session;
pub mod synth;
pub mod tuning;

pub use audio::AudioError;

/// Lower bound of the supported tempo range in BPM.
pub const MIN_BPM: u32 = 40;
/// Upper bound of the supported tempo range in BPM.
pub const MAX_BPM: u32 = 240;

/// Clamps a tempo into the supported range. Invalid tempos are normalized,
/// never rejected.
pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// One smoothed pitch observation from the capture pipeline.
///
/// `note_name` is `None` when the rolling window holds no stable pitch
/// (silence, glitches, or an out-of-range estimate). That is a valid data
/// value, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionEvent {
    /// Median frequency over the rolling window, when stable.
    pub smoothed_hz: Option<f32>,
    /// Pitch-class name of the smoothed frequency.
    pub note_name: Option<&'static str>,
}

/// One metronome tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// 0-based index of the beat within its measure.
    pub beat_in_measure: u32,
    /// True exactly on the first beat of a measure.
    pub accent: bool,
}

/// A time signature. The numerator governs accent placement and the length
/// of the pre-recording countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Builds a time signature, normalizing malformed values to 4/4.
    pub fn new(numerator: u32, denominator: u32) -> Self {
        if numerator == 0 || denominator == 0 {
            Self::default()
        } else {
            Self {
                numerator,
                denominator,
            }
        }
    }

    /// The signatures offered by the frontend.
    pub const PRESETS: [TimeSignature; 4] = [
        TimeSignature { numerator: 4, denominator: 4 },
        TimeSignature { numerator: 3, denominator: 4 },
        TimeSignature { numerator: 2, denominator: 4 },
        TimeSignature { numerator: 6, denominator: 8 },
    ];
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
