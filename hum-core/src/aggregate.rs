//! # Beat Aggregation Module
//!
//! Merges the high-rate detection stream with the once-per-beat metronome
//! stream: every beat window is reduced to its dominant note (majority vote
//! with a minimum-count gate), producing one note (or silence) per beat.
//!
//! The aggregator itself is a pure state machine; the session loop drives it
//! from both channels and guarantees that a beat boundary is fully processed
//! before detections belonging to the next beat are fed in.

/// Minimum occurrences the most frequent note needs within one beat window
/// for the beat to count as voiced. Below this the beat is silent.
pub const MIN_BEAT_DETECTIONS: usize = 2;

/// Accumulates detected notes per beat window and finalizes one dominant
/// note per beat.
#[derive(Debug, Default)]
pub struct BeatAggregator {
    /// Notes detected inside the current (open) beat window.
    window: Vec<&'static str>,
    /// Finalized dominant note per completed beat.
    beats: Vec<Option<&'static str>>,
    /// Whether a beat boundary has been seen since activation.
    window_open: bool,
}

impl BeatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one detected note inside the current beat window.
    /// Detections arriving before the first beat boundary are discarded.
    pub fn on_detection(&mut self, note: &'static str) {
        if self.window_open {
            self.window.push(note);
        }
    }

    /// Processes a beat boundary: finalizes the window accumulated since the
    /// previous boundary and opens a new one. The very first boundary after
    /// activation only opens the window.
    pub fn on_beat(&mut self) {
        if self.window_open {
            let dominant = dominant_note(&self.window, MIN_BEAT_DETECTIONS);
            self.beats.push(dominant);
            self.window.clear();
        }
        self.window_open = true;
    }

    /// Flushes the in-progress window as one final beat and returns the
    /// full per-beat note stream.
    pub fn finish(mut self) -> Vec<Option<&'static str>> {
        if self.window_open {
            let dominant = dominant_note(&self.window, MIN_BEAT_DETECTIONS);
            self.beats.push(dominant);
        }
        self.beats
    }

    /// Number of beats finalized so far.
    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }
}

/// Majority vote over a beat window.
///
/// Returns the most frequent note name, or `None` when the winner occurs
/// fewer than `min_detections` times (the beat is treated as silent).
pub fn dominant_note(notes: &[&'static str], min_detections: usize) -> Option<&'static str> {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for &note in notes {
        match counts.iter_mut().find(|(name, _)| *name == note) {
            Some((_, count)) => *count += 1,
            None => counts.push((note, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .filter(|&(_, count)| count >= min_detections)
        .map(|(name, _)| name)
}
