//! # Segment Module
//!
//! Run-length encodes the per-beat dominant-note stream into contiguous
//! [`NoteSegment`]s and carries the edits the caller may apply afterwards
//! (beat count, octave shift, semitone shift, chord selection).

use crate::chord::{suggestions_for, Chord};
use crate::tuning::{semitone_of, NOTE_NAMES};

/// Baseline octave for chord playback; per-segment shifts are relative to it.
pub const BASE_OCTAVE: i32 = 3;

/// Allowed octave shift range for a segment.
const OCTAVE_SHIFT_RANGE: std::ops::RangeInclusive<i32> = -2..=2;

/// One contiguous run of equal detected notes on the beat grid.
///
/// The segment owns the chord candidates proposed for its note. A
/// `beat_count` of 0 marks a segment the user skipped: it is excluded from
/// playback but keeps its position in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSegment {
    /// Pitch-class name of the run.
    pub note_name: String,
    /// Length of the run in beats.
    pub beat_count: u32,
    /// Length of the run in milliseconds (`beat_count * beat_duration_ms`).
    pub duration_ms: u64,
    /// Ordered chord candidates for this note.
    pub suggested_chords: Vec<Chord>,
    /// Index into `suggested_chords` of the current selection.
    pub selected_chord_index: usize,
    /// Octave shift relative to [`BASE_OCTAVE`], clamped to -2..=2.
    pub octave_shift: i32,
}

impl NoteSegment {
    fn new(note_name: &str, beat_count: u32, beat_duration_ms: u64) -> Self {
        Self {
            note_name: note_name.to_string(),
            beat_count,
            duration_ms: beat_duration_ms * beat_count as u64,
            suggested_chords: suggestions_for(note_name),
            selected_chord_index: 0,
            octave_shift: 0,
        }
    }

    /// The currently selected chord, if the index is valid.
    pub fn selected_chord(&self) -> Option<Chord> {
        self.suggested_chords.get(self.selected_chord_index).copied()
    }

    /// Effective playback octave for this segment.
    pub fn base_octave(&self) -> i32 {
        BASE_OCTAVE + self.octave_shift
    }

    /// Sets the beat count and recomputes the duration. 0 marks the segment
    /// as skipped.
    pub fn set_beat_count(&mut self, beat_count: u32, beat_duration_ms: u64) {
        self.beat_count = beat_count;
        self.duration_ms = beat_duration_ms * beat_count as u64;
    }

    /// Shifts the octave by `delta`, clamped to the allowed range.
    pub fn shift_octave(&mut self, delta: i32) {
        self.octave_shift = (self.octave_shift + delta)
            .clamp(*OCTAVE_SHIFT_RANGE.start(), *OCTAVE_SHIFT_RANGE.end());
    }

    /// Moves the segment's note by `semitones` (may be negative), refreshing
    /// the chord candidates and resetting the selection. Unmapped note names
    /// are left untouched.
    pub fn shift_note(&mut self, semitones: i32) {
        let Some(pc) = semitone_of(&self.note_name) else {
            return;
        };
        let shifted = (pc as i32 + semitones).rem_euclid(12) as usize;
        self.note_name = NOTE_NAMES[shifted].to_string();
        self.suggested_chords = suggestions_for(&self.note_name);
        self.selected_chord_index = 0;
    }

    /// Selects a chord candidate; out-of-range indices are ignored.
    pub fn select_chord(&mut self, chord_index: usize) {
        if chord_index < self.suggested_chords.len() {
            self.selected_chord_index = chord_index;
        }
    }
}

/// Builds segments from a per-beat dominant-note stream.
///
/// Consecutive beats sharing the same non-silent note are merged into one
/// segment; a silent beat (`None`) closes the open run and contributes no
/// segment of its own. A trailing open run is closed at end of input.
///
/// # Arguments
/// * `beat_notes` - Dominant note per beat, `None` for silence
/// * `beat_duration_ms` - Length of one beat in milliseconds
pub fn build_segments(beat_notes: &[Option<&str>], beat_duration_ms: u64) -> Vec<NoteSegment> {
    let mut segments = Vec::new();
    let mut current: Option<(&str, u32)> = None;

    for note in beat_notes {
        match (*note, &mut current) {
            (None, open) => {
                if let Some((name, count)) = open.take() {
                    segments.push(NoteSegment::new(name, count, beat_duration_ms));
                }
            }
            (Some(note), Some((name, count))) if *name == note => *count += 1,
            (Some(note), open) => {
                if let Some((name, count)) = open.take() {
                    segments.push(NoteSegment::new(name, count, beat_duration_ms));
                }
                *open = Some((note, 1));
            }
        }
    }
    if let Some((name, count)) = current {
        segments.push(NoteSegment::new(name, count, beat_duration_ms));
    }
    segments
}

/// Extracts the playable entries of a segment list for sequence playback.
///
/// Skipped segments (`beat_count == 0`) and segments without a selectable
/// chord are dropped; each surviving entry is paired with its original
/// segment index so playback steps can be mapped back onto the full list.
pub fn playable_entries(segments: &[NoteSegment]) -> Vec<(usize, crate::synth::SequenceEntry)> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.beat_count > 0)
        .filter_map(|(index, segment)| {
            let chord = segment.selected_chord()?;
            Some((
                index,
                crate::synth::SequenceEntry {
                    chord,
                    duration_ms: segment.duration_ms,
                    base_octave: segment.base_octave(),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordType;

    #[test]
    fn silence_splits_runs() {
        let beats = [Some("C"), Some("C"), None, Some("C"), Some("C"), Some("C")];
        let segments = build_segments(&beats, 500);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].note_name, "C");
        assert_eq!(segments[0].beat_count, 2);
        assert_eq!(segments[0].duration_ms, 1000);
        assert_eq!(segments[1].beat_count, 3);
        assert_eq!(segments[1].duration_ms, 1500);
    }

    #[test]
    fn note_change_closes_the_run() {
        let beats = [Some("C"), Some("E"), Some("E"), Some("G")];
        let segments = build_segments(&beats, 250);
        let names: Vec<&str> = segments.iter().map(|s| s.note_name.as_str()).collect();
        assert_eq!(names, ["C", "E", "G"]);
        assert_eq!(segments[1].beat_count, 2);
    }

    #[test]
    fn all_silence_yields_no_segments() {
        assert!(build_segments(&[None, None, None], 500).is_empty());
        assert!(build_segments(&[], 500).is_empty());
    }

    #[test]
    fn segments_are_enriched_with_suggestions() {
        let segments = build_segments(&[Some("A")], 500);
        assert_eq!(segments[0].selected_chord_index, 0);
        assert_eq!(
            segments[0].selected_chord(),
            Some(Chord::from_name("A", ChordType::Major))
        );
    }

    #[test]
    fn set_beat_count_keeps_duration_invariant() {
        let mut segment = build_segments(&[Some("C")], 500).remove(0);
        segment.set_beat_count(4, 500);
        assert_eq!(segment.duration_ms, 2000);
        segment.set_beat_count(0, 500);
        assert_eq!(segment.duration_ms, 0);
    }

    #[test]
    fn octave_shift_is_clamped() {
        let mut segment = build_segments(&[Some("C")], 500).remove(0);
        for _ in 0..5 {
            segment.shift_octave(1);
        }
        assert_eq!(segment.octave_shift, 2);
        assert_eq!(segment.base_octave(), 5);
        for _ in 0..9 {
            segment.shift_octave(-1);
        }
        assert_eq!(segment.octave_shift, -2);
    }

    #[test]
    fn shift_note_wraps_and_refreshes_suggestions() {
        let mut segment = build_segments(&[Some("B")], 500).remove(0);
        segment.select_chord(3);
        segment.shift_note(1);
        assert_eq!(segment.note_name, "C");
        assert_eq!(segment.selected_chord_index, 0);
        assert_eq!(segment.suggested_chords, suggestions_for("C"));
        segment.shift_note(-1);
        assert_eq!(segment.note_name, "B");
    }

    #[test]
    fn skipped_segments_are_excluded_from_playback() {
        let beats = [Some("C"), Some("E"), Some("G")];
        let mut segments = build_segments(&beats, 500);
        segments[1].set_beat_count(0, 500); // user skipped the E segment
        segments[2].shift_octave(1);

        let entries = playable_entries(&segments);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 0);
        assert_eq!(entries[1].0, 2);
        assert_eq!(entries[1].1.base_octave, 4);
        assert_eq!(entries[0].1.duration_ms, 500);
    }

    #[test]
    fn select_chord_ignores_out_of_range() {
        let mut segment = build_segments(&[Some("D")], 500).remove(0);
        segment.select_chord(99);
        assert_eq!(segment.selected_chord_index, 0);
        segment.select_chord(11);
        assert_eq!(segment.selected_chord_index, 11);
    }
}
