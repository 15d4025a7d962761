//! # Note Mapping Module
//!
//! This module converts detected frequencies into musical note names based on
//! equal temperament tuning with A4 = 440 Hz.
//!
//! ## Features
//! - Frequency to pitch-class name conversion (12-tone equal temperament)
//! - Frequency to full note name conversion (pitch class + octave)
//! - Pitch-class name to semitone index lookup
//!
//! Internally everything is keyed by the semitone index 0-11 (C = 0); string
//! names only appear at the interface boundary.

/// The 12 pitch-class names in semitone order starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a frequency to the nearest pitch-class name (e.g. 440 Hz -> "A").
///
/// The frequency is mapped to the nearest MIDI note using equal temperament
/// with A4 = 440 Hz (MIDI 69). Frequencies outside the MIDI range 0..=127,
/// or non-positive frequencies, have no name.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
///
/// # Returns
/// * `Some(name)` - Pitch-class name, octave-independent
/// * `None` - No valid note for this frequency
pub fn frequency_to_note_name(frequency: f32) -> Option<&'static str> {
    let midi = frequency_to_midi(frequency)?;
    Some(NOTE_NAMES[midi as usize % 12])
}

/// Converts a frequency to a full note name with octave (e.g. 440 Hz -> "A4").
///
/// Octave numbering follows the MIDI convention: octave = midi / 12 - 1,
/// so middle C (MIDI 60) is "C4".
pub fn frequency_to_full_note(frequency: f32) -> Option<String> {
    let midi = frequency_to_midi(frequency)?;
    let name = NOTE_NAMES[midi as usize % 12];
    let octave = (midi / 12) as i32 - 1;
    Some(format!("{}{}", name, octave))
}

/// Maps a frequency to the nearest MIDI note number, if it has one.
fn frequency_to_midi(frequency: f32) -> Option<u8> {
    if frequency <= 0.0 {
        return None;
    }
    // A4 = 440 Hz = MIDI note 69
    let midi = 12.0 * (frequency / 440.0).log2() + 69.0;
    let rounded = midi.round();
    if !(0.0..=127.0).contains(&rounded) {
        return None;
    }
    Some(rounded as u8)
}

/// Returns the semitone index (0-11, C = 0) for a pitch-class name.
pub fn semitone_of(name: &str) -> Option<usize> {
    NOTE_NAMES.iter().position(|&n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_maps_to_a() {
        assert_eq!(frequency_to_note_name(440.0), Some("A"));
    }

    #[test]
    fn zero_and_negative_have_no_name() {
        assert_eq!(frequency_to_note_name(0.0), None);
        assert_eq!(frequency_to_note_name(-12.0), None);
    }

    #[test]
    fn out_of_midi_range_has_no_name() {
        // MIDI 127 is G9 (~12543 Hz); far above must be rejected
        assert_eq!(frequency_to_note_name(30_000.0), None);
        // Below MIDI 0 (~8.18 Hz)
        assert_eq!(frequency_to_note_name(4.0), None);
    }

    #[test]
    fn every_midi_note_names_inside_the_table() {
        for midi in 0..=127u32 {
            let freq = 440.0 * 2.0_f32.powf((midi as f32 - 69.0) / 12.0);
            let name = frequency_to_note_name(freq).expect("in-range frequency");
            assert!(NOTE_NAMES.contains(&name));
        }
    }

    #[test]
    fn full_note_includes_octave() {
        assert_eq!(frequency_to_full_note(440.0).as_deref(), Some("A4"));
        assert_eq!(frequency_to_full_note(261.63).as_deref(), Some("C4"));
    }

    #[test]
    fn semitone_round_trip() {
        for (i, name) in NOTE_NAMES.iter().enumerate() {
            assert_eq!(semitone_of(name), Some(i));
        }
        assert_eq!(semitone_of("H"), None);
    }
}
