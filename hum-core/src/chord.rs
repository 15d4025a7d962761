//! # Chord Module
//!
//! Chord types, MIDI note derivation, and the music-theory suggestion table
//! that maps a detected pitch class to harmonically plausible chords.

use once_cell::sync::Lazy;

use crate::tuning::{semitone_of, NOTE_NAMES};

/// Number of pitch classes.
const SEMITONES: usize = 12;

/// Chord qualities supported by the suggester and synthesizer.
///
/// Each quality carries a fixed list of semitone intervals from the root.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChordType {
    /// Major triad (root, major third, fifth)
    Major,
    /// Minor triad
    Minor,
    /// Major seventh
    Major7,
    /// Minor seventh
    Minor7,
    /// Dominant seventh
    Dominant7,
    /// Suspended fourth
    Sus4,
    /// Added ninth
    Add9,
    /// Diminished triad
    Dim,
    /// Augmented triad
    Aug,
    /// Suspended second
    Sus2,
}

impl ChordType {
    /// Semitone intervals from the root, lowest first.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ChordType::Major => &[0, 4, 7],
            ChordType::Minor => &[0, 3, 7],
            ChordType::Major7 => &[0, 4, 7, 11],
            ChordType::Minor7 => &[0, 3, 7, 10],
            ChordType::Dominant7 => &[0, 4, 7, 10],
            ChordType::Sus4 => &[0, 5, 7],
            ChordType::Add9 => &[0, 4, 7, 14],
            ChordType::Dim => &[0, 3, 6],
            ChordType::Aug => &[0, 4, 8],
            ChordType::Sus2 => &[0, 2, 7],
        }
    }

    /// Display suffix appended to the root name (empty for major).
    pub fn suffix(self) -> &'static str {
        match self {
            ChordType::Major => "",
            ChordType::Minor => "m",
            ChordType::Major7 => "M7",
            ChordType::Minor7 => "m7",
            ChordType::Dominant7 => "7",
            ChordType::Sus4 => "sus4",
            ChordType::Add9 => "add9",
            ChordType::Dim => "dim",
            ChordType::Aug => "aug",
            ChordType::Sus2 => "sus2",
        }
    }
}

/// The ten root qualities suggested for every pitch class, in contract order.
const ROOT_QUALITIES: [ChordType; 10] = [
    ChordType::Major,
    ChordType::Minor,
    ChordType::Major7,
    ChordType::Minor7,
    ChordType::Dominant7,
    ChordType::Sus4,
    ChordType::Add9,
    ChordType::Dim,
    ChordType::Aug,
    ChordType::Sus2,
];

/// A concrete chord: a root pitch class plus a quality.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Chord {
    /// Root pitch class as a semitone index (0-11, C = 0).
    pub root_pc: usize,
    /// Chord quality.
    pub chord_type: ChordType,
}

impl Chord {
    /// Builds a chord from a root pitch-class index (taken modulo 12).
    pub fn new(root_pc: usize, chord_type: ChordType) -> Self {
        Self {
            root_pc: root_pc % SEMITONES,
            chord_type,
        }
    }

    /// Builds a chord from a pitch-class name; unknown names default to C.
    pub fn from_name(root: &str, chord_type: ChordType) -> Self {
        Self {
            root_pc: semitone_of(root).unwrap_or(0),
            chord_type,
        }
    }

    /// Root pitch-class name.
    pub fn root_name(&self) -> &'static str {
        NOTE_NAMES[self.root_pc]
    }

    /// Display name, e.g. "C", "Am", "G7", "Dsus4".
    pub fn display_name(&self) -> String {
        format!("{}{}", self.root_name(), self.chord_type.suffix())
    }

    /// MIDI note numbers of the constituent tones at the given base octave.
    ///
    /// Uses the `(octave + 1) * 12 + semitone` numbering, so C3 with the
    /// default base octave 3 is MIDI 48.
    pub fn midi_notes(&self, base_octave: i32) -> Vec<u8> {
        let root_midi = (base_octave + 1) * 12 + self.root_pc as i32;
        self.chord_type
            .intervals()
            .iter()
            .map(|&interval| (root_midi + interval).clamp(0, 127) as u8)
            .collect()
    }
}

/// Suggestion table indexed by pitch class.
///
/// Per class: the ten root qualities, then the major chord in which the class
/// is the fifth (root five semitones up) and the minor chord in which it is
/// the minor third (root nine semitones up). For C that yields F major and
/// A minor. The ordering is part of the contract; the first entry is the
/// default selection.
static SUGGESTIONS: Lazy<[Vec<Chord>; SEMITONES]> = Lazy::new(|| {
    std::array::from_fn(|pc| {
        let mut chords: Vec<Chord> = ROOT_QUALITIES
            .iter()
            .map(|&quality| Chord::new(pc, quality))
            .collect();
        chords.push(Chord::new(pc + 5, ChordType::Major));
        chords.push(Chord::new(pc + 9, ChordType::Minor));
        chords
    })
});

/// Returns the ordered chord candidates for a pitch-class name.
///
/// Unmapped names fall back to `[root major, root minor]` built from C.
/// Lookups never mutate the table; repeated calls return identical lists.
pub fn suggestions_for(note_name: &str) -> Vec<Chord> {
    match semitone_of(note_name) {
        Some(pc) => SUGGESTIONS[pc].clone(),
        None => vec![
            Chord::from_name(note_name, ChordType::Major),
            Chord::from_name(note_name, ChordType::Minor),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_major_midi_notes_at_base_octave_three() {
        let chord = Chord::from_name("C", ChordType::Major);
        assert_eq!(chord.midi_notes(3), vec![48, 52, 55]);
    }

    #[test]
    fn display_names() {
        assert_eq!(Chord::from_name("C", ChordType::Major).display_name(), "C");
        assert_eq!(Chord::from_name("A", ChordType::Minor).display_name(), "Am");
        assert_eq!(
            Chord::from_name("G", ChordType::Dominant7).display_name(),
            "G7"
        );
        assert_eq!(
            Chord::from_name("D#", ChordType::Sus4).display_name(),
            "D#sus4"
        );
    }

    #[test]
    fn interval_tables() {
        assert_eq!(ChordType::Major.intervals(), &[0, 4, 7]);
        assert_eq!(ChordType::Minor7.intervals(), &[0, 3, 7, 10]);
        assert_eq!(ChordType::Add9.intervals(), &[0, 4, 7, 14]);
    }

    #[test]
    fn suggestions_for_c_end_with_f_major_and_a_minor() {
        let chords = suggestions_for("C");
        assert_eq!(chords.len(), 12);
        assert_eq!(chords[0], Chord::from_name("C", ChordType::Major));
        assert_eq!(chords[10], Chord::from_name("F", ChordType::Major));
        assert_eq!(chords[11], Chord::from_name("A", ChordType::Minor));
    }

    #[test]
    fn related_chords_contain_the_class() {
        // The queried pitch class must be the fifth of the appended major
        // chord and the minor third of the appended minor chord.
        for pc in 0..12 {
            let chords = suggestions_for(crate::tuning::NOTE_NAMES[pc]);
            let fifth_root = chords[10].root_pc;
            let third_root = chords[11].root_pc;
            assert_eq!((fifth_root + 7) % 12, pc);
            assert_eq!((third_root + 3) % 12, pc);
        }
    }

    #[test]
    fn lookup_is_idempotent() {
        assert_eq!(suggestions_for("G"), suggestions_for("G"));
    }

    #[test]
    fn unknown_name_falls_back_to_major_minor() {
        let chords = suggestions_for("X");
        assert_eq!(chords.len(), 2);
        assert_eq!(chords[0].chord_type, ChordType::Major);
        assert_eq!(chords[1].chord_type, ChordType::Minor);
    }
}
