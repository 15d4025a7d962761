//! End-to-end coverage of the analysis pipeline, from raw samples to
//! playable chord entries, without touching any audio device.

use hum_core::aggregate::BeatAggregator;
use hum_core::capture::{MedianSmoother, ANALYSIS_FRAME_SIZE, MIN_STABLE_COUNT};
use hum_core::chord::ChordType;
use hum_core::pitch::PitchDetector;
use hum_core::segment::{build_segments, playable_entries};
use hum_core::tuning::frequency_to_note_name;

const SAMPLE_RATE: u32 = 44_100;

fn sine_frame(freq: f32) -> Vec<f32> {
    (0..ANALYSIS_FRAME_SIZE)
        .map(|i| 0.4 * (std::f32::consts::TAU * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

#[test]
fn sustained_hum_becomes_a_stable_note() {
    let detector = PitchDetector::new(SAMPLE_RATE);
    let mut smoother = MedianSmoother::new();

    // A4 sustained over enough frames to cross the stability gate
    let frame = sine_frame(440.0);
    let mut last = None;
    for _ in 0..MIN_STABLE_COUNT {
        last = smoother.push(detector.detect(&frame));
    }
    let hz = last.expect("stable after MIN_STABLE_COUNT frames");
    assert!((hz - 440.0).abs() / 440.0 < 0.01);
    assert_eq!(frequency_to_note_name(hz), Some("A"));
}

#[test]
fn note_change_converges_within_the_window() {
    let detector = PitchDetector::new(SAMPLE_RATE);
    let mut smoother = MedianSmoother::new();

    let c4 = sine_frame(261.63);
    let e4 = sine_frame(329.63);
    for _ in 0..8 {
        smoother.push(detector.detect(&c4));
    }
    // After a majority of the window holds the new pitch, the median flips
    let mut name = None;
    for _ in 0..6 {
        if let Some(hz) = smoother.push(detector.detect(&e4)) {
            name = frequency_to_note_name(hz);
        }
    }
    assert_eq!(name, Some("E"));
}

#[test]
fn detected_beats_become_playable_chords() {
    // Per-beat aggregation of a C-C-rest-E melody
    let mut aggregator = BeatAggregator::new();
    aggregator.on_beat(); // recording starts
    for _ in 0..4 {
        aggregator.on_detection("C");
    }
    aggregator.on_beat();
    for _ in 0..3 {
        aggregator.on_detection("C");
    }
    aggregator.on_beat();
    aggregator.on_detection("A"); // single glitch inside the rest
    aggregator.on_beat();
    for _ in 0..5 {
        aggregator.on_detection("E");
    }
    let beats = aggregator.finish();
    assert_eq!(beats, vec![Some("C"), Some("C"), None, Some("E")]);

    // Segmentation merges the C run and keeps durations beat-aligned
    let segments = build_segments(&beats, 500);
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].note_name, "C");
    assert_eq!(segments[0].beat_count, 2);
    assert_eq!(segments[0].duration_ms, 1000);
    assert_eq!(segments[1].note_name, "E");

    // Default selections are playable as-is
    let entries = playable_entries(&segments);
    assert_eq!(entries.len(), 2);
    let first = entries[0].1;
    assert_eq!(first.chord.display_name(), "C");
    assert_eq!(first.chord.chord_type, ChordType::Major);
    assert_eq!(first.chord.midi_notes(first.base_octave), vec![48, 52, 55]);
    assert_eq!(first.duration_ms, 1000);
}
