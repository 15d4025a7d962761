//! # Chord Synthesis Module
//!
//! Renders chords to PCM with additive synthesis (fundamental plus three
//! harmonics) shaped by an attack/decay/sustain/release envelope, and plays
//! chord sequences through the output sink.
//!
//! Playback progress is reported as a stream of [`PlaybackStep`] events the
//! caller drains; cancellation is cooperative and checked at every chunk
//! write and every chord boundary.

use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::audio::OutputSink;
use crate::chord::Chord;

/// Default chord playback length.
pub const CHORD_DURATION_MS: u64 = 1500;
/// Preview playback length, short enough for immediate audition.
pub const PREVIEW_DURATION_MS: u64 = 600;
/// Release fade at the end of every rendered chord.
const FADE_MS: u64 = 100;

/// Linear attack length in seconds.
const ATTACK_S: f32 = 0.01;
/// Linear decay length in seconds.
const DECAY_S: f32 = 0.1;
/// Sustain level the decay settles on.
const SUSTAIN_LEVEL: f32 = 0.7;

/// Relative amplitudes of harmonics 1-4.
const HARMONICS: [f32; 4] = [0.6, 0.2, 0.1, 0.05];

/// MIDI note number to frequency, A4 = 440 Hz = MIDI 69.
pub fn midi_to_frequency(midi_note: u8) -> f32 {
    440.0 * 2.0_f32.powf((midi_note as f32 - 69.0) / 12.0)
}

/// ADSR envelope value at `sample_index` of a `total`-sample rendering.
fn envelope(sample_index: usize, total: usize, fade_samples: usize, sample_rate: u32) -> f32 {
    let attack_samples = (sample_rate as f32 * ATTACK_S) as usize;
    let decay_samples = (sample_rate as f32 * DECAY_S) as usize;

    if sample_index < attack_samples {
        sample_index as f32 / attack_samples as f32
    } else if sample_index < attack_samples + decay_samples {
        let progress = (sample_index - attack_samples) as f32 / decay_samples as f32;
        1.0 - progress * (1.0 - SUSTAIN_LEVEL)
    } else if sample_index + fade_samples >= total {
        let remaining = (total - sample_index) as f32 / fade_samples as f32;
        SUSTAIN_LEVEL * remaining
    } else {
        SUSTAIN_LEVEL
    }
}

/// Renders a set of MIDI notes as one chord.
///
/// Each note is a 4-harmonic additive tone; the voices are summed, scaled by
/// the voice count, and hard-clipped to the -1.0..1.0 output range.
pub fn synthesize_chord(midi_notes: &[u8], duration_ms: u64, sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as u64 * duration_ms / 1000) as usize;
    let fade = (sample_rate as u64 * FADE_MS / 1000) as usize;
    let mut output = vec![0.0f32; total];
    if midi_notes.is_empty() {
        return output;
    }
    let gain = 1.0 / midi_notes.len() as f32;

    for &midi in midi_notes {
        let frequency = midi_to_frequency(midi);
        for (i, out) in output.iter_mut().enumerate() {
            let t = i as f32 / sample_rate as f32;
            let mut sample = 0.0f32;
            for (h, &amp) in HARMONICS.iter().enumerate() {
                sample += amp * (std::f32::consts::TAU * frequency * (h + 1) as f32 * t).sin();
            }
            *out = (*out + sample * envelope(i, total, fade, sample_rate) * gain)
                .clamp(-1.0, 1.0);
        }
    }
    output
}

/// One step of a chord-sequence playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStep {
    /// The entry at this index started playing.
    Chord(usize),
    /// Playback finished or was cancelled.
    Done,
}

/// One playable entry of a chord sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceEntry {
    pub chord: Chord,
    pub duration_ms: u64,
    pub base_octave: i32,
}

/// Plays chords and chord sequences through the output device.
///
/// Only one playback can be active; starting a new one tears the previous
/// one down first (stop-before-start, never relying on abandoned streams
/// going away on their own).
pub struct ChordPlayer {
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ChordPlayer {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Plays a sequence of chords in order.
    ///
    /// Returns the step-event stream: `Chord(i)` when entry `i` starts,
    /// then a final `Done` when the sequence ends or is cancelled. An
    /// in-flight playback is stopped first. If the output device cannot be
    /// opened the failure is logged and the stream reports `Done` at once.
    pub fn play_sequence(&mut self, entries: Vec<SequenceEntry>) -> Receiver<PlaybackStep> {
        self.stop();

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Arc::clone(&cancel);
        let (step_tx, step_rx) = bounded::<PlaybackStep>(entries.len() + 1);

        self.worker = Some(std::thread::spawn(move || {
            let mut sink = match OutputSink::open() {
                Ok(sink) => sink,
                Err(e) => {
                    log::error!("playback output unavailable: {}", e);
                    let _ = step_tx.send(PlaybackStep::Done);
                    return;
                }
            };
            let sample_rate = sink.sample_rate();

            for (index, entry) in entries.iter().enumerate() {
                if cancel.load(Ordering::Acquire) {
                    break;
                }
                let _ = step_tx.send(PlaybackStep::Chord(index));
                let midi = entry.chord.midi_notes(entry.base_octave);
                let samples = synthesize_chord(&midi, entry.duration_ms, sample_rate);
                if !sink.write(&samples, &cancel) {
                    break;
                }
            }
            if !cancel.load(Ordering::Acquire) {
                sink.drain(&cancel);
            }
            let _ = step_tx.send(PlaybackStep::Done);
            sink.close();
        }));

        step_rx
    }

    /// Plays a single chord at reduced duration for immediate audition,
    /// preempting any in-flight playback.
    pub fn preview_chord(&mut self, chord: Chord, base_octave: i32) -> Receiver<PlaybackStep> {
        self.play_sequence(vec![SequenceEntry {
            chord,
            duration_ms: PREVIEW_DURATION_MS,
            base_octave,
        }])
    }

    /// Cancels playback and releases the output device. Idempotent;
    /// also runs on drop.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for ChordPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChordPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
