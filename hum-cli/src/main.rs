//! # hum-cli
//!
//! Thin terminal frontend for the hum-to-chords core. It stands in for the
//! presentation layer: it drives recording sessions, prints the event
//! streams, and plays back suggested chord progressions.
//!
//! ## Architecture
//! - **Main thread**: command handling and event printing
//! - **Core threads**: capture, metronome and playback run inside hum-core
//! - **Communication**: crossbeam channels, drained here

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::io::BufRead;
use std::time::{Duration, Instant};

use hum_core::beat::TapTempo;
use hum_core::chord::{Chord, ChordType};
use hum_core::segment::{playable_entries, NoteSegment};
use hum_core::session::{PreviewMetronome, RecordingSession, SessionEvent};
use hum_core::synth::{ChordPlayer, PlaybackStep, SequenceEntry, CHORD_DURATION_MS};
use hum_core::{clamp_bpm, TimeSignature};

#[derive(Parser)]
#[command(name = "hum", about = "Hum a melody, get chords back", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the preview metronome for a while
    Metronome {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        /// Time signature, e.g. 4/4 or 3/4
        #[arg(long, default_value = "4/4")]
        meter: String,
        /// How long to run, in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Record a hummed melody and print the suggested chords
    Record {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        #[arg(long, default_value = "4/4")]
        meter: String,
        /// Recording length after the countdown, in seconds
        #[arg(long, default_value_t = 12)]
        seconds: u64,
        /// Play the default chord progression after recording
        #[arg(long)]
        play: bool,
    },
    /// Play a chord progression, e.g. "C Am F G7"
    Play {
        chords: Vec<String>,
        /// Milliseconds per chord
        #[arg(long, default_value_t = CHORD_DURATION_MS)]
        duration_ms: u64,
        /// Base octave for every chord
        #[arg(long, default_value_t = 3)]
        octave: i32,
    },
    /// Derive the tempo from taps: press Enter on each beat
    Tap,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Metronome { bpm, meter, seconds } => run_metronome(bpm, &meter, seconds),
        Command::Record {
            bpm,
            meter,
            seconds,
            play,
        } => run_record(bpm, &meter, seconds, play),
        Command::Play {
            chords,
            duration_ms,
            octave,
        } => run_play(&chords, duration_ms, octave),
        Command::Tap => run_tap(),
    }
}

fn parse_meter(meter: &str) -> Result<TimeSignature> {
    let (num, den) = meter
        .split_once('/')
        .ok_or_else(|| anyhow!("meter must look like 4/4"))?;
    Ok(TimeSignature::new(num.trim().parse()?, den.trim().parse()?))
}

/// Parses a chord name like "C", "Am", "F#m7" or "Gsus4".
fn parse_chord(name: &str) -> Result<Chord> {
    let root_len = if name.len() >= 2 && name.as_bytes()[1] == b'#' {
        2
    } else {
        1
    };
    let (root, suffix) = name.split_at(root_len.min(name.len()));
    let chord_type = match suffix {
        "" => ChordType::Major,
        "m" => ChordType::Minor,
        "M7" | "maj7" => ChordType::Major7,
        "m7" => ChordType::Minor7,
        "7" => ChordType::Dominant7,
        "sus4" => ChordType::Sus4,
        "add9" => ChordType::Add9,
        "dim" => ChordType::Dim,
        "aug" => ChordType::Aug,
        "sus2" => ChordType::Sus2,
        other => return Err(anyhow!("unknown chord suffix '{}' in '{}'", other, name)),
    };
    hum_core::tuning::semitone_of(root)
        .map(|pc| Chord::new(pc, chord_type))
        .ok_or_else(|| anyhow!("unknown root note '{}'", root))
}

fn run_metronome(bpm: u32, meter: &str, seconds: u64) -> Result<()> {
    let ts = parse_meter(meter)?;
    let bpm = clamp_bpm(bpm);
    println!("metronome: {} bpm, {} - running for {}s", bpm, ts, seconds);

    let (mut preview, beats) = PreviewMetronome::start(bpm, ts);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        match beats.recv_timeout(Duration::from_millis(100)) {
            Ok(beat) => {
                let mark = if beat.accent { "*" } else { " " };
                println!("{} beat {}", mark, beat.beat_in_measure + 1);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    preview.stop();
    Ok(())
}

fn run_record(bpm: u32, meter: &str, seconds: u64, play: bool) -> Result<()> {
    let ts = parse_meter(meter)?;
    let bpm = clamp_bpm(bpm);
    println!(
        "recording: {} bpm, {} - {} countdown beats, then {}s of humming",
        bpm,
        ts,
        2 * ts.numerator,
        seconds
    );

    let (session, events) = RecordingSession::start(bpm, ts)?;
    let countdown_beats = 2 * ts.numerator as u64;
    let beat_ms = session.beat_duration_ms();
    log::debug!("beat duration {} ms", beat_ms);
    let deadline =
        Instant::now() + Duration::from_millis(countdown_beats * beat_ms) + Duration::from_secs(seconds);

    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(SessionEvent::Countdown(remaining)) => {
                println!("countdown: {}", remaining);
            }
            Ok(SessionEvent::Beat(beat)) => {
                let mark = if beat.accent { "*" } else { " " };
                println!("{} beat {}", mark, beat.beat_in_measure + 1);
            }
            Ok(SessionEvent::Detection(detection)) => {
                if let (Some(hz), Some(name)) = (detection.smoothed_hz, detection.note_name) {
                    println!("    {:>2} ({:.1} Hz)", name, hz);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let segments = session.stop();
    print_segments(&segments);

    if play && !segments.is_empty() {
        play_entries(playable_entries(&segments))?;
    }
    Ok(())
}

fn print_segments(segments: &[NoteSegment]) {
    if segments.is_empty() {
        println!("no stable notes detected");
        return;
    }
    println!("segments:");
    for (i, segment) in segments.iter().enumerate() {
        let suggestions: Vec<String> = segment
            .suggested_chords
            .iter()
            .take(4)
            .map(|c| c.display_name())
            .collect();
        println!(
            "  {}: {} x{} ({} ms) -> {}",
            i,
            segment.note_name,
            segment.beat_count,
            segment.duration_ms,
            suggestions.join(", ")
        );
    }
}

fn run_play(names: &[String], duration_ms: u64, octave: i32) -> Result<()> {
    if names.is_empty() {
        return Err(anyhow!("no chords given"));
    }
    let entries: Vec<(usize, SequenceEntry)> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            parse_chord(name).map(|chord| {
                (
                    i,
                    SequenceEntry {
                        chord,
                        duration_ms,
                        base_octave: octave,
                    },
                )
            })
        })
        .collect::<Result<_>>()?;
    play_entries(entries)
}

/// Plays the entries and mirrors playback position onto stdout. Entry
/// indices are the original segment indices, so skipped segments keep
/// their numbering.
fn play_entries(entries: Vec<(usize, SequenceEntry)>) -> Result<()> {
    if entries.is_empty() {
        println!("nothing playable");
        return Ok(());
    }
    let indices: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();
    let sequence: Vec<SequenceEntry> = entries.into_iter().map(|(_, e)| e).collect();

    let mut player = ChordPlayer::new();
    let steps = player.play_sequence(sequence.clone());
    for step in steps.iter() {
        match step {
            PlaybackStep::Chord(i) => {
                println!(
                    "playing {} ({})",
                    sequence[i].chord.display_name(),
                    indices[i]
                );
            }
            PlaybackStep::Done => println!("done"),
        }
    }
    player.stop();
    Ok(())
}

fn run_tap() -> Result<()> {
    println!("press Enter on each beat (q + Enter to quit)");
    let mut tap = TapTempo::new();
    let origin = Instant::now();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim() == "q" {
            break;
        }
        let now_ms = origin.elapsed().as_millis() as u64;
        match tap.tap(now_ms) {
            Some(bpm) => println!("{} bpm", bpm),
            None => println!("..."),
        }
    }
    Ok(())
}
