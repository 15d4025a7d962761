//! # Session Module
//!
//! Owns the wiring a frontend needs around one recording pass: the
//! metronome, the capture pipeline, and the select loop that merges their
//! event streams into the beat aggregator. There are no process-wide
//! singletons; every session is an explicit object the caller holds and
//! tears down.
//!
//! Also provides the idle-screen preview metronome, restartable with a
//! debounce so rapid tempo adjustments do not cause restart storms.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::aggregate::BeatAggregator;
use crate::audio::AudioError;
use crate::beat::{start_metronome, MetronomeHandle};
use crate::capture::CaptureSession;
use crate::segment::{build_segments, NoteSegment};
use crate::{BeatEvent, DetectionEvent, TimeSignature};

/// Delay before a debounced preview restart takes effect.
const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(400);

/// Events a recording session reports to its frontend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    /// Countdown tick before recording starts; carries beats remaining.
    Countdown(u32),
    /// A metronome beat during recording.
    Beat(BeatEvent),
    /// A smoothed pitch observation during recording.
    Detection(DetectionEvent),
}

/// One recording pass: countdown, capture, aggregation.
///
/// The session runs a countdown of two full measures during which capture
/// is gated off, then aggregates detections per beat until stopped.
pub struct RecordingSession {
    // The capture session holds the (non-Send) input stream, so the whole
    // session stays on the thread that started it.
    capture: CaptureSession,
    metronome: MetronomeHandle,
    wiring: Option<JoinHandle<()>>,
    result_rx: Receiver<Vec<Option<&'static str>>>,
    beat_duration_ms: u64,
}

impl RecordingSession {
    /// Opens the devices and starts the countdown.
    ///
    /// # Arguments
    /// * `bpm` - Tempo, clamped to the supported range
    /// * `time_signature` - Meter; the numerator sets the countdown length
    ///
    /// # Returns
    /// * `Ok((session, events))` - Running session plus its event stream
    /// * `Err(e)` - The capture device could not be opened
    pub fn start(
        bpm: u32,
        time_signature: TimeSignature,
    ) -> Result<(Self, Receiver<SessionEvent>), AudioError> {
        let bpm = crate::clamp_bpm(bpm);
        let beats_per_measure = time_signature.numerator;
        let beat_duration_ms = 60_000 / bpm as u64;

        let (capture, detect_rx) = CaptureSession::start()?;
        let (metronome, beat_rx) = start_metronome(bpm, beats_per_measure);

        let (event_tx, event_rx) = bounded::<SessionEvent>(64);
        let (result_tx, result_rx) = bounded::<Vec<Option<&'static str>>>(1);

        let wiring = std::thread::spawn(move || {
            run_session_loop(
                detect_rx,
                beat_rx,
                event_tx,
                result_tx,
                2 * beats_per_measure,
            );
        });

        Ok((
            Self {
                capture,
                metronome,
                wiring: Some(wiring),
                result_rx,
                beat_duration_ms,
            },
            event_rx,
        ))
    }

    /// Stops the session: flushes the in-progress beat, tears down the
    /// metronome and the capture device, and finalizes the segments.
    pub fn stop(mut self) -> Vec<NoteSegment> {
        // Stopping the producers disconnects both channels, which ends the
        // wiring loop and makes it flush and report the beat stream.
        self.metronome.stop();
        self.capture.stop();
        let beat_notes = self.result_rx.recv().unwrap_or_default();
        if let Some(wiring) = self.wiring.take() {
            let _ = wiring.join();
        }

        build_segments(&beat_notes, self.beat_duration_ms)
    }

    /// Length of one beat at the session tempo.
    pub fn beat_duration_ms(&self) -> u64 {
        self.beat_duration_ms
    }
}

/// Merges the detection and beat streams into the aggregator.
///
/// Runs until both producers disconnect. A beat boundary first drains the
/// detections queued before it, so boundary processing is atomic with
/// respect to the window it closes. Frontend event delivery is
/// best-effort; the loop never blocks on the session event channel, so
/// teardown cannot hang behind an undrained receiver.
fn run_session_loop(
    mut detect_rx: Receiver<DetectionEvent>,
    mut beat_rx: Receiver<BeatEvent>,
    event_tx: Sender<SessionEvent>,
    result_tx: Sender<Vec<Option<&'static str>>>,
    countdown_beats: u32,
) {
    let mut aggregator = BeatAggregator::new();
    let mut countdown = countdown_beats;
    let mut detections_open = true;
    let mut beats_open = true;

    enum Pump {
        Detect(Option<DetectionEvent>),
        Beat(Option<BeatEvent>),
    }

    let handle_detection =
        |detection: DetectionEvent, countdown: u32, aggregator: &mut BeatAggregator| {
            // Detections during the countdown are discarded; capture is not
            // yet active from the caller's point of view.
            if countdown == 0 {
                if let Some(note) = detection.note_name {
                    aggregator.on_detection(note);
                }
                // Best-effort delivery: a frontend that falls behind loses
                // events, the loop never parks on a full channel.
                let _ = event_tx.try_send(SessionEvent::Detection(detection));
            }
        };

    while beats_open || detections_open {
        let pump = crossbeam_channel::select! {
            recv(detect_rx) -> msg => Pump::Detect(msg.ok()),
            recv(beat_rx) -> msg => Pump::Beat(msg.ok()),
        };
        match pump {
            Pump::Detect(Some(detection)) => {
                handle_detection(detection, countdown, &mut aggregator);
            }
            Pump::Detect(None) => {
                detections_open = false;
                // A disconnected channel is always ready; park it so the
                // select keeps blocking on the other stream.
                detect_rx = crossbeam_channel::never();
            }
            Pump::Beat(Some(beat)) => {
                // Detections queued before this boundary belong to the
                // closing window; fold them in before the boundary runs.
                while let Ok(detection) = detect_rx.try_recv() {
                    handle_detection(detection, countdown, &mut aggregator);
                }
                if countdown > 0 {
                    countdown -= 1;
                    let _ = event_tx.try_send(SessionEvent::Countdown(countdown));
                    if countdown == 0 {
                        // Recording starts now; the first boundary only
                        // opens the aggregation window.
                        aggregator.on_beat();
                    }
                } else {
                    aggregator.on_beat();
                    let _ = event_tx.try_send(SessionEvent::Beat(beat));
                }
            }
            Pump::Beat(None) => {
                beats_open = false;
                beat_rx = crossbeam_channel::never();
            }
        }
    }

    let _ = result_tx.send(aggregator.finish());
}

enum PreviewCommand {
    Restart {
        bpm: u32,
        beats_per_measure: u32,
        debounce: bool,
    },
    Shutdown,
}

/// The idle-screen metronome.
///
/// Runs until stopped and can be restarted with new tempo/meter settings:
/// debounced (~400 ms) for slider-style adjustments, immediate for
/// tap-tempo, which must be heard on the next beat.
pub struct PreviewMetronome {
    commands: Sender<PreviewCommand>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewMetronome {
    /// Starts the preview and returns its beat stream.
    pub fn start(bpm: u32, time_signature: TimeSignature) -> (Self, Receiver<BeatEvent>) {
        let (command_tx, command_rx) = bounded::<PreviewCommand>(8);
        let (out_tx, out_rx) = bounded::<BeatEvent>(8);
        let beats_per_measure = time_signature.numerator;

        let worker = std::thread::spawn(move || {
            run_preview_loop(command_rx, out_tx, bpm, beats_per_measure);
        });

        (
            Self {
                commands: command_tx,
                worker: Some(worker),
            },
            out_rx,
        )
    }

    /// Requests a restart with new settings after the debounce window.
    /// A newer request supersedes a pending one.
    pub fn set_tempo(&self, bpm: u32, time_signature: TimeSignature) {
        let _ = self.commands.send(PreviewCommand::Restart {
            bpm,
            beats_per_measure: time_signature.numerator,
            debounce: true,
        });
    }

    /// Restarts immediately, bypassing the debounce (tap-tempo path).
    pub fn set_tempo_now(&self, bpm: u32, time_signature: TimeSignature) {
        let _ = self.commands.send(PreviewCommand::Restart {
            bpm,
            beats_per_measure: time_signature.numerator,
            debounce: false,
        });
    }

    /// Stops the preview and its clicks. Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        let _ = self.commands.send(PreviewCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PreviewMetronome {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_preview_loop(
    command_rx: Receiver<PreviewCommand>,
    out_tx: Sender<BeatEvent>,
    bpm: u32,
    beats_per_measure: u32,
) {
    let (mut handle, mut beat_rx) = start_metronome(bpm, beats_per_measure);
    let mut pending: Option<(u32, u32, Instant)> = None;

    loop {
        // Apply a matured debounced restart before waiting again.
        if let Some((bpm, beats, deadline)) = pending {
            if Instant::now() >= deadline {
                pending = None;
                handle.stop();
                let (new_handle, new_rx) = start_metronome(bpm, beats);
                handle = new_handle;
                beat_rx = new_rx;
            }
        }

        enum Action {
            Forward(BeatEvent),
            Command(PreviewCommand),
            Tick,
            Closed,
        }

        let action = crossbeam_channel::select! {
            recv(command_rx) -> msg => match msg {
                Ok(command) => Action::Command(command),
                Err(_) => Action::Closed,
            },
            recv(beat_rx) -> msg => match msg {
                Ok(beat) => Action::Forward(beat),
                Err(_) => Action::Tick,
            },
            default(Duration::from_millis(25)) => Action::Tick,
        };

        match action {
            Action::Forward(beat) => {
                let _ = out_tx.try_send(beat);
            }
            Action::Command(PreviewCommand::Restart {
                bpm,
                beats_per_measure,
                debounce,
            }) => {
                if debounce {
                    pending = Some((bpm, beats_per_measure, Instant::now() + PREVIEW_DEBOUNCE));
                } else {
                    pending = None;
                    handle.stop();
                    let (new_handle, new_rx) = start_metronome(bpm, beats_per_measure);
                    handle = new_handle;
                    beat_rx = new_rx;
                }
            }
            Action::Command(PreviewCommand::Shutdown) | Action::Closed => break,
            Action::Tick => {}
        }
    }
    handle.stop();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the session loop with hand-fed channels; no audio devices.
    /// Steps are applied in order with a settle delay so the loop observes
    /// them in the intended sequence.
    #[derive(Clone, Copy)]
    enum Step {
        Beat,
        Detect(&'static str),
    }

    fn run_loop(
        steps: Vec<Step>,
        countdown_beats: u32,
    ) -> (Vec<SessionEvent>, Vec<Option<&'static str>>) {
        let (detect_tx, detect_rx) = bounded::<DetectionEvent>(64);
        let (beat_tx, beat_rx) = bounded::<BeatEvent>(64);
        let (event_tx, event_rx) = bounded::<SessionEvent>(256);
        let (result_tx, result_rx) = bounded(1);

        let loop_thread = std::thread::spawn(move || {
            run_session_loop(detect_rx, beat_rx, event_tx, result_tx, countdown_beats);
        });

        let mut beat_count: u32 = 0;
        for step in steps {
            match step {
                Step::Beat => {
                    let _ = beat_tx.send(BeatEvent {
                        beat_in_measure: beat_count % 4,
                        accent: beat_count % 4 == 0,
                    });
                    beat_count += 1;
                    // Give the loop time to process the boundary before the
                    // next window's detections arrive.
                    std::thread::sleep(Duration::from_millis(20));
                }
                Step::Detect(note) => {
                    let _ = detect_tx.send(DetectionEvent {
                        smoothed_hz: Some(440.0),
                        note_name: Some(note),
                    });
                }
            }
        }
        std::thread::sleep(Duration::from_millis(20));
        drop(beat_tx);
        drop(detect_tx);
        let _ = loop_thread.join();

        let events: Vec<SessionEvent> = event_rx.try_iter().collect();
        (events, result_rx.recv().unwrap())
    }

    #[test]
    fn loop_finishes_with_an_undrained_event_channel() {
        let (detect_tx, detect_rx) = bounded::<DetectionEvent>(64);
        let (beat_tx, beat_rx) = bounded::<BeatEvent>(64);
        // One slot and never drained; every event past the first hits a
        // full channel.
        let (event_tx, event_rx) = bounded::<SessionEvent>(1);
        let (result_tx, result_rx) = bounded(1);

        let loop_thread = std::thread::spawn(move || {
            run_session_loop(detect_rx, beat_rx, event_tx, result_tx, 0);
        });

        for _ in 0..10 {
            let _ = beat_tx.send(BeatEvent {
                beat_in_measure: 0,
                accent: true,
            });
            for _ in 0..3 {
                let _ = detect_tx.send(DetectionEvent {
                    smoothed_hz: Some(261.6),
                    note_name: Some("C"),
                });
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(beat_tx);
        drop(detect_tx);
        let _ = loop_thread.join();

        // The loop ran to completion and reported one window per beat.
        let beats = result_rx.recv().unwrap();
        assert_eq!(beats.len(), 10);
        drop(event_rx);
    }

    #[test]
    fn countdown_gates_recording() {
        // 8 countdown beats (two 4/4 measures), nothing recorded yet.
        let (events, beats) = run_loop(vec![Step::Beat; 8], 8);
        let countdowns = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Countdown(_)))
            .count();
        assert_eq!(countdowns, 8);
        // The countdown-ending beat opens the window; stop flushes it.
        assert_eq!(beats, vec![None]);
    }

    #[test]
    fn detections_before_countdown_end_are_dropped() {
        let (_, beats) = run_loop(
            vec![Step::Detect("C"), Step::Detect("C"), Step::Beat, Step::Beat],
            4,
        );
        // Countdown never completed, nothing aggregated.
        assert!(beats.is_empty());
    }

    #[test]
    fn beats_are_aggregated_per_window() {
        let (events, beats) = run_loop(
            vec![
                Step::Beat, // ends the 1-beat countdown, opens the window
                Step::Detect("A"),
                Step::Detect("A"),
                Step::Detect("C"),
                Step::Beat, // closes the A window
                Step::Detect("E"), // lone detection, below the gate
            ],
            1,
        );
        // Stop flushes the open (E) window as one final, silent beat.
        assert_eq!(beats, vec![Some("A"), None]);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Detection(_))));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Beat(_))));
    }
}
