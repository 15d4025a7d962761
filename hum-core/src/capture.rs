//! # Capture Pipeline Module
//!
//! Slices the live input stream into overlapping analysis frames, runs the
//! pitch detector on each, and smooths the raw estimates with a median
//! filter plus a stability gate before emitting [`DetectionEvent`]s.
//!
//! ## Pipeline
//! - Circular buffer of `ANALYSIS_FRAME_SIZE` samples (~100 ms) fed by
//!   `STEP_SIZE` reads (50% overlap)
//! - One YIN pass per full frame
//! - Rolling history of `MEDIAN_WINDOW` raw estimates; the median of the
//!   positive ones is emitted once at least `MIN_STABLE_COUNT` are present
//!
//! The stability gate suppresses single-frame glitches at ~320 ms of added
//! tolerance without noticeable latency on sustained notes.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::{self, AudioError};
use crate::pitch::PitchDetector;
use crate::tuning;
use crate::DetectionEvent;

/// Samples per analysis frame (~100 ms at 44.1 kHz).
pub const ANALYSIS_FRAME_SIZE: usize = 4096;
/// Raw estimates held for median smoothing (~320 ms).
pub const MEDIAN_WINDOW: usize = 7;
/// Positive estimates required in the window before a pitch counts as stable.
pub const MIN_STABLE_COUNT: usize = 5;

/// Median filter with a stability gate over raw per-frame pitch estimates.
///
/// Raw estimates are pushed as `Some(hz)` or `None` (no detection). The
/// smoother keeps the last [`MEDIAN_WINDOW`] of them and reports the median
/// of the positive ones once [`MIN_STABLE_COUNT`] are present.
#[derive(Debug)]
pub struct MedianSmoother {
    history: VecDeque<Option<f32>>,
    window: usize,
    min_stable: usize,
}

impl MedianSmoother {
    pub fn new() -> Self {
        Self::with_params(MEDIAN_WINDOW, MIN_STABLE_COUNT)
    }

    pub fn with_params(window: usize, min_stable: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(window + 1),
            window,
            min_stable,
        }
    }

    /// Pushes one raw estimate and returns the smoothed frequency, if the
    /// window is stable.
    pub fn push(&mut self, raw: Option<f32>) -> Option<f32> {
        self.history.push_back(raw);
        if self.history.len() > self.window {
            self.history.pop_front();
        }

        let mut positives: Vec<f32> = self.history.iter().flatten().copied().collect();
        if positives.len() < self.min_stable {
            return None;
        }
        positives.sort_by(|a, b| a.total_cmp(b));
        Some(positives[positives.len() / 2])
    }

    /// Clears the rolling history.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for MedianSmoother {
    fn default() -> Self {
        Self::new()
    }
}

/// A running capture pipeline: input stream, analysis thread, and the
/// detection-event channel handed to the caller.
///
/// Stopping (or dropping) the session halts input reads and releases the
/// capture device deterministically, bounded by one pending read timeout.
pub struct CaptureSession {
    // Keeps the device open; dropping it stops the callback and
    // disconnects the frame channel. Not Send, so the session stays on the
    // thread that started it.
    stream: Option<cpal::Stream>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Opens the input device and starts the analysis thread.
    ///
    /// # Returns
    /// * `Ok((session, events))` - Running session plus the event stream
    /// * `Err(e)` - Capture device could not be opened; terminal for this
    ///   session, a caller may retry with a new one
    pub fn start() -> Result<(Self, Receiver<DetectionEvent>), AudioError> {
        // A couple of reads of headroom; the callback drops on overflow.
        let (frame_tx, frame_rx) = bounded::<Vec<f32>>(8);
        let (stream, sample_rate) = audio::start_input_stream(frame_tx)?;

        let (event_tx, event_rx) = bounded::<DetectionEvent>(64);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_worker = Arc::clone(&stop);

        let worker = std::thread::spawn(move || {
            let detector = PitchDetector::new(sample_rate);
            let mut smoother = MedianSmoother::new();
            let mut ring = vec![0.0f32; ANALYSIS_FRAME_SIZE];
            let mut fill_index: usize = 0;

            loop {
                let read = match frame_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(read) => read,
                    Err(RecvTimeoutError::Timeout) => {
                        if stop_worker.load(Ordering::Acquire) {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                if stop_worker.load(Ordering::Acquire) {
                    break;
                }
                // Short reads are a transient anomaly; skip the cycle.
                if read.is_empty() {
                    continue;
                }

                for &sample in &read {
                    ring[fill_index % ANALYSIS_FRAME_SIZE] = sample;
                    fill_index += 1;
                }
                if fill_index < ANALYSIS_FRAME_SIZE {
                    continue;
                }

                // Unroll the ring so the frame is in chronological order.
                let start = fill_index % ANALYSIS_FRAME_SIZE;
                let mut frame = Vec::with_capacity(ANALYSIS_FRAME_SIZE);
                frame.extend_from_slice(&ring[start..]);
                frame.extend_from_slice(&ring[..start]);

                let raw = detector.detect(&frame);
                let smoothed = smoother.push(raw);
                let event = DetectionEvent {
                    smoothed_hz: smoothed,
                    note_name: smoothed.and_then(tuning::frequency_to_note_name),
                };
                // Never block on the consumer: a receiver that falls behind
                // loses detections, and stop() stays responsive.
                match event_tx.try_send(event) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        });

        Ok((
            Self {
                stream: Some(stream),
                stop,
                worker: Some(worker),
            },
            event_rx,
        ))
    }

    /// Stops the device and joins the analysis thread. Idempotent; also
    /// invoked on drop.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Dropping the stream stops the device and disconnects the frame
        // channel, which unblocks the worker.
        self.stream.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
