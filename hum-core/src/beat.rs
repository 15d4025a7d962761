//! # Beat Scheduling Module
//!
//! The metronome: a drift-corrected periodic beat source that also triggers
//! percussive click synthesis, plus tap-tempo derivation.
//!
//! Every beat is scheduled against a fixed origin timestamp
//! (`origin + n * interval`) rather than against the previous emission, so
//! timing error never accumulates over a long session.

use crossbeam_channel::{bounded, Receiver, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::OutputSink;
use crate::{clamp_bpm, BeatEvent, MAX_BPM, MIN_BPM};

/// Accent click: 880 Hz at 0.9 amplitude for 20 ms.
const ACCENT_CLICK: (f32, f32, u64) = (880.0, 0.9, 20);
/// Normal click: 660 Hz at 0.55 amplitude for 15 ms.
const NORMAL_CLICK: (f32, f32, u64) = (660.0, 0.55, 15);

/// Renders one metronome click: a sine burst with an exponential decay that
/// reaches about 0.7% of peak by the last sample.
pub fn click_pcm(sample_rate: u32, frequency: f32, amplitude: f32, duration_ms: u64) -> Vec<f32> {
    let num_samples = (sample_rate as u64 * duration_ms / 1000) as usize;
    let two_pi_f = std::f32::consts::TAU * frequency / sample_rate as f32;
    // e^-5 at the end of the burst
    let decay_rate = 5.0 / num_samples as f32;
    (0..num_samples)
        .map(|i| {
            let envelope = (-decay_rate * i as f32).exp();
            amplitude * envelope * (two_pi_f * i as f32).sin()
        })
        .collect()
}

/// The beat grid: fixed origin plus a beat counter.
///
/// Pure scheduling arithmetic, separated from the thread that sleeps on it.
#[derive(Debug, Clone)]
pub struct BeatClock {
    origin: Instant,
    interval: Duration,
}

impl BeatClock {
    pub fn new(bpm: u32) -> Self {
        Self::with_origin(bpm, Instant::now())
    }

    pub fn with_origin(bpm: u32, origin: Instant) -> Self {
        Self {
            origin,
            interval: Duration::from_millis(60_000 / clamp_bpm(bpm) as u64),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Target timestamp of the nth beat (beat 0 fires at the origin).
    pub fn target_for(&self, n: u64) -> Instant {
        self.origin + self.interval * n as u32
    }
}

/// Handle to a running metronome. Stopping ends emissions and releases the
/// click output device; idempotent, also runs on drop.
pub struct MetronomeHandle {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MetronomeHandle {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for MetronomeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a metronome at the given tempo and meter.
///
/// A [`BeatEvent`] is emitted immediately (beat 0, accented), then once per
/// interval against the drift-corrected grid. Each emission also plays a
/// click: accented on beat 0 of a measure, normal otherwise. The stream is
/// infinite until the handle is stopped. Delivery is best-effort: a
/// receiver that falls behind loses beats rather than stalling the grid.
///
/// The click output device is opened inside the worker; if it cannot be
/// opened the failure is logged once and beats continue silently, so the
/// beat grid (which drives aggregation) survives a missing output device.
pub fn start_metronome(bpm: u32, beats_per_measure: u32) -> (MetronomeHandle, Receiver<BeatEvent>) {
    let bpm = clamp_bpm(bpm);
    let beats_per_measure = beats_per_measure.max(1);
    let (event_tx, event_rx) = bounded::<BeatEvent>(8);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_worker = Arc::clone(&stop);

    let worker = std::thread::spawn(move || {
        let mut sink = match OutputSink::open() {
            Ok(sink) => Some(sink),
            Err(e) => {
                log::error!("metronome output unavailable, ticking silently: {}", e);
                None
            }
        };
        let sample_rate = sink.as_ref().map(|s| s.sample_rate()).unwrap_or(44_100);
        let accent = click_pcm(sample_rate, ACCENT_CLICK.0, ACCENT_CLICK.1, ACCENT_CLICK.2);
        let normal = click_pcm(sample_rate, NORMAL_CLICK.0, NORMAL_CLICK.1, NORMAL_CLICK.2);

        let clock = BeatClock::new(bpm);
        let mut beat_count: u64 = 0;

        loop {
            let beat_in_measure = (beat_count % beats_per_measure as u64) as u32;
            let is_accent = beat_in_measure == 0;

            // Never block on the consumer: a stalled receiver loses beats,
            // the grid keeps ticking and stop() stays responsive.
            match event_tx.try_send(BeatEvent {
                beat_in_measure,
                accent: is_accent,
            }) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => break,
            }
            if let Some(sink) = &sink {
                let click = if is_accent { &accent } else { &normal };
                sink.write(click, &stop_worker);
            }

            beat_count += 1;
            let target = clock.target_for(beat_count);
            // Sleep in short slices so cancellation lands promptly.
            loop {
                if stop_worker.load(Ordering::Acquire) {
                    if let Some(sink) = &mut sink {
                        sink.close();
                    }
                    return;
                }
                let now = Instant::now();
                if now >= target {
                    break;
                }
                std::thread::sleep((target - now).min(Duration::from_millis(10)));
            }
        }
        if let Some(sink) = &mut sink {
            sink.close();
        }
    });

    (
        MetronomeHandle {
            stop,
            worker: Some(worker),
        },
        event_rx,
    )
}

/// Derives the tempo from tap timestamps.
///
/// Taps older than 2.5 s relative to the newest are discarded, so a long
/// pause starts a fresh measurement. With at least two surviving taps the
/// last eight (or fewer) pairwise intervals are averaged and converted to
/// BPM, clamped to the supported range.
#[derive(Debug, Default)]
pub struct TapTempo {
    taps: Vec<u64>,
}

/// Taps further apart than this reset the history.
const TAP_RESET_MS: u64 = 2500;
/// At most this many intervals contribute to the average.
const TAP_AVG_INTERVALS: usize = 8;

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tap at `now_ms` (any monotonic millisecond clock) and
    /// returns the derived BPM once two taps are available.
    pub fn tap(&mut self, now_ms: u64) -> Option<u32> {
        self.taps.retain(|&t| now_ms.saturating_sub(t) <= TAP_RESET_MS);
        self.taps.push(now_ms);
        if self.taps.len() < 2 {
            return None;
        }

        let intervals: Vec<u64> = self.taps.windows(2).map(|w| w[1] - w[0]).collect();
        let tail = &intervals[intervals.len().saturating_sub(TAP_AVG_INTERVALS)..];
        let avg = tail.iter().sum::<u64>() as f64 / tail.len() as f64;
        if avg <= 0.0 {
            return Some(MAX_BPM);
        }
        let bpm = (60_000.0 / avg).round() as i64;
        Some(bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_targets_have_no_cumulative_drift() {
        let origin = Instant::now();
        let clock = BeatClock::with_origin(120, origin);
        assert_eq!(clock.interval(), Duration::from_millis(500));
        // The Nth target is exactly origin + N * interval, for any N.
        assert_eq!(clock.target_for(1), origin + Duration::from_millis(500));
        assert_eq!(clock.target_for(1000), origin + Duration::from_millis(500_000));
    }

    #[test]
    fn clock_clamps_tempo() {
        let clock = BeatClock::new(10_000);
        assert_eq!(clock.interval(), Duration::from_millis(60_000 / 240));
    }

    #[test]
    fn click_envelope_decays_to_under_one_percent() {
        let click = click_pcm(44_100, 880.0, 0.9, 20);
        assert_eq!(click.len(), 882);
        assert!(click.iter().all(|s| s.abs() <= 0.9));
        let tail_peak = click[click.len() - 50..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 0.9 * 0.01, "tail peak {} too loud", tail_peak);
    }

    #[test]
    fn stop_returns_with_an_undrained_receiver() {
        // 240 BPM fills the 8-slot beat channel within ~2 s; the receiver is
        // held but never drained, so every later emission hits a full queue.
        let (mut handle, beats) = start_metronome(240, 4);
        std::thread::sleep(Duration::from_millis(2600));
        let begun = Instant::now();
        handle.stop();
        assert!(
            begun.elapsed() < Duration::from_secs(1),
            "stop took {:?}",
            begun.elapsed()
        );
        // Queued beats survive for a late drain.
        assert!(beats.try_iter().count() > 0);
    }

    #[test]
    fn steady_taps_give_the_expected_bpm() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap(0), None);
        assert_eq!(tap.tap(500), Some(120));
        assert_eq!(tap.tap(1000), Some(120));
        assert_eq!(tap.tap(1500), Some(120));
    }

    #[test]
    fn long_pause_resets_the_history() {
        let mut tap = TapTempo::new();
        tap.tap(0);
        tap.tap(500);
        // 3 s after the previous tap: everything older is discarded
        assert_eq!(tap.tap(3500), None);
        // Fresh sequence at 100 BPM uses only post-reset taps
        assert_eq!(tap.tap(4100), Some(100));
    }

    #[test]
    fn tap_bpm_is_clamped() {
        let mut tap = TapTempo::new();
        tap.tap(0);
        // 100 ms interval would be 600 BPM
        assert_eq!(tap.tap(100), Some(240));
        let mut slow = TapTempo::new();
        slow.tap(0);
        // 2 s interval would be 30 BPM
        assert_eq!(slow.tap(2000), Some(40));
    }

    #[test]
    fn only_the_last_eight_intervals_are_averaged() {
        let mut tap = TapTempo::new();
        let mut now = 0;
        tap.tap(now);
        // The taps-older-than-2.5s rule keeps the history short anyway, so
        // feed intervals that stay inside the window.
        for _ in 0..12 {
            now += 300;
            tap.tap(now);
        }
        assert_eq!(tap.tap(now + 300), Some(200));
    }
}
