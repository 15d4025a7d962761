//! # Audio Device Module
//!
//! This module owns all CPAL (Cross-Platform Audio Library) plumbing:
//! opening the input device that feeds the analysis pipeline and the output
//! device behind the click/chord playback sink.
//!
//! ## Features
//! - Automatic device selection with mono f32 configuration
//! - Real-time input streaming over a crossbeam channel
//! - Blocking, cancellable output writes with backpressure
//! - Deterministic teardown; closing twice is safe
//!
//! A `cpal::Stream` is not `Send`, so callers construct sinks on the thread
//! that writes to them and sessions keep their input stream on the thread
//! that opened it. Only the channels cross thread boundaries.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Target sample rate for both capture and playback.
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples per input read handed to the analysis pipeline (~46 ms, 50% of
/// one analysis frame).
pub const STEP_SIZE: usize = 2048;

/// Samples buffered between a writer and the output callback. Roughly 190 ms
/// of audio; small enough that cancellation is heard promptly.
const SINK_QUEUE_CAPACITY: usize = 8192;

/// Samples written per cancellation check in [`OutputSink::write`].
const WRITE_CHUNK: usize = 1024;

/// Errors raised by the device layer.
///
/// Device initialization failures are terminal for the session that hit
/// them; the caller may retry by starting a new session. Transient read and
/// write anomalies are recovered locally and never surface here.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("no suitable stream configuration: {0}")]
    Config(String),
    #[error("audio stream error: {0}")]
    Stream(#[from] cpal::BuildStreamError),
    #[error("audio stream playback error: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Starts audio capture from the default input device.
///
/// The stream callback accumulates incoming samples and hands them to the
/// analysis thread in `STEP_SIZE` reads. Reads are dropped (not surfaced)
/// when the channel is full; the pipeline tolerates missing cycles.
///
/// # Arguments
/// * `sender` - Channel sender feeding the analysis thread
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Live input stream handle and its rate
/// * `Err(e)` - Device or configuration failure
pub fn start_input_stream(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;

    log::info!(
        "using audio input device: {}",
        device.name().unwrap_or_else(|_| "<unknown>".into())
    );

    let configs = device
        .supported_input_configs()
        .map_err(|e| AudioError::Config(e.to_string()))?
        .collect::<Vec<_>>();
    let supported = find_mono_f32_config(configs, SAMPLE_RATE)
        .ok_or_else(|| AudioError::Config("no mono f32 input format".into()))?;
    let config: cpal::StreamConfig = supported
        .with_sample_rate(cpal::SampleRate(SAMPLE_RATE))
        .into();
    let sample_rate = config.sample_rate.0;

    let err_fn = |err| log::error!("audio input stream error: {}", err);

    // Accumulates callback data until a full read is available.
    let mut pending = Vec::with_capacity(STEP_SIZE * 2);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pending.extend_from_slice(data);
            while pending.len() >= STEP_SIZE {
                let read: Vec<f32> = pending.drain(..STEP_SIZE).collect();
                // Ignore a full channel; the analysis thread will catch up.
                let _ = sender.try_send(read);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Streaming PCM output sink.
///
/// The cpal output callback drains a bounded sample queue, emitting silence
/// on underrun. Writers block on the queue, which provides natural
/// backpressure: a blocked [`write`](OutputSink::write) is the suspension
/// point at which cancellation is observed.
pub struct OutputSink {
    stream: Option<cpal::Stream>,
    queue: Sender<f32>,
    sample_rate: u32,
}

impl OutputSink {
    /// Opens the default output device with a mono f32 stream.
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let configs = device
            .supported_output_configs()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_mono_f32_config(configs, SAMPLE_RATE)
            .ok_or_else(|| AudioError::Config("no mono f32 output format".into()))?;
        let config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(SAMPLE_RATE))
            .into();
        let sample_rate = config.sample_rate.0;

        let (queue, drain): (Sender<f32>, Receiver<f32>) = bounded(SINK_QUEUE_CAPACITY);

        let err_fn = |err| log::error!("audio output stream error: {}", err);

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    // Silence on underrun keeps the device fed between writes.
                    *sample = drain.try_recv().unwrap_or(0.0);
                }
            },
            err_fn,
            None,
        )?;

        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            queue,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Writes samples to the device, blocking on backpressure.
    ///
    /// Cancellation is checked at every `WRITE_CHUNK` boundary and while
    /// blocked on a full queue. The wait is bounded by the playout budget
    /// of the write: a queue that stays full past it means the device
    /// callback stopped draining, and the write fails instead of hanging.
    ///
    /// # Returns
    /// * `true` - All samples were queued
    /// * `false` - Cancelled, timed out, or the device went away
    pub fn write(&self, samples: &[f32], cancel: &AtomicBool) -> bool {
        let deadline = Instant::now() + write_budget(samples.len(), self.sample_rate);
        for chunk in samples.chunks(WRITE_CHUNK) {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            for &sample in chunk {
                loop {
                    match self.queue.try_send(sample) {
                        Ok(()) => break,
                        Err(TrySendError::Full(_)) => {
                            if cancel.load(Ordering::Acquire) || Instant::now() >= deadline {
                                return false;
                            }
                            std::thread::sleep(Duration::from_millis(2));
                        }
                        Err(TrySendError::Disconnected(_)) => return false,
                    }
                }
            }
        }
        true
    }

    /// Blocks until the queued audio has (approximately) been played out.
    ///
    /// The queue itself empties ahead of the device; one extra callback
    /// period of slack is added so short tails are not clipped. Bounded by
    /// the playout budget of what is queued, so a dead callback ends the
    /// wait instead of spinning on a queue that never empties.
    pub fn drain(&self, cancel: &AtomicBool) {
        let deadline = Instant::now() + drain_budget(self.queue.len(), self.sample_rate);
        while !self.queue.is_empty() {
            if cancel.load(Ordering::Acquire) || Instant::now() >= deadline {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    /// Stops the device and releases it. Safe to call more than once; the
    /// sink is also closed on drop.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Pausing before drop cuts output immediately instead of letting
            // the queue play out.
            let _ = stream.pause();
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Upper bound on how long a live device takes to absorb a write of
/// `sample_count` samples on top of a full queue, with headroom.
fn write_budget(sample_count: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64((sample_count + SINK_QUEUE_CAPACITY) as f64 / sample_rate as f64) * 2
        + Duration::from_millis(250)
}

/// Upper bound on how long `queued` samples take to play out, with headroom.
fn drain_budget(queued: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(queued as f64 / sample_rate as f64) + Duration::from_millis(250)
}

/// Finds a mono f32 configuration closest to the target sample rate.
fn find_mono_f32_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            c.channels() == 1
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate().0 <= target_rate
                && c.max_sample_rate().0 >= target_rate
        })
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            min_diff.min(max_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playout_budgets_are_bounded() {
        // One second of audio on top of a full queue plays out well within
        // a few seconds; an empty queue drains in the slack alone.
        let write = write_budget(44_100, 44_100);
        assert!(write >= Duration::from_secs(2), "budget {:?}", write);
        assert!(write <= Duration::from_secs(3), "budget {:?}", write);
        assert!(drain_budget(0, 44_100) <= Duration::from_millis(300));
        assert!(drain_budget(SINK_QUEUE_CAPACITY, 44_100) <= Duration::from_secs(1));
    }
}
