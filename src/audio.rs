//! Acoustic device I/O (component B, device half).
//!
//! Grounded in the teacher's `build_input_stream`/`build_output_stream`: a
//! cpal callback copies samples out of (or into) a lock-free channel rather
//! than blocking the audio thread. Mono `f32` samples are used throughout —
//! the modem (`modem.rs`) only ever sees a single channel, downmixed here,
//! since the acoustic transport is inherently single-channel.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Enumerate available input and output devices.
pub fn list_devices() -> Result<(Vec<Device>, Vec<Device>)> {
    let host = cpal::default_host();
    let inputs: Vec<_> = host.input_devices().context("input_devices")?.collect();
    let outputs: Vec<_> = host.output_devices().context("output_devices")?.collect();
    Ok((inputs, outputs))
}

/// Best-effort device name (fallback to "<unknown>").
pub fn device_name(dev: &Device) -> String {
    dev.name().unwrap_or_else(|_| "<unknown>".into())
}

/// A running microphone capture. Every callback downmixes to mono `f32` and
/// pushes one `Vec<f32>` onto `samples`; the modem drains it with
/// [`Mic::drain`] rather than waiting per-frame.
pub struct Mic {
    _stream: cpal::Stream,
    pub params: AudioParams,
    samples: Receiver<Vec<f32>>,
    running: Arc<AtomicBool>,
}

impl Mic {
    pub fn start(dev: &Device) -> Result<Self> {
        let cfg = dev.default_input_config()?;
        let sample_format = cfg.sample_format();
        let config: StreamConfig = cfg.clone().into();
        let params = AudioParams { sample_rate: config.sample_rate.0, channels: config.channels };
        let channels = config.channels as usize;

        let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = crossbeam_channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let running_cb = running.clone();

        let err_fn = |e| eprintln!("[AUDIO][ERR] input stream: {e}");

        let stream = match sample_format {
            SampleFormat::F32 => dev.build_input_stream(
                &config,
                move |data: &[f32], _| downmix_push(data, channels, &tx, &running_cb),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => dev.build_input_stream(
                &config,
                move |data: &[i16], _| {
                    let floats: Vec<f32> = data.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                    downmix_push(&floats, channels, &tx, &running_cb)
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => dev.build_input_stream(
                &config,
                move |data: &[u16], _| {
                    let floats: Vec<f32> = data
                        .iter()
                        .map(|s| (*s as f32 - u16::MAX as f32 / 2.0) / (u16::MAX as f32 / 2.0))
                        .collect();
                    downmix_push(&floats, channels, &tx, &running_cb)
                },
                err_fn,
                None,
            )?,
            other => anyhow::bail!("unsupported input sample format {other:?}"),
        };

        stream.play()?;
        Ok(Self { _stream: stream, params, samples: rx, running })
    }

    /// Drains every buffered chunk captured so far, in order, without blocking.
    pub fn drain(&self) -> Vec<f32> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.samples.try_recv() {
            out.extend(chunk);
        }
        out
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn downmix_push(data: &[f32], channels: usize, tx: &Sender<Vec<f32>>, running: &Arc<AtomicBool>) {
    if !running.load(Ordering::Relaxed) {
        return;
    }
    let mono: Vec<f32> = if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    let _ = tx.send(mono);
}

/// A running speaker output. [`Speaker::play`] blocks until the given
/// samples have been fully consumed by the callback, giving the modem a
/// synchronous "speak this chunk" primitive (the prototype's
/// `SoundBatchSync`).
pub struct Speaker {
    _stream: cpal::Stream,
    pub params: AudioParams,
    queue: Arc<parking_lot::Mutex<std::collections::VecDeque<f32>>>,
    drained: Arc<parking_lot::Condvar>,
}

impl Speaker {
    pub fn start(dev: &Device) -> Result<Self> {
        let cfg = dev.default_output_config()?;
        let config: StreamConfig = cfg.clone().into();
        let params = AudioParams { sample_rate: config.sample_rate.0, channels: config.channels };
        let channels = config.channels as usize;

        let queue = Arc::new(parking_lot::Mutex::new(std::collections::VecDeque::<f32>::new()));
        let drained = Arc::new(parking_lot::Condvar::new());
        let queue_cb = queue.clone();
        let drained_cb = drained.clone();

        let stream = dev.build_output_stream(
            &config,
            move |out: &mut [f32], _| {
                let mut q = queue_cb.lock();
                for frame in out.chunks_mut(channels) {
                    let sample = q.pop_front().unwrap_or(0.0);
                    for s in frame {
                        *s = sample;
                    }
                }
                if q.is_empty() {
                    drained_cb.notify_all();
                }
            },
            move |err| eprintln!("[AUDIO][ERR] output stream: {err}"),
            None,
        )?;
        stream.play()?;
        Ok(Self { _stream: stream, params, queue, drained })
    }

    /// Enqueues `samples` and blocks until the output callback has consumed
    /// them all.
    pub fn play(&self, samples: &[f32]) {
        {
            let mut q = self.queue.lock();
            q.extend(samples.iter().copied());
        }
        let mut q = self.queue.lock();
        while !q.is_empty() {
            self.drained.wait(&mut q);
        }
    }
}
