// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The driver-facing side of the mixer.
//!
//! A platform driver pulls interleaved PCM in chunks of whatever size
//! it likes; [`DriverCallback`] bridges that to the graph's fixed
//! `buffer_size` steps with a saturating `to_mix` frame counter.

use std::sync::Arc;
use std::time::Instant;

use crate::frame::AudioFrame;
use crate::graph::AudioMixGraph;

/// Default sample rate, in Hz.
pub const DEFAULT_MIX_RATE: u32 = 44100;

/// Default frames per mix step.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Output channel layouts a driver can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerMode {
    /// Two channels.
    Stereo,
    /// Four channels (3.1).
    Surround31,
    /// Six channels (5.1).
    Surround51,
    /// Eight channels (7.1).
    Surround71,
}

impl SpeakerMode {
    /// Interleaved output channels in this mode.
    pub fn channels(&self) -> usize {
        match self {
            SpeakerMode::Stereo => 2,
            SpeakerMode::Surround31 => 4,
            SpeakerMode::Surround51 => 6,
            SpeakerMode::Surround71 => 8,
        }
    }

    /// Bus channels (stereo pairs) backing this mode.
    pub fn pairs(&self) -> usize {
        self.channels() / 2
    }
}

/// The platform audio backend, as the mixer sees it.
pub trait AudioDriver: Send + Sync {
    /// Backend name, for diagnostics.
    fn name(&self) -> &str;

    /// Sample rate the device runs at.
    fn mix_rate(&self) -> u32 {
        DEFAULT_MIX_RATE
    }

    /// Channel layout of the device.
    fn speaker_mode(&self) -> SpeakerMode {
        SpeakerMode::Stereo
    }

    /// Output latency of the device, in seconds.
    fn latency(&self) -> f64 {
        0.0
    }
}

/// A driver with no device behind it; headless runs and tests.
#[derive(Debug, Default)]
pub struct DummyDriver;

impl AudioDriver for DummyDriver {
    fn name(&self) -> &str {
        "Dummy"
    }
}

/// Converts one sample to the driver's signed 32-bit format: clamped
/// to `[-1, 1]`, scaled into 20 fractional bits, shifted into the
/// high bits to keep headroom.
pub fn sample_to_i32(sample: f32) -> i32 {
    let clamped = sample.clamp(-1.0, 1.0);
    ((clamped * ((1 << 20) - 1) as f32) as i32) << 11
}

/// Pulls frames out of the master bus on behalf of a driver.
pub struct DriverCallback {
    graph: Arc<AudioMixGraph>,
    driver: Box<dyn AudioDriver>,
    buffer_size: usize,
    /// Frames of the current chunk not yet handed to the driver.
    to_mix: usize,
    last_mix: Option<Instant>,
    scratch: Vec<AudioFrame>,
}

impl DriverCallback {
    /// Wires a graph to a driver. The graph's buffer size and channel
    /// count must match what it was built with; the driver only
    /// consumes.
    pub fn new(graph: Arc<AudioMixGraph>, driver: Box<dyn AudioDriver>) -> Self {
        let buffer_size = graph.buffer_size();
        Self {
            graph,
            driver,
            buffer_size,
            to_mix: 0,
            last_mix: None,
            scratch: vec![AudioFrame::ZERO; buffer_size],
        }
    }

    /// Sample rate of the output.
    pub fn get_mix_rate(&self) -> u32 {
        self.driver.mix_rate()
    }

    /// Channel layout of the output.
    pub fn get_speaker_mode(&self) -> SpeakerMode {
        self.driver.speaker_mode()
    }

    /// Device output latency, in seconds.
    pub fn get_output_latency(&self) -> f64 {
        self.driver.latency()
    }

    /// Seconds since the last full mix step, for sample-accurate
    /// scheduling by source generators.
    pub fn get_time_since_last_mix(&self) -> f64 {
        self.last_mix.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    /// Estimated seconds until the next mix step runs.
    pub fn get_time_to_next_mix(&self) -> f64 {
        let buffered = self.to_mix as f64 / f64::from(self.driver.mix_rate());
        (buffered - self.get_time_since_last_mix()).max(0.0)
    }

    /// Frames of the current chunk not yet consumed.
    pub fn to_mix(&self) -> usize {
        self.to_mix
    }

    /// Fills `out` with interleaved samples in the driver's format,
    /// running full mix steps as needed.
    pub fn get_frames(&mut self, out: &mut [i32]) {
        let channels = self.driver.speaker_mode().channels();
        let pairs = self.driver.speaker_mode().pairs();
        let mut frame = 0;
        let total_frames = out.len() / channels;

        while frame < total_frames {
            if self.to_mix == 0 {
                self.graph.mix_step();
                self.to_mix = self.buffer_size;
                self.last_mix = Some(Instant::now());
            }
            let take = self.to_mix.min(total_frames - frame);
            let start = self.buffer_size - self.to_mix;
            for pair in 0..pairs {
                let scratch = &mut self.scratch[..take];
                self.graph.read_master(pair, start, scratch);
                for (f, src) in scratch.iter().enumerate() {
                    let base = (frame + f) * channels + pair * 2;
                    out[base] = sample_to_i32(src.left);
                    out[base + 1] = sample_to_i32(src.right);
                }
            }
            self.to_mix -= take;
            frame += take;
        }
    }
}
