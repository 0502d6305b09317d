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

//! Bus effects: the plugin seam of the mix graph.
//!
//! An [`AudioEffect`] is a shared, immutable description of an effect;
//! the graph asks it to [`instantiate`](AudioEffect::instantiate) one
//! [`AudioEffectInstance`] per bus channel, and that instance owns all
//! per-channel processing state (filter history, delay lines).

use crate::frame::{db_to_linear, AudioFrame};

/// Shared description of an effect, placed in a bus's effect chain.
pub trait AudioEffect: Send + Sync {
    /// Display name of the effect.
    fn name(&self) -> &str;

    /// Creates one processing instance for a single bus channel.
    fn instantiate(&self, mix_rate: u32) -> Box<dyn AudioEffectInstance>;
}

/// Per-channel processing state of an [`AudioEffect`].
pub trait AudioEffectInstance: Send {
    /// Transforms `src` into `dst`; both slices hold exactly one mix
    /// chunk and are the same length.
    fn process(&mut self, src: &[AudioFrame], dst: &mut [AudioFrame]);

    /// True when the instance must keep running on inactive channels,
    /// for effects that carry a tail (delays, reverbs) and need to
    /// drain it through silence.
    fn process_silence(&self) -> bool {
        false
    }
}

/// Flat gain stage.
#[derive(Debug, Clone, Copy)]
pub struct GainEffect {
    /// Gain applied to every sample, in decibels.
    pub volume_db: f32,
}

impl GainEffect {
    /// A gain effect applying `volume_db`.
    pub fn new(volume_db: f32) -> Self {
        Self { volume_db }
    }
}

impl AudioEffect for GainEffect {
    fn name(&self) -> &str {
        "Gain"
    }

    fn instantiate(&self, _mix_rate: u32) -> Box<dyn AudioEffectInstance> {
        Box::new(GainInstance {
            gain: db_to_linear(self.volume_db),
        })
    }
}

struct GainInstance {
    gain: f32,
}

impl AudioEffectInstance for GainInstance {
    fn process(&mut self, src: &[AudioFrame], dst: &mut [AudioFrame]) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d = *s * self.gain;
        }
    }
}

/// Single-tap feedback delay.
#[derive(Debug, Clone, Copy)]
pub struct DelayEffect {
    /// Tap delay in milliseconds.
    pub delay_ms: f32,
    /// Level fed back into the line, in decibels.
    pub feedback_db: f32,
}

impl DelayEffect {
    /// A delay of `delay_ms` with `feedback_db` of feedback.
    pub fn new(delay_ms: f32, feedback_db: f32) -> Self {
        Self {
            delay_ms,
            feedback_db,
        }
    }
}

impl AudioEffect for DelayEffect {
    fn name(&self) -> &str {
        "Delay"
    }

    fn instantiate(&self, mix_rate: u32) -> Box<dyn AudioEffectInstance> {
        let frames = ((self.delay_ms * mix_rate as f32) / 1000.0) as usize;
        Box::new(DelayInstance {
            line: vec![AudioFrame::ZERO; frames.max(1)],
            cursor: 0,
            feedback: db_to_linear(self.feedback_db),
        })
    }
}

struct DelayInstance {
    line: Vec<AudioFrame>,
    cursor: usize,
    feedback: f32,
}

impl AudioEffectInstance for DelayInstance {
    fn process(&mut self, src: &[AudioFrame], dst: &mut [AudioFrame]) {
        for (d, s) in dst.iter_mut().zip(src) {
            let delayed = self.line[self.cursor];
            *d = *s + delayed;
            self.line[self.cursor] = *s + delayed * self.feedback;
            self.cursor = (self.cursor + 1) % self.line.len();
        }
    }

    fn process_silence(&self) -> bool {
        true
    }
}
