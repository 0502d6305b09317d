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

//! Bus state: channels, effect chain, routing and level attributes.

use std::sync::Arc;

use crate::effect::{AudioEffect, AudioEffectInstance};
use crate::frame::AudioFrame;

/// One mix channel of a bus (a stereo pair in the speaker layout).
pub(crate) struct BusChannel {
    /// The channel's frame buffer for the current step.
    pub buffer: Vec<AudioFrame>,
    /// Written this step, either by a mix callback or by a send.
    pub used: bool,
    /// Carries (or recently carried) signal; inactive channels skip
    /// effect processing.
    pub active: bool,
    /// Absolute peak of the last step, post volume.
    pub peak: AudioFrame,
    /// Frame counter value the last time this channel crossed the
    /// disable threshold.
    pub last_mix_with_audio: u64,
}

impl BusChannel {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer: vec![AudioFrame::ZERO; buffer_size],
            used: false,
            active: false,
            peak: AudioFrame::ZERO,
            last_mix_with_audio: 0,
        }
    }
}

/// An effect chain entry: the shared effect plus one instance per
/// channel.
pub(crate) struct EffectSlot {
    pub effect: Arc<dyn AudioEffect>,
    pub enabled: bool,
    pub instances: Vec<Box<dyn AudioEffectInstance>>,
}

/// A named routing node of the mix graph.
pub(crate) struct Bus {
    pub name: String,
    pub volume_db: f32,
    /// Name of the send target; `None` routes to master.
    pub send: Option<String>,
    pub solo: bool,
    pub mute: bool,
    pub bypass: bool,
    /// Resolved each step: some bus on this bus's send path has solo.
    pub soloed: bool,
    pub effects: Vec<EffectSlot>,
    pub channels: Vec<BusChannel>,
}

impl Bus {
    pub fn new(name: impl Into<String>, channel_count: usize, buffer_size: usize) -> Self {
        Self {
            name: name.into(),
            volume_db: 0.0,
            send: None,
            solo: false,
            mute: false,
            bypass: false,
            soloed: false,
            effects: Vec::new(),
            channels: (0..channel_count)
                .map(|_| BusChannel::new(buffer_size))
                .collect(),
        }
    }
}
