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

//! The bus mix graph.
//!
//! Buses form a DAG rooted at the master bus (index 0): every send
//! edge points at a lower-index bus, and a mix step walks buses in
//! descending index order so each send completes before its target is
//! processed. A send naming a missing bus, or one whose index is not
//! below the sender's, routes to master instead.
//!
//! All graph access — mutation from any thread and the per-step mix
//! driven by the driver thread — goes through one lock.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use vesper_core::{EngineError, Res, Resource, Variant};

use crate::bus::{Bus, BusChannel, EffectSlot};
use crate::effect::AudioEffect;
use crate::frame::{db_to_linear, peak_to_db, AudioFrame};

/// Default peak threshold below which a channel counts as silent.
pub const DEFAULT_CHANNEL_DISABLE_THRESHOLD_DB: f32 = -60.0;

/// Default time a channel stays below the threshold before it is
/// deactivated, in seconds.
pub const DEFAULT_CHANNEL_DISABLE_TIME: f32 = 2.0;

/// A source-generator hook invoked at the start of every mix step,
/// before any bus is processed. Receives a writer for bus input
/// buffers and the chunk length in frames.
pub type MixCallback = Box<dyn FnMut(&mut BusWriter<'_>, usize) + Send>;

/// A hook invoked after every mix step completes.
pub type UpdateCallback = Box<dyn FnMut() + Send>;

struct GraphState {
    buses: Vec<Bus>,
    bus_map: AHashMap<String, usize>,
    channel_count: usize,
    buffer_size: usize,
    mix_rate: u32,
    channel_disable_threshold_db: f32,
    channel_disable_frames: u64,
    /// Total frames mixed since creation.
    mix_frames: u64,
    /// Scratch buffer for the effect src/dst swap.
    temp: Vec<AudioFrame>,
    mix_callbacks: Vec<MixCallback>,
    update_callbacks: Vec<UpdateCallback>,
}

/// Write access to bus input buffers, handed to mix callbacks.
pub struct BusWriter<'a> {
    state: &'a mut GraphState,
}

impl BusWriter<'_> {
    /// Index of the named bus, if it exists.
    pub fn bus_index(&self, name: &str) -> Option<usize> {
        self.state.bus_map.get(name).copied()
    }

    /// The input buffer of one bus channel for this step. Marks the
    /// channel used and active; the first touch each step zero-fills
    /// the buffer.
    pub fn channel_mix_buffer(&mut self, bus: usize, channel: usize) -> Option<&mut [AudioFrame]> {
        let ch = self.state.buses.get_mut(bus)?.channels.get_mut(channel)?;
        touch(ch);
        Some(&mut ch.buffer)
    }
}

fn touch(ch: &mut BusChannel) {
    if !ch.used {
        ch.buffer.fill(AudioFrame::ZERO);
        ch.used = true;
        ch.active = true;
    }
}

/// A plain-value snapshot of the bus configuration.
///
/// Effect chains are captured as per-slot enablement only; the effect
/// objects themselves are rebuilt by the application after an import.
#[derive(Debug, Clone, PartialEq)]
pub struct BusLayout {
    /// One entry per bus, master first.
    pub buses: Vec<BusLayoutEntry>,
}

/// One bus in a [`BusLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct BusLayoutEntry {
    /// Bus name.
    pub name: String,
    /// Send target name; `None` routes to master.
    pub send: Option<String>,
    /// Volume in decibels.
    pub volume_db: f32,
    /// Solo flag.
    pub solo: bool,
    /// Mute flag.
    pub mute: bool,
    /// Bypass flag.
    pub bypass: bool,
    /// Enablement of each effect slot, in chain order.
    pub effects_enabled: Vec<bool>,
}

impl BusLayout {
    /// Packs the layout into a property-bearing resource so it can
    /// travel through the serialization engine.
    pub fn to_resource(&self) -> Res {
        let res = Resource::new("AudioBusLayout");
        res.set_property("bus_count", Variant::Int(self.buses.len() as i64));
        for (i, bus) in self.buses.iter().enumerate() {
            res.set_property(format!("bus/{i}/name"), Variant::String(bus.name.clone()));
            res.set_property(
                format!("bus/{i}/send"),
                Variant::String(bus.send.clone().unwrap_or_default()),
            );
            res.set_property(
                format!("bus/{i}/volume_db"),
                Variant::Float(f64::from(bus.volume_db)),
            );
            res.set_property(format!("bus/{i}/solo"), Variant::Bool(bus.solo));
            res.set_property(format!("bus/{i}/mute"), Variant::Bool(bus.mute));
            res.set_property(format!("bus/{i}/bypass"), Variant::Bool(bus.bypass));
            res.set_property(
                format!("bus/{i}/effect_count"),
                Variant::Int(bus.effects_enabled.len() as i64),
            );
            for (j, enabled) in bus.effects_enabled.iter().enumerate() {
                res.set_property(format!("bus/{i}/effect/{j}/enabled"), Variant::Bool(*enabled));
            }
        }
        res
    }

    /// Rebuilds a layout from a resource written by
    /// [`to_resource`](Self::to_resource).
    pub fn from_resource(res: &Resource) -> Result<Self, EngineError> {
        let bus_count = match res.get_property("bus_count") {
            Some(Variant::Int(n)) if n >= 1 => n as usize,
            _ => {
                return Err(EngineError::InvalidArgument(
                    "bus layout resource has no valid 'bus_count'".into(),
                ))
            }
        };
        let mut buses = Vec::with_capacity(bus_count);
        for i in 0..bus_count {
            let get = |suffix: &str| res.get_property(&format!("bus/{i}/{suffix}"));
            let name = match get("name") {
                Some(Variant::String(s)) => s,
                _ => {
                    return Err(EngineError::InvalidArgument(format!(
                        "bus layout entry {i} has no name"
                    )))
                }
            };
            let send = match get("send") {
                Some(Variant::String(s)) if !s.is_empty() => Some(s),
                _ => None,
            };
            let volume_db = match get("volume_db") {
                Some(Variant::Float(v)) => v as f32,
                _ => 0.0,
            };
            let flag = |suffix: &str| matches!(get(suffix), Some(Variant::Bool(true)));
            let effect_count = match get("effect_count") {
                Some(Variant::Int(n)) if n >= 0 => n as usize,
                _ => 0,
            };
            let effects_enabled = (0..effect_count)
                .map(|j| {
                    matches!(
                        res.get_property(&format!("bus/{i}/effect/{j}/enabled")),
                        Some(Variant::Bool(true))
                    )
                })
                .collect();
            buses.push(BusLayoutEntry {
                name,
                send,
                volume_db,
                solo: flag("solo"),
                mute: flag("mute"),
                bypass: flag("bypass"),
                effects_enabled,
            });
        }
        Ok(BusLayout { buses })
    }
}

/// The mix graph: the bus map plus the per-step mixer.
pub struct AudioMixGraph {
    state: Mutex<GraphState>,
}

impl AudioMixGraph {
    /// A graph with one master bus.
    ///
    /// `channel_count` is the number of stereo pairs in the output
    /// layout, `buffer_size` the frames produced per mix step.
    pub fn new(channel_count: usize, buffer_size: usize, mix_rate: u32) -> Self {
        let master = Bus::new("Master", channel_count, buffer_size);
        let mut bus_map = AHashMap::new();
        bus_map.insert("Master".to_owned(), 0);
        Self {
            state: Mutex::new(GraphState {
                buses: vec![master],
                bus_map,
                channel_count,
                buffer_size,
                mix_rate,
                channel_disable_threshold_db: DEFAULT_CHANNEL_DISABLE_THRESHOLD_DB,
                channel_disable_frames: (DEFAULT_CHANNEL_DISABLE_TIME * mix_rate as f32) as u64,
                mix_frames: 0,
                temp: vec![AudioFrame::ZERO; buffer_size],
                mix_callbacks: Vec::new(),
                update_callbacks: Vec::new(),
            }),
        }
    }

    /// Frames produced per mix step.
    pub fn buffer_size(&self) -> usize {
        self.state.lock().unwrap().buffer_size
    }

    /// Sample rate the graph mixes at.
    pub fn mix_rate(&self) -> u32 {
        self.state.lock().unwrap().mix_rate
    }

    /// Stereo pairs per bus.
    pub fn channel_count(&self) -> usize {
        self.state.lock().unwrap().channel_count
    }

    /// Number of buses, master included.
    pub fn bus_count(&self) -> usize {
        self.state.lock().unwrap().buses.len()
    }

    /// Appends a bus with a generated unique name and returns the name.
    pub fn add_bus(&self) -> String {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let name = unique_name(&state.buses, "New Bus");
        let bus = Bus::new(name.clone(), state.channel_count, state.buffer_size);
        state.bus_map.insert(name.clone(), state.buses.len());
        state.buses.push(bus);
        name
    }

    /// Removes a bus. The master bus cannot be removed.
    pub fn remove_bus(&self, index: usize) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if index == 0 {
            return Err(EngineError::InvalidArgument(
                "the master bus cannot be removed".into(),
            ));
        }
        if index >= state.buses.len() {
            return Err(EngineError::InvalidArgument(format!(
                "bus index {index} out of range"
            )));
        }
        state.buses.remove(index);
        rebuild_map(state);
        Ok(())
    }

    /// Moves a bus to a new index. The master bus stays at index 0.
    pub fn move_bus(&self, from: usize, to: usize) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if from == 0 || to == 0 {
            return Err(EngineError::InvalidArgument(
                "the master bus cannot be moved".into(),
            ));
        }
        if from >= state.buses.len() || to >= state.buses.len() {
            return Err(EngineError::InvalidArgument(format!(
                "bus move {from} -> {to} out of range"
            )));
        }
        let bus = state.buses.remove(from);
        state.buses.insert(to, bus);
        rebuild_map(state);
        Ok(())
    }

    /// Grows or shrinks the bus list; new buses get generated names.
    pub fn set_bus_count(&self, count: usize) -> Result<(), EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidArgument(
                "a graph keeps at least the master bus".into(),
            ));
        }
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        while state.buses.len() > count {
            state.buses.pop();
        }
        while state.buses.len() < count {
            let name = unique_name(&state.buses, "New Bus");
            let bus = Bus::new(name, state.channel_count, state.buffer_size);
            state.buses.push(bus);
        }
        rebuild_map(state);
        Ok(())
    }

    /// Name of the bus at `index`.
    pub fn bus_name(&self, index: usize) -> Result<String, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(checked_bus(&state.buses, index)?.name.clone())
    }

    /// Index of the named bus, if present.
    pub fn bus_index(&self, name: &str) -> Option<usize> {
        self.state.lock().unwrap().bus_map.get(name).copied()
    }

    /// Renames a bus; the name is made unique if taken. Returns the
    /// name actually assigned.
    pub fn set_bus_name(&self, index: usize, name: &str) -> Result<String, EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if index == 0 {
            return Err(EngineError::InvalidArgument(
                "the master bus keeps its name".into(),
            ));
        }
        checked_bus(&state.buses, index)?;
        let unique = if state.buses[index].name == name {
            name.to_owned()
        } else {
            unique_name(&state.buses, name)
        };
        state.buses[index].name = unique.clone();
        rebuild_map(state);
        Ok(unique)
    }

    /// Sets the send target by name; `None` routes to master. The
    /// target is validated at mix time, not here.
    pub fn set_bus_send(&self, index: usize, send: Option<&str>) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if index == 0 {
            return Err(EngineError::InvalidArgument(
                "the master bus has no send".into(),
            ));
        }
        checked_bus_mut(&mut state.buses, index)?.send = send.map(str::to_owned);
        Ok(())
    }

    /// Current send target of a bus.
    pub fn bus_send(&self, index: usize) -> Result<Option<String>, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(checked_bus(&state.buses, index)?.send.clone())
    }

    /// Sets a bus volume in decibels.
    pub fn set_bus_volume_db(&self, index: usize, volume_db: f32) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        checked_bus_mut(&mut state.buses, index)?.volume_db = volume_db;
        Ok(())
    }

    /// Volume of a bus in decibels.
    pub fn bus_volume_db(&self, index: usize) -> Result<f32, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(checked_bus(&state.buses, index)?.volume_db)
    }

    /// Sets the solo flag of a bus.
    pub fn set_bus_solo(&self, index: usize, solo: bool) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        checked_bus_mut(&mut state.buses, index)?.solo = solo;
        Ok(())
    }

    /// Sets the mute flag of a bus.
    pub fn set_bus_mute(&self, index: usize, mute: bool) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        checked_bus_mut(&mut state.buses, index)?.mute = mute;
        Ok(())
    }

    /// Sets the bypass flag of a bus; a bypassed bus skips its effect
    /// chain but still applies volume and routing.
    pub fn set_bus_bypass(&self, index: usize, bypass: bool) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        checked_bus_mut(&mut state.buses, index)?.bypass = bypass;
        Ok(())
    }

    /// Appends an effect to a bus, instantiating one processing
    /// instance per channel.
    pub fn add_bus_effect(
        &self,
        index: usize,
        effect: Arc<dyn AudioEffect>,
    ) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mix_rate = state.mix_rate;
        let channel_count = state.channel_count;
        let bus = checked_bus_mut(&mut state.buses, index)?;
        let instances = (0..channel_count)
            .map(|_| effect.instantiate(mix_rate))
            .collect();
        bus.effects.push(EffectSlot {
            effect,
            enabled: true,
            instances,
        });
        Ok(())
    }

    /// Removes one effect from a bus's chain.
    pub fn remove_bus_effect(&self, index: usize, effect: usize) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let bus = checked_bus_mut(&mut state.buses, index)?;
        if effect >= bus.effects.len() {
            return Err(EngineError::InvalidArgument(format!(
                "effect index {effect} out of range on bus '{}'",
                bus.name
            )));
        }
        bus.effects.remove(effect);
        Ok(())
    }

    /// Number of effects on a bus.
    pub fn bus_effect_count(&self, index: usize) -> Result<usize, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(checked_bus(&state.buses, index)?.effects.len())
    }

    /// Enables or disables one effect slot without removing it.
    pub fn set_bus_effect_enabled(
        &self,
        index: usize,
        effect: usize,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let bus = checked_bus_mut(&mut state.buses, index)?;
        match bus.effects.get_mut(effect) {
            Some(slot) => {
                slot.enabled = enabled;
                Ok(())
            }
            None => Err(EngineError::InvalidArgument(format!(
                "effect index {effect} out of range on bus '{}'",
                bus.name
            ))),
        }
    }

    /// Left-channel peak of the last mix step, in decibels.
    pub fn bus_peak_volume_left_db(&self, index: usize, channel: usize) -> Result<f32, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(peak_to_db(checked_channel(&state.buses, index, channel)?.peak.left))
    }

    /// Right-channel peak of the last mix step, in decibels.
    pub fn bus_peak_volume_right_db(
        &self,
        index: usize,
        channel: usize,
    ) -> Result<f32, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(peak_to_db(checked_channel(&state.buses, index, channel)?.peak.right))
    }

    /// Whether a bus channel currently carries signal.
    pub fn is_bus_channel_active(&self, index: usize, channel: usize) -> Result<bool, EngineError> {
        let state = self.state.lock().unwrap();
        Ok(checked_channel(&state.buses, index, channel)?.active)
    }

    /// Peak threshold below which a channel counts as silent.
    pub fn set_channel_disable_threshold_db(&self, threshold_db: f32) {
        self.state.lock().unwrap().channel_disable_threshold_db = threshold_db;
    }

    /// Time a channel stays below the threshold before deactivating.
    pub fn set_channel_disable_time(&self, seconds: f32) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.channel_disable_frames = (seconds * state.mix_rate as f32) as u64;
    }

    /// Registers a source-generator hook run at the start of every
    /// mix step, in registration order.
    pub fn register_mix_callback(&self, callback: MixCallback) {
        self.state.lock().unwrap().mix_callbacks.push(callback);
    }

    /// Registers a hook run after every mix step, in registration
    /// order.
    pub fn register_update_callback(&self, callback: UpdateCallback) {
        self.state.lock().unwrap().update_callbacks.push(callback);
    }

    /// Snapshot of the current bus configuration.
    pub fn generate_bus_layout(&self) -> BusLayout {
        let state = self.state.lock().unwrap();
        BusLayout {
            buses: state
                .buses
                .iter()
                .map(|bus| BusLayoutEntry {
                    name: bus.name.clone(),
                    send: bus.send.clone(),
                    volume_db: bus.volume_db,
                    solo: bus.solo,
                    mute: bus.mute,
                    bypass: bus.bypass,
                    effects_enabled: bus.effects.iter().map(|e| e.enabled).collect(),
                })
                .collect(),
        }
    }

    /// Replaces the whole bus configuration with a layout. Effect
    /// chains are not part of the layout; the application re-adds
    /// them after the import.
    pub fn set_bus_layout(&self, layout: &BusLayout) -> Result<(), EngineError> {
        if layout.buses.is_empty() {
            return Err(EngineError::InvalidArgument(
                "a bus layout holds at least the master bus".into(),
            ));
        }
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut buses = Vec::with_capacity(layout.buses.len());
        for entry in &layout.buses {
            let mut bus = Bus::new(entry.name.clone(), state.channel_count, state.buffer_size);
            bus.send = entry.send.clone();
            bus.volume_db = entry.volume_db;
            bus.solo = entry.solo;
            bus.mute = entry.mute;
            bus.bypass = entry.bypass;
            buses.push(bus);
        }
        state.buses = buses;
        rebuild_map(state);
        Ok(())
    }

    /// Produces one chunk of `buffer_size` frames on every bus.
    pub fn mix_step(&self) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let buffer_size = state.buffer_size;

        // Reset per-step flags and resolve soloing: a bus plays at
        // full level only if some bus on its own send path (itself
        // included) is soloed.
        let solo_mode = state.buses.iter().any(|b| b.solo);
        let soloed: Vec<bool> = (0..state.buses.len())
            .map(|i| send_path_has_solo(state, i))
            .collect();
        for (bus, soloed) in state.buses.iter_mut().zip(&soloed) {
            bus.soloed = *soloed;
            for ch in &mut bus.channels {
                ch.used = false;
            }
        }

        // Source generators write bus inputs.
        let mut callbacks = std::mem::take(&mut state.mix_callbacks);
        {
            let mut writer = BusWriter { state };
            for callback in &mut callbacks {
                callback(&mut writer, buffer_size);
            }
        }
        state.mix_callbacks = callbacks;

        // Silence the inputs of muted buses and, in solo mode, of
        // buses with no solo on their send path. Sends arriving later
        // in the step still pass through at the bus's volume, which is
        // what keeps solo output identical to muting every
        // non-soloed bus.
        for bus in &mut state.buses {
            if bus.mute || (solo_mode && !bus.soloed) {
                for ch in &mut bus.channels {
                    if ch.used {
                        ch.buffer.fill(AudioFrame::ZERO);
                    }
                }
            }
        }

        let mut temp = std::mem::take(&mut state.temp);
        let threshold = db_to_linear(state.channel_disable_threshold_db);

        for i in (0..state.buses.len()).rev() {
            // Stale data from the previous step is not signal.
            let bus = &mut state.buses[i];
            for ch in &mut bus.channels {
                if ch.active && !ch.used {
                    ch.buffer.fill(AudioFrame::ZERO);
                }
            }

            if !bus.bypass {
                for slot in &mut bus.effects {
                    if !slot.enabled {
                        continue;
                    }
                    for (ch, instance) in bus.channels.iter_mut().zip(&mut slot.instances) {
                        if !ch.active && !instance.process_silence() {
                            continue;
                        }
                        instance.process(&ch.buffer, &mut temp);
                        std::mem::swap(&mut ch.buffer, &mut temp);
                    }
                }
            }

            let volume = db_to_linear(bus.volume_db);
            for ch in &mut bus.channels {
                if !ch.active {
                    ch.peak = AudioFrame::ZERO;
                    continue;
                }
                let mut peak = AudioFrame::ZERO;
                for frame in &mut ch.buffer {
                    *frame *= volume;
                    peak.left = peak.left.max(frame.left.abs());
                    peak.right = peak.right.max(frame.right.abs());
                }
                ch.peak = peak;
            }

            if i > 0 {
                let target = match &state.buses[i].send {
                    Some(name) => match state.bus_map.get(name) {
                        Some(&t) if t < i => t,
                        _ => {
                            log::debug!(
                                "bus '{}' send does not reach a lower bus, routing to master",
                                state.buses[i].name
                            );
                            0
                        }
                    },
                    None => 0,
                };
                let (head, tail) = state.buses.split_at_mut(i);
                let source = &tail[0];
                let dest = &mut head[target];
                for (src_ch, dst_ch) in source.channels.iter().zip(&mut dest.channels) {
                    if !src_ch.active {
                        continue;
                    }
                    touch(dst_ch);
                    for (d, s) in dst_ch.buffer.iter_mut().zip(&src_ch.buffer) {
                        *d += *s;
                    }
                }
            }

            let bus = &mut state.buses[i];
            for ch in &mut bus.channels {
                if !ch.active {
                    continue;
                }
                if ch.peak.peak() > threshold {
                    ch.last_mix_with_audio = state.mix_frames;
                } else if state.mix_frames.saturating_sub(ch.last_mix_with_audio)
                    > state.channel_disable_frames
                {
                    ch.active = false;
                }
            }
        }

        state.temp = temp;
        state.mix_frames += buffer_size as u64;

        let mut callbacks = std::mem::take(&mut state.update_callbacks);
        for callback in &mut callbacks {
            callback();
        }
        state.update_callbacks = callbacks;
    }

    /// Copies `out.len()` frames of one master channel, starting at
    /// frame `start` of the last mixed chunk.
    pub(crate) fn read_master(&self, channel: usize, start: usize, out: &mut [AudioFrame]) {
        let state = self.state.lock().unwrap();
        match state.buses[0].channels.get(channel) {
            Some(ch) => out.copy_from_slice(&ch.buffer[start..start + out.len()]),
            None => out.fill(AudioFrame::ZERO),
        }
    }
}

/// True if any bus along `index`'s send path, itself included, has
/// the solo flag. Send targets strictly decrease toward master, so
/// the walk terminates.
fn send_path_has_solo(state: &GraphState, index: usize) -> bool {
    let mut i = index;
    loop {
        if state.buses[i].solo {
            return true;
        }
        if i == 0 {
            return false;
        }
        i = match state.buses[i].send.as_ref().and_then(|s| state.bus_map.get(s)) {
            Some(&t) if t < i => t,
            _ => 0,
        };
    }
}

fn rebuild_map(state: &mut GraphState) {
    state.bus_map.clear();
    for (i, bus) in state.buses.iter().enumerate() {
        state.bus_map.insert(bus.name.clone(), i);
    }
}

fn checked_bus<'a>(buses: &'a [Bus], index: usize) -> Result<&'a Bus, EngineError> {
    buses.get(index).ok_or_else(|| {
        EngineError::InvalidArgument(format!("bus index {index} out of range"))
    })
}

fn checked_bus_mut<'a>(buses: &'a mut [Bus], index: usize) -> Result<&'a mut Bus, EngineError> {
    buses.get_mut(index).ok_or_else(|| {
        EngineError::InvalidArgument(format!("bus index {index} out of range"))
    })
}

fn checked_channel<'a>(
    buses: &'a [Bus],
    index: usize,
    channel: usize,
) -> Result<&'a BusChannel, EngineError> {
    checked_bus(buses, index)?.channels.get(channel).ok_or_else(|| {
        EngineError::InvalidArgument(format!("channel {channel} out of range on bus {index}"))
    })
}

/// Makes `attempt` unique among the current bus names by suffixing a
/// counter: "New Bus", "New Bus 2", "New Bus 3", ...
fn unique_name(buses: &[Bus], attempt: &str) -> String {
    let taken = |name: &str| buses.iter().any(|b| b.name == name);
    if !taken(attempt) {
        return attempt.to_owned();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{attempt} {n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> AudioMixGraph {
        AudioMixGraph::new(1, 64, 44100)
    }

    #[test]
    fn new_graph_has_only_master() {
        let g = graph();
        assert_eq!(g.bus_count(), 1);
        assert_eq!(g.bus_name(0).unwrap(), "Master");
        assert_eq!(g.bus_index("Master"), Some(0));
    }

    #[test]
    fn added_buses_get_unique_names() {
        let g = graph();
        assert_eq!(g.add_bus(), "New Bus");
        assert_eq!(g.add_bus(), "New Bus 2");
        assert_eq!(g.add_bus(), "New Bus 3");
        assert_eq!(g.bus_index("New Bus 2"), Some(2));
    }

    #[test]
    fn renaming_to_a_taken_name_uniquifies() {
        let g = graph();
        g.add_bus();
        g.add_bus();
        g.set_bus_name(1, "Music").unwrap();
        let assigned = g.set_bus_name(2, "Music").unwrap();
        assert_eq!(assigned, "Music 2");
        assert_eq!(g.bus_index("Music"), Some(1));
        assert_eq!(g.bus_index("Music 2"), Some(2));
    }

    #[test]
    fn master_bus_is_fixed() {
        let g = graph();
        g.add_bus();
        assert!(g.remove_bus(0).is_err());
        assert!(g.move_bus(0, 1).is_err());
        assert!(g.set_bus_name(0, "Main").is_err());
        assert!(g.set_bus_send(0, Some("New Bus")).is_err());
    }

    #[test]
    fn remove_and_move_keep_the_map_consistent() {
        let g = graph();
        g.add_bus(); // 1
        g.add_bus(); // 2
        g.set_bus_name(1, "A").unwrap();
        g.set_bus_name(2, "B").unwrap();
        g.move_bus(2, 1).unwrap();
        assert_eq!(g.bus_index("B"), Some(1));
        assert_eq!(g.bus_index("A"), Some(2));
        g.remove_bus(1).unwrap();
        assert_eq!(g.bus_index("B"), None);
        assert_eq!(g.bus_index("A"), Some(1));
    }

    #[test]
    fn set_bus_count_grows_and_shrinks() {
        let g = graph();
        g.set_bus_count(4).unwrap();
        assert_eq!(g.bus_count(), 4);
        g.set_bus_count(2).unwrap();
        assert_eq!(g.bus_count(), 2);
        assert!(g.set_bus_count(0).is_err());
    }

    #[test]
    fn layout_snapshot_round_trips() {
        let g = graph();
        g.add_bus();
        g.set_bus_name(1, "Music").unwrap();
        g.set_bus_volume_db(1, -4.5).unwrap();
        g.set_bus_mute(1, true).unwrap();
        g.add_bus();
        g.set_bus_send(2, Some("Music")).unwrap();

        let layout = g.generate_bus_layout();
        let other = AudioMixGraph::new(1, 64, 44100);
        other.set_bus_layout(&layout).unwrap();
        assert_eq!(other.generate_bus_layout(), layout);
        assert_eq!(other.bus_index("Music"), Some(1));
        assert_eq!(other.bus_volume_db(1).unwrap(), -4.5);
        assert_eq!(other.bus_send(2).unwrap().as_deref(), Some("Music"));
    }

    #[test]
    fn layout_survives_the_resource_shape() {
        let g = graph();
        g.add_bus();
        g.set_bus_name(1, "Sfx").unwrap();
        g.set_bus_solo(1, true).unwrap();
        let layout = g.generate_bus_layout();

        let res = layout.to_resource();
        let back = BusLayout::from_resource(&res).unwrap();
        assert_eq!(back, layout);
    }
}
