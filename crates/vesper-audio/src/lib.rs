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

//! # Vesper Audio
//!
//! Real-time bus mix graph: named buses with effect chains, sends and
//! solo/mute/bypass routing, mixed in fixed-size steps on a dedicated
//! driver thread.

#![warn(missing_docs)]

mod bus;

pub mod driver;
pub mod effect;
pub mod frame;
pub mod graph;

pub use driver::{
    sample_to_i32, AudioDriver, DriverCallback, DummyDriver, SpeakerMode, DEFAULT_BUFFER_SIZE,
    DEFAULT_MIX_RATE,
};
pub use effect::{AudioEffect, AudioEffectInstance, DelayEffect, GainEffect};
pub use frame::{db_to_linear, linear_to_db, peak_to_db, AudioFrame, MIN_PEAK_DB, PEAK_OFFSET};
pub use graph::{
    AudioMixGraph, BusLayout, BusLayoutEntry, BusWriter, MixCallback, UpdateCallback,
};
