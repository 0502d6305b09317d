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

//! Stereo sample pairs and decibel conversions.

use std::ops::{Add, AddAssign, Mul, MulAssign};

/// Floor for reported peak levels; silence maps here instead of `-inf`.
pub const MIN_PEAK_DB: f32 = -200.0;

/// Additive offset applied before converting a peak to decibels so a
/// zero peak stays finite.
pub const PEAK_OFFSET: f32 = 1e-10;

/// One stereo frame: a left/right sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioFrame {
    /// Left channel sample.
    pub left: f32,
    /// Right channel sample.
    pub right: f32,
}

impl AudioFrame {
    /// The silent frame.
    pub const ZERO: AudioFrame = AudioFrame {
        left: 0.0,
        right: 0.0,
    };

    /// Builds a frame from its two samples.
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// The larger of the two samples' magnitudes.
    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}

impl Add for AudioFrame {
    type Output = AudioFrame;

    fn add(self, rhs: AudioFrame) -> AudioFrame {
        AudioFrame::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for AudioFrame {
    fn add_assign(&mut self, rhs: AudioFrame) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for AudioFrame {
    type Output = AudioFrame;

    fn mul(self, rhs: f32) -> AudioFrame {
        AudioFrame::new(self.left * rhs, self.right * rhs)
    }
}

impl MulAssign<f32> for AudioFrame {
    fn mul_assign(&mut self, rhs: f32) {
        self.left *= rhs;
        self.right *= rhs;
    }
}

/// Converts a decibel value to a linear gain, `10^(db/20)`.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db * 0.05)
}

/// Converts a linear gain to decibels, `20 * log10(linear)`.
pub fn linear_to_db(linear: f32) -> f32 {
    linear.log10() * 20.0
}

/// Converts a measured peak to decibels with the silence floor applied.
pub fn peak_to_db(peak: f32) -> f32 {
    linear_to_db(peak + PEAK_OFFSET).max(MIN_PEAK_DB)
}
