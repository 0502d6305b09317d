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

//! Defines the 3D plane type in normal + distance form.

use crate::math::vector::Vector3;

/// A plane in Hessian normal form: `normal . p = d`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    /// The plane normal. Not required to be unit length by the value model.
    pub normal: Vector3,
    /// The distance from the origin along the normal.
    pub d: f32,
}

impl Plane {
    /// Creates a new `Plane`.
    #[inline]
    pub const fn new(normal: Vector3, d: f32) -> Self {
        Self { normal, d }
    }

    /// Returns the signed distance from `point` to the plane.
    #[inline]
    pub fn distance_to(&self, point: Vector3) -> f32 {
        self.normal.dot(point) - self.d
    }
}
