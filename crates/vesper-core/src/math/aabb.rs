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

//! Defines the axis-aligned 3D bounding box type.

use crate::math::vector::Vector3;

/// An axis-aligned bounding box, stored as position + size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    /// The minimum corner of the box.
    pub position: Vector3,
    /// The extent of the box along each axis.
    pub size: Vector3,
}

impl Aabb {
    /// Creates a new `Aabb`.
    #[inline]
    pub const fn new(position: Vector3, size: Vector3) -> Self {
        Self { position, size }
    }

    /// Returns `true` if `point` lies inside the box.
    #[inline]
    pub fn has_point(&self, point: Vector3) -> bool {
        point.x >= self.position.x
            && point.y >= self.position.y
            && point.z >= self.position.z
            && point.x < self.position.x + self.size.x
            && point.y < self.position.y + self.size.y
            && point.z < self.position.z + self.size.z
    }
}
