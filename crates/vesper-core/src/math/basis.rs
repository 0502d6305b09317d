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

//! Defines the 3x3 matrix type used as the rotation/scale part of a
//! 3D transform.

use crate::math::vector::Vector3;

/// A 3x3 matrix stored as three row vectors.
///
/// Rows are serialized in order, each row x, y, z; this ordering is part
/// of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    /// The three rows of the matrix.
    pub rows: [Vector3; 3],
}

impl Basis {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        rows: [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ],
    };

    /// Creates a `Basis` from three rows.
    #[inline]
    pub const fn from_rows(r0: Vector3, r1: Vector3, r2: Vector3) -> Self {
        Self { rows: [r0, r1, r2] }
    }

    /// Creates a scaling matrix.
    #[inline]
    pub const fn from_scale(scale: Vector3) -> Self {
        Self {
            rows: [
                Vector3::new(scale.x, 0.0, 0.0),
                Vector3::new(0.0, scale.y, 0.0),
                Vector3::new(0.0, 0.0, scale.z),
            ],
        }
    }

    /// Transforms `v` by this matrix.
    #[inline]
    pub fn xform(&self, v: Vector3) -> Vector3 {
        Vector3::new(self.rows[0].dot(v), self.rows[1].dot(v), self.rows[2].dot(v))
    }
}

impl Default for Basis {
    fn default() -> Self {
        Self::IDENTITY
    }
}
