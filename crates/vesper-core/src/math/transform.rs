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

//! Defines the affine transform types for 2D and 3D.

use crate::math::basis::Basis;
use crate::math::vector::{Vector2, Vector3};

/// A 2D affine transform: two basis columns plus an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    /// The basis columns followed by the origin, serialized in order.
    pub columns: [Vector2; 3],
}

impl Transform2D {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        columns: [
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(0.0, 0.0),
        ],
    };

    /// Creates a transform from two basis columns and an origin.
    #[inline]
    pub const fn from_columns(x: Vector2, y: Vector2, origin: Vector2) -> Self {
        Self {
            columns: [x, y, origin],
        }
    }

    /// Returns the origin column.
    #[inline]
    pub fn origin(&self) -> Vector2 {
        self.columns[2]
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A 3D affine transform: a [`Basis`] plus an origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform3D {
    /// The rotation/scale part.
    pub basis: Basis,
    /// The translation part.
    pub origin: Vector3,
}

impl Transform3D {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        basis: Basis::IDENTITY,
        origin: Vector3::ZERO,
    };

    /// Creates a transform from a basis and an origin.
    #[inline]
    pub const fn new(basis: Basis, origin: Vector3) -> Self {
        Self { basis, origin }
    }

    /// Transforms `point` by this transform.
    #[inline]
    pub fn xform(&self, point: Vector3) -> Vector3 {
        self.basis.xform(point) + self.origin
    }
}
