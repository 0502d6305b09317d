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

//! Provides the geometric value types carried by the Variant model.
//!
//! These are plain `f32` value types with structural equality; the
//! serialization engine writes their fields in a fixed order, so field
//! layout here is part of the wire contract. In-memory reals are always
//! `f32`; the container's `real64` flag only widens the on-disk form.

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

pub mod aabb;
pub mod basis;
pub mod color;
pub mod plane;
pub mod quaternion;
pub mod rect;
pub mod transform;
pub mod vector;

pub use self::aabb::Aabb;
pub use self::basis::Basis;
pub use self::color::Color;
pub use self::plane::Plane;
pub use self::quaternion::Quat;
pub use self::rect::Rect2;
pub use self::transform::{Transform2D, Transform3D};
pub use self::vector::{Vector2, Vector3};
