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

//! Defines the class registry seam between the serialization engine and
//! the application's resource types.

use crate::resource::Res;
use crate::variant::Variant;

/// Resolves type names to resource instances and default property values.
///
/// The loader asks the registry to instantiate every type name it reads;
/// the saver asks it for defaults so properties that still hold their
/// default value can be elided from the output.
pub trait ClassRegistry: Send + Sync {
    /// Instantiates a fresh resource of the named type, or `None` if the
    /// type is unknown.
    fn instantiate(&self, type_name: &str) -> Option<Res>;

    /// Returns the default value of `property` on the named type, or
    /// `None` when no default is known (such properties are always
    /// written out).
    fn default_property_value(&self, type_name: &str, property: &str) -> Option<Variant>;

    /// Returns `true` if `child` is `parent` or inherits from it.
    fn is_parent_class(&self, child: &str, parent: &str) -> bool;
}
