// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Virtual providers (§4.3): pluggable overlays that own a subtree of the
//! namespace rooted at a `virtual_root_id`, plus any extra item ids they
//! choose, and their own reference bundles.
//!
//! A version-history provider is the canonical example: it answers for a
//! subtree of version records that never touch the base persistence engine.

use uuid::Uuid;

use crate::change_log::{NodeReferences, NodeReferencesId};
use crate::error::Result;
use crate::identity::{ItemId, Name, NameKey, PropertyType};
use crate::state::{DefinitionId, ItemState};

/// Alias used by trait signatures below; a property is addressed by its
/// parent UUID and qualified name, same as [`ItemId::PropertyId`].
pub type PropertyId = (Uuid, NameKey);

/// An overlay namespace with its own item states and reference bundles.
///
/// Implementors must never return or accept states whose id collides with a
/// UUID known to the base persistence layer (§4.3).
pub trait VirtualProvider: Send + Sync {
    /// Whether `id` is this provider's virtual root.
    fn is_virtual_root(&self, id: &ItemId) -> bool {
        matches!(id, ItemId::NodeId(uuid) if *uuid == self.virtual_root_id())
    }

    /// The UUID this provider's subtree is rooted at.
    fn virtual_root_id(&self) -> Uuid;

    /// Whether this provider can resolve `id`, covering both its rooted
    /// subtree and any extra ids it owns.
    fn has_item_state(&self, id: &ItemId) -> bool;

    /// Resolves `id` to an [`ItemState`]. Only called after `has_item_state`
    /// reports true; callers may still receive [`crate::error::Error::NoSuchItem`]
    /// if the provider's own bookkeeping is inconsistent.
    fn get_item_state(&self, id: &ItemId) -> Result<ItemState>;

    /// Node-specific existence probe.
    fn has_node_state(&self, id: Uuid) -> bool {
        self.has_item_state(&ItemId::NodeId(id))
    }

    /// Node-specific resolution.
    fn get_node_state(&self, id: Uuid) -> Result<ItemState> {
        self.get_item_state(&ItemId::NodeId(id))
    }

    /// Property-specific existence probe.
    fn has_property_state(&self, id: &PropertyId) -> bool {
        self.has_item_state(&ItemId::PropertyId(id.0, id.1.clone()))
    }

    /// Property-specific resolution.
    fn get_property_state(&self, id: &PropertyId) -> Result<ItemState> {
        self.get_item_state(&ItemId::PropertyId(id.0, id.1.clone()))
    }

    /// Loads the reference bundle targeting `id.0`, if this provider owns
    /// references for that target.
    fn get_node_references(&self, id: NodeReferencesId) -> Result<NodeReferences>;

    /// Offers a modified reference bundle to this provider. Returns `true`
    /// if accepted (the target belongs to this provider); `false` otherwise,
    /// in which case the manager offers it to the next registered provider
    /// (Phase G).
    fn set_node_references(&self, refs: NodeReferences) -> bool;

    /// Constructs a provider-internal node state. Used by callers building
    /// provider-owned subtrees (e.g. a version-history record); this crate's
    /// manager never calls it directly.
    fn create_node_state(
        &self,
        parent: Uuid,
        name: Name,
        uuid: Uuid,
        node_type: Name,
        definition_id: DefinitionId,
    ) -> ItemState {
        let _ = (parent, name);
        ItemState::new_node(
            crate::state::Status::Existing,
            definition_id,
            crate::state::NodeData {
                uuid,
                parent_uuid: Some(parent),
                node_type_name: node_type,
                mixin_types: Vec::new(),
                children: Vec::new(),
                property_names: Vec::new(),
            },
        )
    }

    /// Constructs a provider-internal property state.
    fn create_property_state(
        &self,
        parent: Uuid,
        name: Name,
        value_type: PropertyType,
        multi_valued: bool,
        definition_id: DefinitionId,
    ) -> ItemState {
        ItemState::new_property(
            crate::state::Status::Existing,
            definition_id,
            crate::state::PropertyData {
                qname: name,
                parent_uuid: parent,
                value_type,
                multi_valued,
                values: Vec::new(),
            },
        )
    }
}

/// An ordered, immutable snapshot of registered providers.
///
/// [`crate::manager::SharedItemStateManager::add_virtual_provider`] appends
/// to this via copy-on-write (§4.2: "Appends to an immutable snapshot of the
/// provider list") so `get_item_state` can read the current snapshot without
/// taking the commit mutex.
pub type ProviderList = std::sync::Arc<Vec<std::sync::Arc<dyn VirtualProvider>>>;
