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

//! External collaborators consumed by the manager (§6): the durable storage
//! engine and the node-type registry.
//!
//! Both are traits so a caller can plug in a real backing store; this module
//! also ships [`MemoryPersistenceManager`], an in-memory reference
//! implementation used by the crate's own tests.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::change_log::{ChangeLog, NodeReferences, NodeReferencesId};
use crate::error::{Error, Result};
use crate::identity::{ItemId, Name};
use crate::state::{DefinitionId, ItemState, NodeData, PropertyData, Status};

/// The durable storage engine backing the manager.
///
/// `exists`/`load` are read paths, consulted on a cache miss; `create_new`
/// allocates a fresh, unpersisted shared state (no I/O); `store` is the one
/// atomic commit primitive the manager relies on for Phase E.
pub trait PersistenceManager: Send + Sync {
    /// Loads a node by UUID. Returns [`Error::NoSuchItem`] if absent.
    fn load_node(&self, uuid: Uuid) -> Result<NodeData>;

    /// Loads a property by parent UUID and name. Returns
    /// [`Error::NoSuchItem`] if absent.
    fn load_property(&self, parent: Uuid, name: &Name) -> Result<PropertyData>;

    /// Loads the reference bundle targeting `id.0`. Returns
    /// [`Error::NoSuchItem`] if no bundle is stored for that target.
    fn load_references(&self, id: NodeReferencesId) -> Result<NodeReferences>;

    /// Whether an item exists, without loading its data.
    fn exists(&self, id: &ItemId) -> Result<bool>;

    /// Allocates a fresh, unpersisted [`ItemState`] with status
    /// [`Status::New`] for `id`. Performs no I/O; the returned state carries
    /// placeholder payload fields the caller populates before `store`.
    fn create_new(&self, id: &ItemId, definition_id: DefinitionId) -> ItemState;

    /// Atomically applies every added/modified/deleted item and modified
    /// reference bundle in `log` to durable storage. All-or-nothing: a
    /// failure must leave durable state exactly as it was before the call.
    fn store(&self, log: &ChangeLog) -> Result<()>;
}

/// Read-only oracle over the node-type schema (§6): "what are the mandatory
/// default children/properties of type T?".
///
/// The registry itself — parsing of CND/XML type definitions — is out of
/// scope for this crate (§1); this trait is the seam a caller's schema
/// engine plugs into.
pub trait NodeTypeRegistry: Send + Sync {
    /// The [`DefinitionId`] for the repository root's primary type, consulted
    /// at bootstrap. [`Error::SchemaFailure`] if the registry cannot resolve
    /// it.
    fn root_definition(&self) -> Result<DefinitionId>;

    /// The [`DefinitionId`] for a named node type's default property
    /// definition, used when a caller adds a node without specifying one
    /// explicitly (e.g. the bootstrap `jcr:primaryType` property).
    fn default_property_definition(&self, node_type: &Name) -> Result<DefinitionId>;

    /// Whether `node_type` is known to the registry at all.
    fn has_node_type(&self, node_type: &Name) -> bool;
}

/// An in-memory [`PersistenceManager`] and [`NodeTypeRegistry`] pair.
///
/// Not part of the distilled spec — every commit-protocol test needs *some*
/// concrete persistence engine, and shipping one in-crate mirrors how the
/// teacher crate ships `in_memory_backend` alongside `trie_backend` for its
/// own `Backend` trait.
#[derive(Default)]
pub struct MemoryPersistenceManager {
    nodes: RwLock<HashMap<Uuid, NodeData>>,
    properties: RwLock<HashMap<(Uuid, crate::identity::NameKey), PropertyData>>,
    references: RwLock<HashMap<Uuid, NodeReferences>>,
}

impl MemoryPersistenceManager {
    /// Builds an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with a node, bypassing the commit protocol. Used by
    /// bootstrap and by tests that need pre-existing persisted state.
    pub fn seed_node(&self, data: NodeData) {
        self.nodes.write().insert(data.uuid, data);
    }

    /// Seeds the store with a property, bypassing the commit protocol.
    pub fn seed_property(&self, data: PropertyData) {
        let key = (data.parent_uuid, crate::identity::NameKey::from(&data.qname));
        self.properties.write().insert(key, data);
    }
}

impl PersistenceManager for MemoryPersistenceManager {
    fn load_node(&self, uuid: Uuid) -> Result<NodeData> {
        self.nodes
            .read()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::NoSuchItem(ItemId::node(uuid)))
    }

    fn load_property(&self, parent: Uuid, name: &Name) -> Result<PropertyData> {
        let key = (parent, crate::identity::NameKey::from(name));
        self.properties
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NoSuchItem(ItemId::property(parent, name.clone())))
    }

    fn load_references(&self, id: NodeReferencesId) -> Result<NodeReferences> {
        self.references
            .read()
            .get(&id.0)
            .cloned()
            .ok_or(Error::NoSuchItem(ItemId::node(id.0)))
    }

    fn exists(&self, id: &ItemId) -> Result<bool> {
        Ok(match id {
            ItemId::NodeId(uuid) => self.nodes.read().contains_key(uuid),
            ItemId::PropertyId(parent, name) => self
                .properties
                .read()
                .contains_key(&(*parent, name.clone())),
        })
    }

    fn create_new(&self, id: &ItemId, definition_id: DefinitionId) -> ItemState {
        match id {
            ItemId::NodeId(uuid) => ItemState::new_node(
                Status::New,
                definition_id,
                NodeData {
                    uuid: *uuid,
                    parent_uuid: None,
                    node_type_name: Name::new("nt:unstructured"),
                    mixin_types: Vec::new(),
                    children: Vec::new(),
                    property_names: Vec::new(),
                },
            ),
            ItemId::PropertyId(parent, name_key) => ItemState::new_property(
                Status::New,
                definition_id,
                PropertyData {
                    qname: name_key.to_name(),
                    parent_uuid: *parent,
                    value_type: crate::identity::PropertyType::Undefined,
                    multi_valued: false,
                    values: Vec::new(),
                },
            ),
        }
    }

    fn store(&self, log: &ChangeLog) -> Result<()> {
        for state in log.added_iter().chain(log.modified_iter()) {
            match state.as_node() {
                Some(data) => {
                    self.nodes.write().insert(data.uuid, data.clone());
                }
                None => {
                    if let Some(data) = state.as_property() {
                        let key = (data.parent_uuid, crate::identity::NameKey::from(&data.qname));
                        self.properties.write().insert(key, data.clone());
                    }
                }
            }
        }
        for state in log.deleted_iter() {
            match state.id() {
                ItemId::NodeId(uuid) => {
                    self.nodes.write().remove(uuid);
                }
                ItemId::PropertyId(parent, name) => {
                    self.properties.write().remove(&(*parent, name.clone()));
                }
            }
        }
        for refs in log.modified_refs_iter() {
            if refs.is_empty() {
                self.references.write().remove(&refs.target());
            } else {
                self.references.write().insert(refs.target(), refs.clone());
            }
        }
        Ok(())
    }
}

impl NodeTypeRegistry for MemoryPersistenceManager {
    fn root_definition(&self) -> Result<DefinitionId> {
        Ok(DefinitionId("rep:root".into()))
    }

    fn default_property_definition(&self, node_type: &Name) -> Result<DefinitionId> {
        Ok(DefinitionId(format!("{}/jcr:primaryType", node_type)))
    }

    fn has_node_type(&self, _node_type: &Name) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_node_round_trips_through_load() {
        let store = MemoryPersistenceManager::new();
        let uuid = Uuid::new_v4();
        store.seed_node(NodeData {
            uuid,
            parent_uuid: None,
            node_type_name: Name::new("nt:unstructured"),
            mixin_types: Vec::new(),
            children: Vec::new(),
            property_names: Vec::new(),
        });
        assert!(store.exists(&ItemId::node(uuid)).unwrap());
        assert_eq!(store.load_node(uuid).unwrap().uuid, uuid);
    }

    #[test]
    fn missing_node_is_no_such_item() {
        let store = MemoryPersistenceManager::new();
        let err = store.load_node(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::NoSuchItem(_)));
    }
}
