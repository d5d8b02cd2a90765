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

//! The change log: a session's grouped set of added/modified/deleted items
//! and modified reference bundles, presented to the manager as one commit
//! unit.

use std::collections::HashMap;

use uuid::Uuid;

use crate::identity::ItemId;
use crate::state::ItemState;

/// Identifies a [`NodeReferences`] bundle by the node UUID it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeReferencesId(pub Uuid);

/// The set of incoming `REFERENCE`-property back-pointers to a target node.
///
/// Each entry in `references` is expected to be an [`ItemId::PropertyId`];
/// this is a documented invariant rather than a type-level one, matching
/// how the distilled spec describes the bundle as "the set of back-pointers
/// (expressed as `PropertyId`s)" without introducing a separate property-id
/// type.
#[derive(Debug, Clone)]
pub struct NodeReferences {
    target: Uuid,
    references: Vec<ItemId>,
}

impl NodeReferences {
    /// Builds an empty bundle for `target`.
    pub fn empty(target: Uuid) -> Self {
        NodeReferences {
            target,
            references: Vec::new(),
        }
    }

    /// Builds a bundle from an explicit set of referring property ids.
    pub fn new(target: Uuid, references: Vec<ItemId>) -> Self {
        debug_assert!(
            references.iter().all(|id| !id.denotes_node()),
            "NodeReferences entries must be property ids"
        );
        NodeReferences { target, references }
    }

    /// The UUID of the node this bundle targets.
    pub fn target(&self) -> Uuid {
        self.target
    }

    /// The referring property ids.
    pub fn references(&self) -> &[ItemId] {
        &self.references
    }

    /// True when no property currently references the target.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Adds a referring property id.
    pub fn add(&mut self, id: ItemId) {
        self.references.push(id);
    }
}

/// A session's grouped set of pending mutations: items to add, modify, or
/// delete, plus any reference bundles touched by those mutations.
///
/// Not thread-safe on its own — a `ChangeLog` is owned by exactly one
/// session and handed to [`crate::manager::SharedItemStateManager::store`]
/// as a single commit unit.
#[derive(Default)]
pub struct ChangeLog {
    added: Vec<ItemState>,
    modified: Vec<ItemState>,
    deleted: Vec<ItemState>,
    modified_refs: HashMap<Uuid, NodeReferences>,
}

impl ChangeLog {
    /// Builds an empty change log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` as added, replacing any existing entry with the same
    /// id (dedupe by id).
    pub fn added(&mut self, state: ItemState) {
        dedupe_push(&mut self.added, state);
    }

    /// Records `state` as modified, replacing any existing entry with the
    /// same id.
    pub fn modified(&mut self, state: ItemState) {
        dedupe_push(&mut self.modified, state);
    }

    /// Records `state` as deleted, replacing any existing entry with the
    /// same id.
    pub fn deleted(&mut self, state: ItemState) {
        dedupe_push(&mut self.deleted, state);
    }

    /// Records a modified reference bundle, replacing any existing bundle
    /// for the same target.
    pub fn modified_refs(&mut self, refs: NodeReferences) {
        self.modified_refs.insert(refs.target(), refs);
    }

    /// Iterates the added items.
    pub fn added_iter(&self) -> impl Iterator<Item = &ItemState> {
        self.added.iter()
    }

    /// Iterates the modified items.
    pub fn modified_iter(&self) -> impl Iterator<Item = &ItemState> {
        self.modified.iter()
    }

    /// Iterates the deleted items.
    pub fn deleted_iter(&self) -> impl Iterator<Item = &ItemState> {
        self.deleted.iter()
    }

    /// Mutable iteration over added items, used by the manager to connect
    /// each one to its freshly created shared peer.
    pub fn added_iter_mut(&mut self) -> impl Iterator<Item = &mut ItemState> {
        self.added.iter_mut()
    }

    /// Mutable iteration over modified items.
    pub fn modified_iter_mut(&mut self) -> impl Iterator<Item = &mut ItemState> {
        self.modified.iter_mut()
    }

    /// Mutable iteration over deleted items.
    pub fn deleted_iter_mut(&mut self) -> impl Iterator<Item = &mut ItemState> {
        self.deleted.iter_mut()
    }

    /// Iterates the modified reference bundles.
    pub fn modified_refs_iter(&self) -> impl Iterator<Item = &NodeReferences> {
        self.modified_refs.values()
    }

    /// Looks up an item by id across all three sets.
    pub fn get(&self, id: &ItemId) -> Option<&ItemState> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .find(|state| state.id() == id)
    }

    /// True if `id` appears in the deleted set.
    pub fn is_deleted(&self, id: &ItemId) -> bool {
        self.deleted.iter().any(|state| state.id() == id)
    }

    /// Copies transient working data into every connected shared peer
    /// (Phase D of the commit protocol). No-op for any state that is not
    /// yet connected.
    pub fn push(&self) {
        for state in self.added.iter().chain(self.modified.iter()).chain(self.deleted.iter()) {
            state.push_into_overlay();
        }
    }

    /// Applies the post-commit status transition to every item (Phase F),
    /// in place.
    pub fn persisted(&mut self) {
        for state in self
            .added
            .iter_mut()
            .chain(self.modified.iter_mut())
            .chain(self.deleted.iter_mut())
        {
            state.persisted();
        }
    }

    /// True when no items and no reference bundles are recorded.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.modified_refs.is_empty()
    }

    /// Clears every set.
    pub fn reset(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.deleted.clear();
        self.modified_refs.clear();
    }
}

fn dedupe_push(set: &mut Vec<ItemState>, state: ItemState) {
    if let Some(existing) = set.iter_mut().find(|s| s.id() == state.id()) {
        *existing = state;
    } else {
        set.push(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Name;
    use crate::state::{DefinitionId, NodeData, Status};

    fn node(uuid: Uuid) -> ItemState {
        ItemState::new_node(
            Status::New,
            DefinitionId("nt:unstructured".into()),
            NodeData {
                uuid,
                parent_uuid: None,
                node_type_name: Name::new("nt:unstructured"),
                mixin_types: Vec::new(),
                children: Vec::new(),
                property_names: Vec::new(),
            },
        )
    }

    #[test]
    fn added_dedupes_by_id() {
        let uuid = Uuid::new_v4();
        let mut log = ChangeLog::new();
        log.added(node(uuid));
        log.added(node(uuid));
        assert_eq!(log.added_iter().count(), 1);
    }

    #[test]
    fn get_finds_across_all_three_sets() {
        let mut log = ChangeLog::new();
        let added_id = Uuid::new_v4();
        let deleted_id = Uuid::new_v4();
        log.added(node(added_id));
        log.deleted(node(deleted_id));

        assert!(log.get(&ItemId::node(added_id)).is_some());
        assert!(log.get(&ItemId::node(deleted_id)).is_some());
        assert!(log.get(&ItemId::node(Uuid::new_v4())).is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let mut log = ChangeLog::new();
        log.added(node(Uuid::new_v4()));
        log.modified_refs(NodeReferences::empty(Uuid::new_v4()));
        assert!(!log.is_empty());
        log.reset();
        assert!(log.is_empty());
    }

    #[test]
    fn node_references_tracks_emptiness() {
        let mut refs = NodeReferences::empty(Uuid::new_v4());
        assert!(refs.is_empty());
        refs.add(ItemId::property(Uuid::new_v4(), Name::new("my:ref")));
        assert!(!refs.is_empty());
    }
}
