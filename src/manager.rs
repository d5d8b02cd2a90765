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

//! The shared item-state manager (§4.2, C5): the focus of this crate.
//!
//! Resolves ids to shared states across the cache, persistence engine, and
//! registered virtual providers; runs the eight-phase commit protocol; and
//! acts as the sole [`StateListener`] for every shared state it hands out,
//! so a state's own destruction or external invalidation always routes back
//! through cache eviction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::cache::ItemStateCache;
use crate::change_log::{ChangeLog, NodeReferences, NodeReferencesId};
use crate::error::{Error, Result};
use crate::events::{self, ItemStateSource, ObservationManager};
use crate::identity::{InternalValue, ItemId, Name, NameKey, PropertyType};
use crate::persistence::{NodeTypeRegistry, PersistenceManager};
use crate::state::{
    DefinitionId, ItemState, NodeData, PropertyData, SharedHandle, StateListener, Status,
};
use crate::virtual_provider::{ProviderList, VirtualProvider};

/// The shared item-state manager.
///
/// Construct with [`SharedItemStateManager::bootstrap`] (which also creates
/// the repository root if persistence is empty) or
/// [`SharedItemStateManager::new`] (assumes the root already exists).
/// Always held behind an `Arc`: the manager registers itself as a weak
/// listener on every shared state it hands out, which requires a stable
/// `Arc<Self>` to downgrade from.
pub struct SharedItemStateManager {
    root_uuid: Uuid,
    persistence: Arc<dyn PersistenceManager>,
    node_types: Arc<dyn NodeTypeRegistry>,
    cache: ItemStateCache,
    providers: RwLock<ProviderList>,
    commit_mutex: Mutex<()>,
    poisoned: AtomicBool,
    self_weak: RwLock<Weak<SharedItemStateManager>>,
}

impl SharedItemStateManager {
    /// Builds a manager over an existing repository (the root must already
    /// be present in `persistence`).
    pub fn new(
        root_uuid: Uuid,
        persistence: Arc<dyn PersistenceManager>,
        node_types: Arc<dyn NodeTypeRegistry>,
    ) -> Arc<Self> {
        let manager = Arc::new(SharedItemStateManager {
            root_uuid,
            persistence,
            node_types,
            cache: ItemStateCache::new(),
            providers: RwLock::new(Arc::new(Vec::new())),
            commit_mutex: Mutex::new(()),
            poisoned: AtomicBool::new(false),
            self_weak: RwLock::new(Weak::new()),
        });
        *manager.self_weak.write() = Arc::downgrade(&manager);
        manager
    }

    /// Builds a manager, creating the repository root (`rep:root`, with a
    /// single-valued `jcr:primaryType` NAME property) if it does not already
    /// exist in `persistence`. See Scenario 1 of spec.md §8.
    pub fn bootstrap(
        root_uuid: Uuid,
        persistence: Arc<dyn PersistenceManager>,
        node_types: Arc<dyn NodeTypeRegistry>,
    ) -> Result<Arc<Self>> {
        let manager = Self::new(root_uuid, persistence, node_types);
        if manager.persistence.exists(&ItemId::node(root_uuid))? {
            return Ok(manager);
        }

        let root_def = manager
            .node_types
            .root_definition()
            .map_err(|e| Error::SchemaFailure(e.to_string()))?;
        let primary_type_name = Name::new("jcr:primaryType");
        let prop_def = manager
            .node_types
            .default_property_definition(&Name::new("rep:root"))
            .map_err(|e| Error::SchemaFailure(e.to_string()))?;

        let root_node = ItemState::new_node(
            Status::New,
            root_def,
            NodeData {
                uuid: root_uuid,
                parent_uuid: None,
                node_type_name: Name::new("rep:root"),
                mixin_types: Vec::new(),
                children: Vec::new(),
                property_names: vec![NameKey::from(&primary_type_name)],
            },
        );
        let root_primary_type = ItemState::new_property(
            Status::New,
            prop_def,
            PropertyData {
                qname: primary_type_name,
                parent_uuid: root_uuid,
                value_type: PropertyType::Name,
                multi_valued: false,
                values: vec![InternalValue::Name(Name::new("rep:root"))],
            },
        );

        let mut bootstrap_log = ChangeLog::new();
        bootstrap_log.added(root_node);
        bootstrap_log.added(root_primary_type);
        manager.store(bootstrap_log, None)?;
        Ok(manager)
    }

    fn self_handle(&self) -> Weak<SharedItemStateManager> {
        self.self_weak.read().clone()
    }

    fn check_not_poisoned(&self) -> Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(Error::PersistenceFailure(
                "manager is poisoned by a prior store() failure; call reload()".into(),
            ));
        }
        Ok(())
    }

    /// Number of registered virtual providers. Ambient accessor, not part
    /// of the distilled spec; useful for health checks.
    pub fn virtual_provider_count(&self) -> usize {
        self.providers.read().len()
    }

    /// Whether a prior `store()` failure has poisoned this manager (§7,
    /// Open Question 1).
    pub fn is_disposed(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Recovers from a poisoned state by evicting the cache and detaching
    /// all listeners, so the next `get_item_state` reloads from persistence.
    pub fn reload(&self) {
        self.dispose();
        self.poisoned.store(false, Ordering::SeqCst);
    }

    /// Evicts every cached state and detaches its listeners.
    pub fn dispose(&self) {
        self.cache.dump(|_id, state| {
            state.write().clear_listeners();
        });
        self.cache.evict_all();
    }

    /// Appends a virtual provider to the (copy-on-write) provider snapshot.
    /// Registration order is stable and defines overlay precedence.
    pub fn add_virtual_provider(&self, provider: Arc<dyn VirtualProvider>) {
        let mut providers = self.providers.write();
        let mut next: Vec<Arc<dyn VirtualProvider>> = providers.iter().cloned().collect();
        next.push(provider);
        *providers = Arc::new(next);
    }

    /// Resolves `id` to its shared state (§4.2).
    pub fn get_item_state(&self, id: &ItemId) -> Result<SharedHandle> {
        self.check_not_poisoned()?;
        let providers = self.providers.read().clone();

        for provider in providers.iter() {
            if provider.is_virtual_root(id) {
                return self.resolve_from_provider(provider.as_ref(), id);
            }
        }

        if let Some(state) = self.cache.retrieve(id) {
            return Ok(state);
        }
        if self.persistence.exists(id).unwrap_or(false) {
            return self.load_local(id);
        }

        for provider in providers.iter() {
            if provider.has_item_state(id) {
                return self.resolve_from_provider(provider.as_ref(), id);
            }
        }

        Err(Error::NoSuchItem(id.clone()))
    }

    /// Boolean existence probe with the same resolution order as
    /// [`Self::get_item_state`]. Never propagates persistence or provider
    /// errors — both are treated as "not present" (§7: availability over
    /// accuracy; the commit path re-checks).
    pub fn has_item_state(&self, id: &ItemId) -> bool {
        if self.poisoned.load(Ordering::SeqCst) {
            return false;
        }
        let providers = self.providers.read().clone();

        if providers.iter().any(|p| p.is_virtual_root(id)) {
            return true;
        }
        if self.cache.is_cached(id) {
            return true;
        }
        if self.persistence.exists(id).unwrap_or(false) {
            return true;
        }
        providers.iter().any(|p| p.has_item_state(id))
    }

    fn load_local(&self, id: &ItemId) -> Result<SharedHandle> {
        let state = match id {
            ItemId::NodeId(uuid) => {
                let data = self.persistence.load_node(*uuid)?;
                ItemState::new_node(Status::Existing, self.definition_for_node(&data), data)
            }
            ItemId::PropertyId(parent, name) => {
                let data = self.persistence.load_property(*parent, &name.to_name())?;
                ItemState::new_property(
                    Status::Existing,
                    self.definition_for_property(&data),
                    data,
                )
            }
        };
        let handle: SharedHandle = Arc::new(RwLock::new(state));
        self.register_self_as_listener(&handle);
        self.cache.cache(handle.clone())?;
        Ok(handle)
    }

    fn resolve_from_provider(
        &self,
        provider: &dyn VirtualProvider,
        id: &ItemId,
    ) -> Result<SharedHandle> {
        if let Some(state) = self.cache.retrieve(id) {
            return Ok(state);
        }
        let state = provider
            .get_item_state(id)
            .map_err(|_| Error::NoSuchItem(id.clone()))?;
        let handle: SharedHandle = Arc::new(RwLock::new(state));
        self.register_self_as_listener(&handle);
        self.cache.cache(handle.clone())?;
        Ok(handle)
    }

    fn definition_for_node(&self, data: &NodeData) -> DefinitionId {
        // The node-type registry only exposes property-definition and root
        // lookups (§6); a loaded node's own definition id is derived
        // directly from its type name rather than round-tripping through
        // the registry.
        DefinitionId(data.node_type_name.to_string())
    }

    fn definition_for_property(&self, data: &PropertyData) -> DefinitionId {
        DefinitionId(format!("{}/{}", data.parent_uuid, data.qname))
    }

    fn register_self_as_listener(&self, handle: &SharedHandle) {
        let weak: Weak<dyn StateListener> = self.self_handle();
        handle.write().register_listener(weak);
    }

    /// Loads the reference bundle targeting `target`. Never cached by this
    /// layer: the commit path is the only writer and re-reads per commit,
    /// so a cache would need invalidation on every commit touching a
    /// matching target and buys nothing today (§9, Open Question 3).
    pub fn get_node_references(&self, target: Uuid) -> Result<NodeReferences> {
        self.check_not_poisoned()?;
        if let Ok(refs) = self.persistence.load_references(NodeReferencesId(target)) {
            return Ok(refs);
        }
        let providers = self.providers.read().clone();
        for provider in providers.iter() {
            if let Ok(refs) = provider.get_node_references(NodeReferencesId(target)) {
                return Ok(refs);
            }
        }
        Ok(NodeReferences::empty(target))
    }

    /// The central operation (§4.2): validates, reconnects, persists, and
    /// publishes `log` as one commit. Serialized by the manager's commit
    /// mutex (§5).
    pub fn store(
        &self,
        mut log: ChangeLog,
        observation: Option<&dyn ObservationManager>,
    ) -> Result<()> {
        let _guard = self.commit_mutex.lock();
        self.check_not_poisoned()?;

        let providers = self.providers.read().clone();

        // Phase A: reference validation and splitting.
        let mut shared_refs = Vec::new();
        let mut virtual_refs = Vec::new();
        for refs in log.modified_refs_iter() {
            let target = refs.target();
            if providers.iter().any(|p| p.has_item_state(&ItemId::node(target))) {
                virtual_refs.push(refs.clone());
                continue;
            }
            if !refs.is_empty() {
                let target_id = ItemId::node(target);
                let present_in_log = log.get(&target_id).is_some() && !log.is_deleted(&target_id);
                if !present_in_log && !self.has_item_state(&target_id) {
                    return Err(Error::ReferentialIntegrity { target });
                }
            }
            shared_refs.push(refs.clone());
        }

        // Phase B: reconnection.
        let mut added_shared = Vec::new();
        let mut modified_shared = Vec::new();
        let mut deleted_shared = Vec::new();

        for transient in log.added_iter_mut() {
            let shared_state = self
                .persistence
                .create_new(transient.id(), transient.definition_id().clone());
            let handle: SharedHandle = Arc::new(RwLock::new(shared_state));
            self.register_self_as_listener(&handle);
            transient.connect(handle.clone())?;
            added_shared.push(handle);
        }
        for transient in log.modified_iter_mut() {
            let handle = self.get_item_state(transient.id())?;
            transient.connect(handle.clone())?;
            modified_shared.push(handle);
        }
        for transient in log.deleted_iter_mut() {
            let handle = self.get_item_state(transient.id())?;
            transient.connect(handle.clone())?;
            deleted_shared.push(handle);
        }

        // Phase C: event preparation, pure over the pre-push snapshot.
        let mut prepared_events = observation.map(|obs| {
            let derived = events::derive_events(&log, &ManagerEventSource(self));
            let mut collection = obs.create_event_state_collection();
            if let Err(err) = collection.create_event_states(self.root_uuid, derived) {
                warn!("observation manager rejected prepared events: {}", err);
            }
            collection.prepare();
            collection
        });

        // Phase E: durable store, one atomic unit. Built directly from the
        // local log's own (already-final) payloads rather than from the
        // shared peers, so nothing in shared state is touched before
        // persistence has actually succeeded — see Phase D/F below.
        let shared_log = self.snapshot_local_log(&log, &shared_refs);
        if let Err(err) = self.persistence.store(&shared_log) {
            self.poisoned.store(true, Ordering::SeqCst);
            return Err(Error::PersistenceFailure(err.to_string()));
        }

        // Phase D+F: push transient data into each shared peer and flip its
        // post-commit status under one write-lock acquisition per state
        // (`push_and_persist`), so a concurrent `handle.read()` can never
        // land in the gap between "new payload, old status" that two
        // separate critical sections would allow (Testable Property 2).
        for transient in log.added_iter() {
            transient.push_and_persist();
        }
        for transient in log.modified_iter() {
            transient.push_and_persist();
        }
        for transient in log.deleted_iter() {
            transient.push_and_persist();
        }
        for handle in &added_shared {
            handle.read().notify_created(handle.clone());
        }
        for handle in &modified_shared {
            handle.read().notify_modified(handle.clone());
        }
        for handle in &deleted_shared {
            handle.read().notify_destroyed(handle.clone());
        }

        // Phase G: virtual reference handoff.
        for refs in virtual_refs {
            let mut accepted = false;
            for provider in providers.iter() {
                if provider.set_node_references(refs.clone()) {
                    accepted = true;
                    break;
                }
            }
            if !accepted {
                debug!(
                    "no virtual provider accepted reference bundle for {}",
                    refs.target()
                );
            }
        }

        // Phase H: event dispatch, strictly after successful persistence.
        if let Some(mut collection) = prepared_events.take() {
            collection.dispatch();
        }

        Ok(())
    }

    /// Builds the change log handed to the persistence engine (Phase E)
    /// directly from `log`'s own transient states, which already carry the
    /// session's final payload for each item — connected shared peers are
    /// deliberately left untouched until after `store` succeeds (Phase D/F).
    fn snapshot_local_log(&self, log: &ChangeLog, refs: &[NodeReferences]) -> ChangeLog {
        let mut shared_log = ChangeLog::new();
        for state in log.added_iter() {
            shared_log.added(state.snapshot());
        }
        for state in log.modified_iter() {
            shared_log.modified(state.snapshot());
        }
        for state in log.deleted_iter() {
            shared_log.deleted(state.snapshot());
        }
        for r in refs {
            shared_log.modified_refs(r.clone());
        }
        shared_log
    }
}

/// Adapts the manager as the `source` half of [`events::derive_events`]'s
/// shared-state view, without leaking `events`'s narrow trait into the
/// manager's own public surface.
struct ManagerEventSource<'a>(&'a SharedItemStateManager);

impl<'a> ItemStateSource for ManagerEventSource<'a> {
    fn lookup_node(&self, uuid: Uuid) -> Option<NodeData> {
        self.0
            .get_item_state(&ItemId::node(uuid))
            .ok()
            .and_then(|handle| handle.read().as_node().cloned())
    }
}

impl StateListener for SharedItemStateManager {
    fn state_created(&self, state: SharedHandle) {
        let id = state.read().id().clone();
        if !self.cache.is_cached(&id) {
            let _ = self.cache.cache(state);
        }
    }

    fn state_modified(&self, _state: SharedHandle) {
        // No cache-identity implication (§4.2).
    }

    fn state_destroyed(&self, state: SharedHandle) {
        let id = {
            let mut guard = state.write();
            guard.clear_listeners();
            guard.id().clone()
        };
        self.cache.evict(&id);
    }

    fn state_discarded(&self, state: SharedHandle) {
        self.state_destroyed(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, RecordingObservationManager};
    use crate::identity::PropertyType;
    use crate::persistence::MemoryPersistenceManager;
    use crate::virtual_provider::VirtualProvider;

    const ROOT_UUID: &str = "cafebabe-0000-0000-0000-000000000001";

    fn fresh_manager() -> (Arc<SharedItemStateManager>, Arc<MemoryPersistenceManager>) {
        let persistence = Arc::new(MemoryPersistenceManager::new());
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let manager = SharedItemStateManager::bootstrap(
            root_uuid,
            persistence.clone(),
            persistence.clone(),
        )
        .unwrap();
        (manager, persistence)
    }

    fn add_child_log(
        manager: &SharedItemStateManager,
        root_uuid: Uuid,
        child_uuid: Uuid,
        child_name: &str,
    ) -> ChangeLog {
        let root_handle = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        let mut root_transient = {
            let guard = root_handle.read();
            ItemState::new_node(
                Status::Existing,
                guard.definition_id().clone(),
                guard.as_node().unwrap().clone(),
            )
        };
        root_transient
            .as_node_mut()
            .unwrap()
            .add_child(Name::new(child_name), child_uuid);

        let child_node = ItemState::new_node(
            Status::New,
            DefinitionId("nt:unstructured".into()),
            NodeData {
                uuid: child_uuid,
                parent_uuid: Some(root_uuid),
                node_type_name: Name::new("nt:unstructured"),
                mixin_types: Vec::new(),
                children: Vec::new(),
                property_names: vec![NameKey::from(&Name::new("jcr:primaryType"))],
            },
        );
        let child_primary_type = ItemState::new_property(
            Status::New,
            DefinitionId("nt:unstructured/jcr:primaryType".into()),
            PropertyData {
                qname: Name::new("jcr:primaryType"),
                parent_uuid: child_uuid,
                value_type: PropertyType::Name,
                multi_valued: false,
                values: vec![InternalValue::Name(Name::new("nt:unstructured"))],
            },
        );

        let mut log = ChangeLog::new();
        log.modified(root_transient);
        log.added(child_node);
        log.added(child_primary_type);
        log
    }

    #[test]
    fn scenario_1_bootstrap_creates_root() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let handle = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        let guard = handle.read();
        let node = guard.as_node().unwrap();
        assert_eq!(node.node_type_name, Name::new("rep:root"));
        assert!(node.property_names.contains(&NameKey::from(&Name::new("jcr:primaryType"))));

        let prop_handle = manager
            .get_item_state(&ItemId::property(root_uuid, Name::new("jcr:primaryType")))
            .unwrap();
        let prop = prop_handle.read();
        let prop_data = prop.as_property().unwrap();
        assert_eq!(prop_data.values, vec![InternalValue::Name(Name::new("rep:root"))]);
    }

    #[test]
    fn scenario_2_add_node_appears_as_root_child() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let child_uuid: Uuid = "cafebabe-0000-0000-0000-000000000002"
            .parse()
            .unwrap();

        let log = add_child_log(&manager, root_uuid, child_uuid, "my:child");
        manager.store(log, None).unwrap();

        assert!(manager.has_item_state(&ItemId::node(child_uuid)));
        let root = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        let root_guard = root.read();
        let entry = root_guard
            .as_node()
            .unwrap()
            .children
            .iter()
            .find(|e| e.uuid == child_uuid)
            .unwrap();
        assert_eq!(entry.name, Name::new("my:child"));
        assert_eq!(entry.index, 1);
    }

    #[test]
    fn scenario_3_reference_integrity_rejects_dangling() {
        let (manager, _persistence) = fresh_manager();
        let missing_target: Uuid = "00000000-0000-0000-0000-000000000999"
            .parse()
            .unwrap();
        let referring_prop = ItemId::property(Uuid::new_v4(), Name::new("my:ref"));

        let mut refs = NodeReferences::empty(missing_target);
        refs.add(referring_prop);
        let mut log = ChangeLog::new();
        log.modified_refs(refs);

        let err = manager.store(log, None).unwrap_err();
        assert!(matches!(
            err,
            Error::ReferentialIntegrity { target } if target == missing_target
        ));
        assert!(!manager.has_item_state(&ItemId::node(missing_target)));
    }

    struct VersionRootProvider {
        root: Uuid,
        extra: Uuid,
    }

    impl VirtualProvider for VersionRootProvider {
        fn virtual_root_id(&self) -> Uuid {
            self.root
        }

        fn has_item_state(&self, id: &ItemId) -> bool {
            matches!(id, ItemId::NodeId(uuid) if *uuid == self.root || *uuid == self.extra)
        }

        fn get_item_state(&self, id: &ItemId) -> Result<ItemState> {
            match id {
                ItemId::NodeId(uuid) if *uuid == self.root || *uuid == self.extra => {
                    Ok(self.create_node_state(
                        Uuid::nil(),
                        Name::new("jcr:system"),
                        *uuid,
                        Name::new("rep:versionStorage"),
                        DefinitionId("rep:versionStorage".into()),
                    ))
                }
                other => Err(Error::NoSuchItem(other.clone())),
            }
        }

        fn get_node_references(
            &self,
            _id: NodeReferencesId,
        ) -> Result<NodeReferences> {
            Err(Error::NoSuchItem(ItemId::node(self.root)))
        }

        fn set_node_references(&self, _refs: NodeReferences) -> bool {
            false
        }
    }

    #[test]
    fn scenario_4_virtual_overlay_precedence() {
        let (manager, _persistence) = fresh_manager();
        let vroot: Uuid = Uuid::new_v4();
        let extra: Uuid = Uuid::new_v4();
        manager.add_virtual_provider(Arc::new(VersionRootProvider { root: vroot, extra }));

        let handle = manager.get_item_state(&ItemId::node(vroot)).unwrap();
        assert_eq!(
            handle.read().as_node().unwrap().node_type_name,
            Name::new("rep:versionStorage")
        );

        assert!(manager.has_item_state(&ItemId::node(extra)));
        let extra_handle = manager.get_item_state(&ItemId::node(extra)).unwrap();
        assert_eq!(
            extra_handle.read().as_node().unwrap().uuid,
            extra
        );
    }

    #[test]
    fn scenario_5_events_dispatch_only_after_store_succeeds() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let child_uuid = Uuid::new_v4();
        let log = add_child_log(&manager, root_uuid, child_uuid, "my:other-child");

        let observer = RecordingObservationManager::new();
        manager.store(log, Some(&observer)).unwrap();

        let dispatched = observer.dispatched();
        let node_added = dispatched
            .iter()
            .filter(|e| matches!(e, Event::NodeAdded { .. }))
            .count();
        let property_added = dispatched
            .iter()
            .filter(|e| matches!(e, Event::PropertyAdded { .. }))
            .count();
        assert_eq!(node_added, 1);
        assert_eq!(property_added, 1);
    }

    #[test]
    fn scenario_6_delete_cascades_cache_eviction() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let child_uuid = Uuid::new_v4();
        let add_log = add_child_log(&manager, root_uuid, child_uuid, "my:to-delete");
        manager.store(add_log, None).unwrap();
        assert!(manager.has_item_state(&ItemId::node(child_uuid)));

        let child_handle = manager.get_item_state(&ItemId::node(child_uuid)).unwrap();
        let deleted_transient = {
            let guard = child_handle.read();
            ItemState::new_node(
                Status::Existing,
                guard.definition_id().clone(),
                guard.as_node().unwrap().clone(),
            )
        };
        let mut delete_log = ChangeLog::new();
        delete_log.deleted(deleted_transient);
        manager.store(delete_log, None).unwrap();

        assert!(!manager.has_item_state(&ItemId::node(child_uuid)));
    }

    #[test]
    fn invariant_cache_identity_is_stable_within_a_quiescent_period() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let a = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        let b = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn invariant_eviction_is_idempotent_and_reloads() {
        let (manager, _persistence) = fresh_manager();
        let root_uuid: Uuid = ROOT_UUID.parse().unwrap();
        let _ = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        manager.dispose();
        manager.dispose();
        let reloaded = manager.get_item_state(&ItemId::node(root_uuid)).unwrap();
        assert_eq!(reloaded.read().id(), &ItemId::node(root_uuid));
    }

    #[test]
    fn persistence_failure_poisons_manager_until_reload() {
        struct FailingStore;
        impl PersistenceManager for FailingStore {
            fn load_node(&self, uuid: Uuid) -> Result<NodeData> {
                Err(Error::NoSuchItem(ItemId::node(uuid)))
            }
            fn load_property(
                &self,
                parent: Uuid,
                name: &Name,
            ) -> Result<PropertyData> {
                Err(Error::NoSuchItem(ItemId::property(parent, name.clone())))
            }
            fn load_references(
                &self,
                id: NodeReferencesId,
            ) -> Result<NodeReferences> {
                Err(Error::NoSuchItem(ItemId::node(id.0)))
            }
            fn exists(&self, _id: &ItemId) -> Result<bool> {
                Ok(false)
            }
            fn create_new(&self, id: &ItemId, definition_id: DefinitionId) -> ItemState {
                match id {
                    ItemId::NodeId(uuid) => ItemState::new_node(
                        Status::New,
                        definition_id,
                        NodeData {
                            uuid: *uuid,
                            parent_uuid: None,
                            node_type_name: Name::new("rep:root"),
                            mixin_types: Vec::new(),
                            children: Vec::new(),
                            property_names: Vec::new(),
                        },
                    ),
                    ItemId::PropertyId(parent, name) => ItemState::new_property(
                        Status::New,
                        definition_id,
                        PropertyData {
                            qname: name.to_name(),
                            parent_uuid: *parent,
                            value_type: PropertyType::Undefined,
                            multi_valued: false,
                            values: Vec::new(),
                        },
                    ),
                }
            }
            fn store(&self, _log: &ChangeLog) -> Result<()> {
                Err(Error::PersistenceFailure("disk full".into()))
            }
        }
        impl NodeTypeRegistry for FailingStore {
            fn root_definition(&self) -> Result<DefinitionId> {
                Ok(DefinitionId("rep:root".into()))
            }
            fn default_property_definition(&self, node_type: &Name) -> Result<DefinitionId> {
                Ok(DefinitionId(node_type.to_string()))
            }
            fn has_node_type(&self, _node_type: &Name) -> bool {
                true
            }
        }

        let root_uuid = Uuid::new_v4();
        let backend = Arc::new(FailingStore);
        let err = SharedItemStateManager::bootstrap(root_uuid, backend.clone(), backend)
            .unwrap_err();
        assert!(matches!(err, Error::PersistenceFailure(_)));
    }
}
