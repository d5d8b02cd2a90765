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

//! In-memory representation of a node or property, its status machine, and
//! the overlay relation between a transient session-local copy and the
//! shared state it is bound to.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::{InternalValue, ItemId, Name, NameKey, PropertyType};

/// Shared ownership handle for a cached item state.
///
/// Every entry in the [`crate::cache::ItemStateCache`] and every
/// `overlayed_state` pointer on a transient [`ItemState`] is one of these.
pub type SharedHandle = Arc<RwLock<ItemState>>;

/// Opaque reference into the node-type/property-definition catalog.
///
/// The catalog itself lives outside this crate (see
/// [`crate::persistence::NodeTypeRegistry`]); this crate only ever stores
/// and compares the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionId(pub String);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The status an item state can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Newly created, not yet persisted.
    New,
    /// Persisted and unmodified.
    Existing,
    /// Persisted, and has an in-flight modification overlaid on it.
    ExistingModified,
    /// Persisted, and marked for removal by an in-flight change log.
    ExistingRemoved,
    /// A cached shared state has gone stale relative to a concurrent
    /// modification and needs reloading before further use.
    StaleModified,
    /// A cached shared state's backing item no longer exists.
    StaleDestroyed,
    /// Status not yet determined (freshly constructed, unconnected
    /// transient state).
    Undefined,
}

impl Status {
    /// Per spec invariant 1: every *cached shared* state must be in one of
    /// these two statuses.
    pub fn valid_for_shared_cache(self) -> bool {
        matches!(self, Status::Existing | Status::ExistingModified)
    }
}

/// One child-node entry in a node's ordered child list: the child's name,
/// its UUID, and its 1-based index among same-name siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    /// The child's name.
    pub name: Name,
    /// The child node's UUID.
    pub uuid: Uuid,
    /// 1-based index within the sibling group sharing `name`.
    pub index: u32,
}

/// Node-specific state: identifying fields, mixins, ordered children, and
/// the set of property names the node owns.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// The node's own UUID.
    pub uuid: Uuid,
    /// The parent node's UUID; `None` only for the repository root.
    pub parent_uuid: Option<Uuid>,
    /// The primary node type name.
    pub node_type_name: Name,
    /// Mixin type names applied to this node.
    pub mixin_types: Vec<Name>,
    /// Ordered child-node entries; order is significant and explicit.
    pub children: Vec<ChildEntry>,
    /// Names of properties this node owns (does not carry their values).
    pub property_names: Vec<NameKey>,
}

impl NodeData {
    /// Appends a child, assigning it the next 1-based index within its
    /// same-name sibling group (invariant 6).
    pub fn add_child(&mut self, name: Name, uuid: Uuid) {
        let index = self
            .children
            .iter()
            .filter(|entry| entry.name == name)
            .count() as u32
            + 1;
        self.children.push(ChildEntry { name, uuid, index });
    }

    /// Removes a child by UUID, if present.
    pub fn remove_child(&mut self, uuid: Uuid) {
        self.children.retain(|entry| entry.uuid != uuid);
    }
}

/// Property-specific state: its qualified name, parent, scalar type, and
/// ordered value list.
#[derive(Debug, Clone)]
pub struct PropertyData {
    /// The property's qualified name.
    pub qname: Name,
    /// The owning node's UUID.
    pub parent_uuid: Uuid,
    /// The property's scalar type.
    pub value_type: PropertyType,
    /// Whether this property holds zero-or-more values rather than exactly
    /// one.
    pub multi_valued: bool,
    /// The property's current values, in order.
    pub values: Vec<InternalValue>,
}

/// The node- or property-specific payload of an [`ItemState`].
#[derive(Debug, Clone)]
pub enum ItemPayload {
    /// See [`NodeData`].
    Node(NodeData),
    /// See [`PropertyData`].
    Property(PropertyData),
}

/// Receives status-transition notifications from an [`ItemState`] it has
/// registered interest in.
///
/// Registration is weak by contract: an `ItemState` never keeps a listener
/// alive, and a dead listener is silently dropped the next time the state
/// tries to notify it. The [`crate::manager::SharedItemStateManager`] is the
/// only listener implementation in this crate.
pub trait StateListener: Send + Sync {
    /// A new shared state has become visible (Phase F, added items).
    fn state_created(&self, state: SharedHandle);
    /// A shared state was modified in place. No cache-identity implication.
    fn state_modified(&self, state: SharedHandle);
    /// A shared state was destroyed by a successful commit (Phase F,
    /// deleted items).
    fn state_destroyed(&self, state: SharedHandle);
    /// A shared state was invalidated by an external signal unrelated to
    /// this manager's own commits (e.g. a virtual provider root swap).
    fn state_discarded(&self, state: SharedHandle);
}

/// In-memory representation of a node or property.
///
/// A state is either a *shared* state — cached, authoritative, status always
/// [`Status::Existing`] or [`Status::ExistingModified`] while cached — or a
/// *transient* state presented by a session, which may hold an
/// `overlayed_state` pointer binding it 1:1 to the shared peer it will push
/// its data into at commit time.
pub struct ItemState {
    id: ItemId,
    status: Status,
    definition_id: DefinitionId,
    overlayed_state: Option<SharedHandle>,
    listeners: Vec<Weak<dyn StateListener>>,
    payload: ItemPayload,
}

impl ItemState {
    /// Builds a new node state.
    pub fn new_node(status: Status, definition_id: DefinitionId, data: NodeData) -> Self {
        ItemState {
            id: ItemId::NodeId(data.uuid),
            status,
            definition_id,
            overlayed_state: None,
            listeners: Vec::new(),
            payload: ItemPayload::Node(data),
        }
    }

    /// Builds a new property state.
    pub fn new_property(status: Status, definition_id: DefinitionId, data: PropertyData) -> Self {
        ItemState {
            id: ItemId::PropertyId(data.parent_uuid, NameKey::from(&data.qname)),
            status,
            definition_id,
            overlayed_state: None,
            listeners: Vec::new(),
            payload: ItemPayload::Property(data),
        }
    }

    /// This state's identity.
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Sets the status directly. Used by the manager during the commit
    /// protocol and by `persisted()`.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Total discriminator: true when this state denotes a node.
    pub fn is_node(&self) -> bool {
        matches!(self.payload, ItemPayload::Node(_))
    }

    /// Opaque node-type/property-definition reference.
    pub fn definition_id(&self) -> &DefinitionId {
        &self.definition_id
    }

    /// The shared peer this transient state overlays, if any.
    pub fn overlayed_state(&self) -> Option<&SharedHandle> {
        self.overlayed_state.as_ref()
    }

    /// Read-only access to the node payload, if this is a node.
    pub fn as_node(&self) -> Option<&NodeData> {
        match &self.payload {
            ItemPayload::Node(data) => Some(data),
            ItemPayload::Property(_) => None,
        }
    }

    /// Mutable access to the node payload, if this is a node.
    pub fn as_node_mut(&mut self) -> Option<&mut NodeData> {
        match &mut self.payload {
            ItemPayload::Node(data) => Some(data),
            ItemPayload::Property(_) => None,
        }
    }

    /// Read-only access to the property payload, if this is a property.
    pub fn as_property(&self) -> Option<&PropertyData> {
        match &self.payload {
            ItemPayload::Property(data) => Some(data),
            ItemPayload::Node(_) => None,
        }
    }

    /// Mutable access to the property payload, if this is a property.
    pub fn as_property_mut(&mut self) -> Option<&mut PropertyData> {
        match &mut self.payload {
            ItemPayload::Property(data) => Some(data),
            ItemPayload::Node(_) => None,
        }
    }

    /// One-shot binder: connects this transient state to its shared peer.
    ///
    /// Returns [`Error::AlreadyConnected`] if this state is already bound,
    /// per spec invariant 2 ("at most one transient overlay may exist *per
    /// session* for a given shared id").
    pub fn connect(&mut self, shared: SharedHandle) -> Result<()> {
        if self.overlayed_state.is_some() {
            return Err(Error::AlreadyConnected(self.id.clone()));
        }
        self.overlayed_state = Some(shared);
        Ok(())
    }

    /// Builds a detached copy of this state's identity, status, definition
    /// and payload, with no overlay link and no listeners.
    ///
    /// Used by the manager to hand persistence a snapshot of shared-state
    /// data to store (Phase E), decoupled from the live `Arc<RwLock<_>>`
    /// handle and its registered listeners.
    pub fn snapshot(&self) -> ItemState {
        ItemState {
            id: self.id.clone(),
            status: self.status,
            definition_id: self.definition_id.clone(),
            overlayed_state: None,
            listeners: Vec::new(),
            payload: self.payload.clone(),
        }
    }

    /// Copies this transient state's working data into its overlayed shared
    /// peer (Phase D). No-op if unconnected.
    pub fn push_into_overlay(&self) {
        if let Some(shared) = &self.overlayed_state {
            let mut target = shared.write();
            target.payload = self.payload.clone();
        }
    }

    /// Copies this transient state's working data into its overlayed shared
    /// peer *and* applies the shared peer's post-commit status transition,
    /// under a single write-lock acquisition. No-op if unconnected.
    ///
    /// This is Phase D and Phase F's status flip merged into one atomic
    /// step: a reader taking `shared.read()` either sees the pre-commit
    /// payload paired with the pre-commit status, or the pushed payload
    /// paired with the post-commit status — never a hybrid of the two,
    /// which two separate `write()` acquisitions (push, then later
    /// `persisted()`) would allow a concurrent reader to observe in the gap
    /// between them.
    pub fn push_and_persist(&self) {
        if let Some(shared) = &self.overlayed_state {
            let mut target = shared.write();
            target.payload = self.payload.clone();
            target.persisted();
        }
    }

    /// Registers a weak listener. Registration is order-independent and
    /// duplicate-safe per §5: callers are expected to register once per
    /// load/create, but re-registering the same listener is harmless
    /// because notification iterates and skips dead entries rather than
    /// deduplicating by identity.
    pub fn register_listener(&mut self, listener: Weak<dyn StateListener>) {
        self.listeners.push(listener);
    }

    /// Drops every registered listener (used when a state is evicted or
    /// destroyed).
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    fn notify(&self, handle: SharedHandle, f: impl Fn(&dyn StateListener, SharedHandle)) {
        for weak in &self.listeners {
            if let Some(listener) = weak.upgrade() {
                f(listener.as_ref(), handle.clone());
            }
        }
    }

    /// Fires `state_created` on every live listener.
    pub fn notify_created(&self, handle: SharedHandle) {
        self.notify(handle, |l, h| l.state_created(h));
    }

    /// Fires `state_modified` on every live listener.
    pub fn notify_modified(&self, handle: SharedHandle) {
        self.notify(handle, |l, h| l.state_modified(h));
    }

    /// Fires `state_destroyed` on every live listener.
    pub fn notify_destroyed(&self, handle: SharedHandle) {
        self.notify(handle, |l, h| l.state_destroyed(h));
    }

    /// Fires `state_discarded` on every live listener.
    pub fn notify_discarded(&self, handle: SharedHandle) {
        self.notify(handle, |l, h| l.state_discarded(h));
    }

    /// Applies the post-commit status transition for a shared state (Phase
    /// F): `New` -> `Existing`, `ExistingModified` -> `Existing`,
    /// `ExistingRemoved` -> `StaleDestroyed` (the caller evicts and fires
    /// `state_destroyed` separately).
    pub fn persisted(&mut self) {
        self.status = match self.status {
            Status::New => Status::Existing,
            Status::ExistingModified => Status::Existing,
            Status::ExistingRemoved => Status::StaleDestroyed,
            other => other,
        };
    }
}

impl fmt::Debug for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemState")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("definition_id", &self.definition_id)
            .field("is_connected", &self.overlayed_state.is_some())
            .field("payload", &self.payload)
            .finish()
    }
}
