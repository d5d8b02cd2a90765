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

//! Shared item-state manager for a hierarchical, versioned content
//! repository.
//!
//! This crate is the single authoritative in-memory view of a tree of nodes
//! and properties, identified by UUIDs, backed by a pluggable persistence
//! layer and served to concurrent sessions. Each session builds a transient
//! set of modifications (a [`ChangeLog`]) against snapshots observed
//! through [`SharedItemStateManager`]; the manager atomically validates,
//! reconciles, persists, and publishes those modifications to every other
//! observer.
//!
//! # Layout
//!
//! - [`identity`] — item ids, qualified names, and the scalar value model.
//! - [`state`] — the node/property state machine and the transient/shared
//!   overlay relation.
//! - [`change_log`] — a session's grouped set of pending mutations.
//! - [`cache`] — the identity map the manager keeps for shared states.
//! - [`manager`] — [`SharedItemStateManager`], the commit protocol, and the
//!   per-state listener contract.
//! - [`virtual_provider`] — the overlay-namespace trait for things like a
//!   version-history subtree.
//! - [`events`] — event derivation and the observation-manager seam.
//! - [`persistence`] — the durable-store and node-type-registry traits this
//!   crate consumes, plus an in-memory reference implementation.
//! - [`error`] — the crate's `Error` enum and `Result` alias.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use item_store::change_log::ChangeLog;
//! use item_store::identity::{InternalValue, ItemId, Name, NameKey, PropertyType};
//! use item_store::manager::SharedItemStateManager;
//! use item_store::persistence::MemoryPersistenceManager;
//! use item_store::state::{DefinitionId, ItemState, NodeData, PropertyData, Status};
//!
//! let backend = Arc::new(MemoryPersistenceManager::new());
//! let root_uuid = Uuid::new_v4();
//! let manager = SharedItemStateManager::bootstrap(root_uuid, backend.clone(), backend)
//!     .expect("bootstrap");
//!
//! let root = manager.get_item_state(&ItemId::node(root_uuid)).expect("root");
//! assert_eq!(root.read().as_node().unwrap().node_type_name, Name::new("rep:root"));
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod change_log;
pub mod error;
pub mod events;
pub mod identity;
pub mod manager;
pub mod persistence;
pub mod state;
pub mod virtual_provider;

pub use crate::error::{Error, Result};
pub use crate::manager::SharedItemStateManager;
