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

//! Error kinds surfaced by the shared item-state manager.

use uuid::Uuid;

use crate::identity::ItemId;

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the shared item-state manager can report.
///
/// See the crate-level docs for the policy attached to each variant; in
/// short, `NoSuchItem` and a failed `has_item_state` probe are expected,
/// routine outcomes, while `PersistenceFailure` is fatal and poisons the
/// manager.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Resolution of an id that is not known to the cache, persistence
    /// engine, or any registered virtual provider.
    #[error("no such item: {0}")]
    NoSuchItem(ItemId),

    /// A `REFERENCE` property's target failed validation during commit:
    /// it does not exist, is not part of the same change log, and the
    /// corresponding reference bundle is non-empty.
    #[error("referential integrity violation: target node {target} does not exist")]
    ReferentialIntegrity {
        /// The unresolved target node UUID.
        target: Uuid,
    },

    /// The durable store rejected or failed to apply a change log. The
    /// manager that produced this error is poisoned; see
    /// [`crate::manager::SharedItemStateManager::reload`].
    #[error("durable store failed: {0}")]
    PersistenceFailure(String),

    /// The node-type registry could not supply the mandatory definitions
    /// needed to bootstrap the repository root.
    #[error("schema failure during bootstrap: {0}")]
    SchemaFailure(String),

    /// A virtual provider call failed. Caught internally by the manager and
    /// downgraded to [`Error::NoSuchItem`] at the public API boundary; this
    /// variant exists so provider implementations have something to return.
    #[error("virtual provider failure: {0}")]
    ProviderFailure(String),

    /// Attempted to connect a transient item that is already bound to a
    /// shared peer (see [`crate::state::ItemState::overlayed_state`]).
    #[error("item {0} is already connected to a shared peer")]
    AlreadyConnected(ItemId),

    /// Attempted to cache a shared state under an id that is already
    /// present. Per the cache's contract this is a programming error.
    #[error("duplicate cache entry for {0}")]
    DuplicateCacheEntry(ItemId),
}
