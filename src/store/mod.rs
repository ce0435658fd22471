//! Contract of the shared realtime store and typed helpers over it.
//!
//! The engine never talks to a concrete backend directly: every operation
//! goes through [`RealtimeStore`], a connection-scoped handle mirroring what
//! hosted realtime databases offer. That means point writes, partial
//! updates, subtree change subscriptions, single-key transactions, and
//! actions the backend applies when the client's connection drops.

pub mod memory;
pub mod path;

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::{MemoryClient, MemoryStore};
pub use path::StorePath;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Mutation applied inside a single-key atomic transaction. Backends with
/// optimistic concurrency may call it more than once.
pub type TransactFn = Box<dyn FnMut(Option<Value>) -> Option<Value> + Send>;

/// Error raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The issuing client's connection is gone; the operation was not
    /// applied. Callers report it and move on; writes are at-most-once and
    /// never retried automatically.
    #[error("store connection closed")]
    Disconnected,
    /// A stored document did not match the expected shape.
    #[error("malformed document at `{path}`")]
    Malformed {
        /// Path of the offending document.
        path: String,
        /// Codec failure reported by serde.
        #[source]
        source: serde_json::Error,
    },
}

/// Action the store applies on the registering client's behalf when that
/// client's connection drops.
#[derive(Debug, Clone)]
pub enum DisconnectAction {
    /// Write the value at the registered path.
    Set(Value),
    /// Remove the registered path.
    Delete,
}

/// Live feed of snapshots for one path.
///
/// The current value is delivered first, then one snapshot per change at or
/// under the path, including removals of an ancestor. Dropping the handle
/// unsubscribes.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Subscription {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self { receiver }
    }

    /// Wait for the next snapshot; `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<Option<Value>> {
        self.receiver.recv().await
    }
}

/// One client's connection-scoped view of the shared realtime store.
///
/// The store guarantees writes to each individual path are applied in some
/// total order; there are no multi-path transactions or snapshots.
pub trait RealtimeStore: Send + Sync {
    /// Replace the value at `path`. Writing `Value::Null` removes it.
    fn put(&self, path: StorePath, value: Value) -> BoxFuture<'static, StoreResult<()>>;

    /// Merge `fields` into the object at `path`, creating it when absent.
    /// A `Value::Null` field removes that child.
    fn update(&self, path: StorePath, fields: Map<String, Value>)
    -> BoxFuture<'static, StoreResult<()>>;

    /// Read the value at `path`, `None` when absent.
    fn read(&self, path: StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Remove the value at `path`. Removing an absent path is a no-op.
    fn delete(&self, path: StorePath) -> BoxFuture<'static, StoreResult<()>>;

    /// Atomically rewrite the value at `path` through `apply`; no concurrent
    /// write can interleave. Returning `None` removes the path. Resolves to
    /// the final value.
    fn transact(
        &self,
        path: StorePath,
        apply: TransactFn,
    ) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Subscribe to snapshots of `path`: the current value first, then one
    /// per change in its subtree.
    fn subscribe(&self, path: StorePath) -> BoxFuture<'static, StoreResult<Subscription>>;

    /// Register an action the backend applies when this client's connection
    /// drops, with no further code running on the client.
    fn on_disconnect(
        &self,
        path: StorePath,
        action: DisconnectAction,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// Mint a unique child key under `parent`; keys sort in creation order.
    fn generate_key(&self, parent: &StorePath) -> String;
}

/// Encode a document for storage at `path`.
pub fn doc_value<T: Serialize>(path: &StorePath, doc: &T) -> StoreResult<Value> {
    serde_json::to_value(doc).map_err(|source| StoreError::Malformed {
        path: path.to_string(),
        source,
    })
}

/// Read and decode the document at `path`, `None` when absent.
pub async fn read_doc<T: DeserializeOwned>(
    store: &dyn RealtimeStore,
    path: StorePath,
) -> StoreResult<Option<T>> {
    let Some(value) = store.read(path.clone()).await? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Malformed {
            path: path.to_string(),
            source,
        })
}

/// Encode `doc` and write it at `path`.
pub async fn put_doc<T: Serialize>(
    store: &dyn RealtimeStore,
    path: StorePath,
    doc: &T,
) -> StoreResult<()> {
    let value = doc_value(&path, doc)?;
    store.put(path, value).await
}
