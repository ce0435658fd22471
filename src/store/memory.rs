//! In-process [`RealtimeStore`] backend with connection simulation.
//!
//! One JSON tree shared by any number of simulated clients: subtree change
//! notifications, single-key transactions, and per-connection disconnect
//! hooks. [`MemoryClient::sever`] stands in for a network link going down,
//! which is what the integration tests and the demo binary exercise.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};

use crate::model::now_millis;
use crate::store::{
    DisconnectAction, RealtimeStore, StoreError, StorePath, StoreResult, Subscription, TransactFn,
};

/// Hub owning the shared tree. Hand out one [`MemoryClient`] per simulated
/// participant connection.
pub struct MemoryStore {
    core: Arc<StoreCore>,
}

struct StoreCore {
    inner: Mutex<TreeInner>,
    hooks: DashMap<u64, Vec<(StorePath, DisconnectAction)>>,
    live: DashSet<u64>,
    next_connection: AtomicU64,
    next_key: AtomicU64,
}

struct TreeInner {
    tree: Value,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    path: StorePath,
    connection: u64,
    sender: mpsc::UnboundedSender<Option<Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            core: Arc::new(StoreCore {
                inner: Mutex::new(TreeInner {
                    tree: Value::Object(Map::new()),
                    subscribers: Vec::new(),
                }),
                hooks: DashMap::new(),
                live: DashSet::new(),
                next_connection: AtomicU64::new(1),
                next_key: AtomicU64::new(0),
            }),
        }
    }

    /// Open a new client connection.
    pub fn client(&self) -> MemoryClient {
        let connection = self.core.next_connection.fetch_add(1, Ordering::Relaxed);
        self.core.live.insert(connection);
        MemoryClient {
            core: Arc::clone(&self.core),
            connection,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One simulated client connection to a [`MemoryStore`].
///
/// Clones share the connection. Dropping a handle does not sever the
/// connection; call [`MemoryClient::sever`] to simulate the link dropping.
#[derive(Clone)]
pub struct MemoryClient {
    core: Arc<StoreCore>,
    connection: u64,
}

impl MemoryClient {
    /// Simulate an unclean disconnect.
    ///
    /// This client's subscriptions close, further operations fail with
    /// [`StoreError::Disconnected`], and the registered disconnect actions
    /// are applied by the store exactly once. The dying client never
    /// observes them, matching a real backend running them server-side.
    pub async fn sever(&self) {
        if self.core.live.remove(&self.connection).is_none() {
            return;
        }
        let hooks = self
            .core
            .hooks
            .remove(&self.connection)
            .map(|(_, actions)| actions)
            .unwrap_or_default();

        let mut inner = self.core.inner.lock().await;
        inner
            .subscribers
            .retain(|subscriber| subscriber.connection != self.connection);
        for (path, action) in hooks {
            match action {
                DisconnectAction::Set(value) => inner.apply(&path, Some(value)),
                DisconnectAction::Delete => inner.apply(&path, None),
            }
        }
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.core.live.contains(&self.connection) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

impl RealtimeStore for MemoryClient {
    fn put(&self, path: StorePath, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let mut inner = client.core.inner.lock().await;
            inner.apply(&path, Some(value));
            Ok(())
        })
    }

    fn update(
        &self,
        path: StorePath,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let mut inner = client.core.inner.lock().await;
            inner.apply_update(&path, fields);
            Ok(())
        })
    }

    fn read(&self, path: StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let inner = client.core.inner.lock().await;
            Ok(value_at(&inner.tree, &path).cloned())
        })
    }

    fn delete(&self, path: StorePath) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let mut inner = client.core.inner.lock().await;
            inner.apply(&path, None);
            Ok(())
        })
    }

    fn transact(
        &self,
        path: StorePath,
        mut apply: TransactFn,
    ) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let mut inner = client.core.inner.lock().await;
            let current = value_at(&inner.tree, &path).cloned();
            let next = apply(current);
            inner.apply(&path, next.clone());
            Ok(next.filter(|value| !value.is_null()))
        })
    }

    fn subscribe(&self, path: StorePath) -> BoxFuture<'static, StoreResult<Subscription>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            let mut inner = client.core.inner.lock().await;
            let (sender, receiver) = mpsc::unbounded_channel();
            let _ = sender.send(value_at(&inner.tree, &path).cloned());
            inner.subscribers.push(Subscriber {
                path,
                connection: client.connection,
                sender,
            });
            Ok(Subscription::new(receiver))
        })
    }

    fn on_disconnect(
        &self,
        path: StorePath,
        action: DisconnectAction,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let client = self.clone();
        Box::pin(async move {
            client.ensure_live()?;
            client
                .core
                .hooks
                .entry(client.connection)
                .or_default()
                .push((path, action));
            Ok(())
        })
    }

    fn generate_key(&self, _parent: &StorePath) -> String {
        // Millisecond prefix plus a process-wide counter: unique, and the
        // zero-padded hex form sorts in creation order.
        let sequence = self.core.next_key.fetch_add(1, Ordering::Relaxed);
        format!("{:012x}{:06x}", now_millis(), sequence & 0xff_ffff)
    }
}

impl TreeInner {
    /// Apply one mutation and fan out snapshots to affected subscribers.
    /// Writing `Value::Null` removes the path.
    fn apply(&mut self, path: &StorePath, next: Option<Value>) {
        let next = next.filter(|value| !value.is_null());
        let segments: Vec<&str> = path.segments().collect();
        if write_at(&mut self.tree, &segments, next.as_ref()) {
            self.notify(path);
        }
    }

    /// Merge fields into the object at `path`; a null field removes that
    /// child. Affected subscribers see one coalesced snapshot.
    fn apply_update(&mut self, path: &StorePath, fields: Map<String, Value>) {
        let mut changed = false;
        for (key, value) in fields {
            let child = path.child(&key);
            let segments: Vec<&str> = child.segments().collect();
            let next = if value.is_null() { None } else { Some(value) };
            changed |= write_at(&mut self.tree, &segments, next.as_ref());
        }
        if changed {
            self.notify(path);
        }
    }

    /// Send the current snapshot at every subscribed path that can observe a
    /// change at `origin`: the path itself, its ancestors, its descendants.
    /// Subscribers whose receiving end is gone are pruned here.
    fn notify(&mut self, origin: &StorePath) {
        let tree = &self.tree;
        self.subscribers.retain(|subscriber| {
            if !(subscriber.path.contains(origin) || origin.contains(&subscriber.path)) {
                return !subscriber.sender.is_closed();
            }
            let snapshot = value_at(tree, &subscriber.path).cloned();
            subscriber.sender.send(snapshot).is_ok()
        });
    }
}

/// Read the node at `path`, treating traversal through a non-object as
/// absent.
fn value_at<'a>(node: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut current = node;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write (`Some`) or remove (`None`) the node at `segments`, creating
/// intermediate objects as needed and pruning the empty ones removals leave
/// behind. Returns whether the tree changed, so no-op mutations never notify.
fn write_at(node: &mut Value, segments: &[&str], next: Option<&Value>) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return match next {
            Some(value) if node == value => false,
            Some(value) => {
                *node = value.clone();
                true
            }
            None if node.is_null() => false,
            None => {
                *node = Value::Null;
                true
            }
        };
    };

    if !node.is_object() {
        let Some(next) = next else {
            return false;
        };
        let mut child = Value::Null;
        write_at(&mut child, rest, Some(next));
        // an empty object is indistinguishable from absence
        if child.is_null() || child.as_object().is_some_and(|m| m.is_empty()) {
            return false;
        }
        // writing under a leaf replaces the leaf
        let mut map = Map::new();
        map.insert((*head).to_string(), child);
        *node = Value::Object(map);
        return true;
    }
    let Some(map) = node.as_object_mut() else {
        return false;
    };

    if let Some(child) = map.get_mut(*head) {
        let changed = write_at(child, rest, next);
        let collapse = matches!(
            map.get(*head),
            Some(value) if value.is_null() || value.as_object().is_some_and(|m| m.is_empty())
        );
        if collapse {
            map.remove(*head);
        }
        changed
    } else {
        let Some(next) = next else {
            return false;
        };
        let mut child = Value::Null;
        write_at(&mut child, rest, Some(next));
        if child.is_null() || child.as_object().is_some_and(|m| m.is_empty()) {
            return false;
        }
        map.insert((*head).to_string(), child);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn path(raw: &str) -> StorePath {
        StorePath::new(raw)
    }

    #[tokio::test]
    async fn put_read_delete_round_trip() {
        let store = MemoryStore::new();
        let client = store.client();

        client
            .put(path("rooms/AAAAAA/gameOver"), json!(false))
            .await
            .unwrap();
        assert_eq!(
            client.read(path("rooms/AAAAAA/gameOver")).await.unwrap(),
            Some(json!(false))
        );

        client.delete(path("rooms/AAAAAA/gameOver")).await.unwrap();
        assert_eq!(client.read(path("rooms/AAAAAA/gameOver")).await.unwrap(), None);
        // the parent object collapsed once its last child went away
        assert_eq!(client.read(path("rooms/AAAAAA")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_sees_current_value_then_changes() {
        let store = MemoryStore::new();
        let client = store.client();

        client.put(path("a/b"), json!(1)).await.unwrap();
        let mut sub = client.subscribe(path("a/b")).await.unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!(1))));

        client.put(path("a/b"), json!(2)).await.unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!(2))));

        client.delete(path("a/b")).await.unwrap();
        assert_eq!(sub.recv().await, Some(None));
    }

    #[tokio::test]
    async fn child_writes_notify_ancestor_subscribers() {
        let store = MemoryStore::new();
        let client = store.client();

        let mut sub = client.subscribe(path("rooms/BBBBBB/presence")).await.unwrap();
        assert_eq!(sub.recv().await, Some(None));

        client
            .put(path("rooms/BBBBBB/presence/p1"), json!(true))
            .await
            .unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!({ "p1": true }))));
    }

    #[tokio::test]
    async fn ancestor_removal_notifies_descendant_subscribers() {
        let store = MemoryStore::new();
        let client = store.client();

        client
            .put(path("rooms/CCCCCC/currentRound"), json!({ "roundId": 1 }))
            .await
            .unwrap();
        let mut sub = client
            .subscribe(path("rooms/CCCCCC/currentRound"))
            .await
            .unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!({ "roundId": 1 }))));

        client.delete(path("rooms/CCCCCC")).await.unwrap();
        assert_eq!(sub.recv().await, Some(None));
    }

    #[tokio::test]
    async fn noop_mutations_do_not_notify() {
        let store = MemoryStore::new();
        let client = store.client();

        client.put(path("x"), json!(5)).await.unwrap();
        let mut sub = client.subscribe(path("x")).await.unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!(5))));

        // deleting something absent and rewriting an identical value are
        // both invisible
        client.delete(path("y")).await.unwrap();
        client.delete(path("y")).await.unwrap();
        client.put(path("x"), json!(5)).await.unwrap();

        client.put(path("x"), json!(6)).await.unwrap();
        assert_eq!(sub.recv().await, Some(Some(json!(6))));
    }

    #[tokio::test]
    async fn update_merges_without_clobbering_siblings() {
        let store = MemoryStore::new();
        let client = store.client();

        client
            .put(path("doc"), json!({ "a": 1, "b": 2 }))
            .await
            .unwrap();
        let mut fields = Map::new();
        fields.insert("b".to_string(), json!(3));
        fields.insert("c".to_string(), json!(4));
        client.update(path("doc"), fields).await.unwrap();

        assert_eq!(
            client.read(path("doc")).await.unwrap(),
            Some(json!({ "a": 1, "b": 3, "c": 4 }))
        );
    }

    #[tokio::test]
    async fn transactions_serialise_concurrent_increments() {
        let store = MemoryStore::new();
        let counter = path("publicRooms/DDDDDD/players");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let client = store.client();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                client
                    .transact(
                        counter,
                        Box::new(|current| {
                            let count =
                                current.as_ref().and_then(Value::as_u64).unwrap_or(0);
                            Some(Value::from(count + 1))
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let final_count = store.client().read(counter).await.unwrap();
        assert_eq!(final_count, Some(json!(20)));
    }

    #[tokio::test]
    async fn sever_runs_hooks_once_and_closes_subscriptions() {
        let store = MemoryStore::new();
        let dying = store.client();
        let observer = store.client();

        dying
            .put(path("rooms/EEEEEE/presence/p1"), json!(true))
            .await
            .unwrap();
        dying
            .on_disconnect(path("rooms/EEEEEE/presence/p1"), DisconnectAction::Delete)
            .await
            .unwrap();
        dying
            .on_disconnect(
                path("rooms/EEEEEE/cleanup"),
                DisconnectAction::Set(json!({ "timestamp": 1 })),
            )
            .await
            .unwrap();

        let mut own_sub = dying.subscribe(path("rooms/EEEEEE")).await.unwrap();
        assert!(own_sub.recv().await.is_some());
        let mut other_sub = observer
            .subscribe(path("rooms/EEEEEE/presence"))
            .await
            .unwrap();
        assert_eq!(other_sub.recv().await, Some(Some(json!({ "p1": true }))));

        dying.sever().await;
        dying.sever().await; // idempotent

        // the dying client's feed closed without observing its own hooks
        assert_eq!(own_sub.recv().await, None);
        // the survivor sees the presence entry vanish
        assert_eq!(other_sub.recv().await, Some(None));
        assert_eq!(
            observer.read(path("rooms/EEEEEE/cleanup")).await.unwrap(),
            Some(json!({ "timestamp": 1 }))
        );
        assert!(matches!(
            dying.read(path("rooms/EEEEEE")).await,
            Err(StoreError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn generated_keys_are_unique_and_ordered() {
        let store = MemoryStore::new();
        let client = store.client();
        let parent = path("rooms/FFFFFF/chat");

        let keys: Vec<String> = (0..32).map(|_| client.generate_key(&parent)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), 32);
    }

    #[test]
    fn write_at_prunes_empty_branches() {
        let mut tree = json!({});
        let put = json!(true);
        assert!(write_at(&mut tree, &["a", "b", "c"], Some(&put)));
        assert_eq!(tree, json!({ "a": { "b": { "c": true } } }));

        assert!(write_at(&mut tree, &["a", "b", "c"], None));
        assert_eq!(tree, json!({}));

        assert!(!write_at(&mut tree, &["a", "b", "c"], None));
    }

    #[test]
    fn writes_that_install_nothing_leave_leaves_alone() {
        let mut tree = json!({ "x": 5 });
        let empty = json!({});
        assert!(!write_at(&mut tree, &["x", "y"], Some(&empty)));
        assert_eq!(tree, json!({ "x": 5 }));

        assert!(!write_at(&mut tree, &["x", "y"], None));
        assert_eq!(tree, json!({ "x": 5 }));

        let put = json!(true);
        assert!(write_at(&mut tree, &["x", "y"], Some(&put)));
        assert_eq!(tree, json!({ "x": { "y": true } }));
    }
}
