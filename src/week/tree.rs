use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgListener, types::Json, PgPool};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Entire subtree under one path, children ordered by numeric key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeSnapshot {
    pub children: Vec<(usize, Value)>,
}

impl TreeSnapshot {
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Real-time keyed tree. Every change pushes the whole subtree to subscribers.
#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn write(&self, path: &str, index: usize, node: Value) -> anyhow::Result<()>;
    /// Replaces the listed children, leaving the others untouched.
    async fn patch(&self, path: &str, nodes: BTreeMap<String, Value>) -> anyhow::Result<()>;
    async fn subscribe(&self, path: &str) -> anyhow::Result<watch::Receiver<TreeSnapshot>>;
}

fn parse_slot(key: &str) -> anyhow::Result<usize> {
    key.parse::<usize>()
        .with_context(|| format!("child key {:?} is not a slot index", key))
}

/// One watch channel per subscribed path. Channels without receivers are
/// dropped, so abandoned households do not pile up.
#[derive(Default)]
pub struct SnapshotHub {
    channels: Mutex<HashMap<String, watch::Sender<TreeSnapshot>>>,
}

impl SnapshotHub {
    /// Pushes to current subscribers; a path nobody follows is not tracked.
    pub fn publish(&self, path: &str, snapshot: TreeSnapshot) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = channels.get(path) else { return };
        if tx.receiver_count() == 0 {
            channels.remove(path);
            return;
        }
        tx.send_replace(snapshot);
    }

    /// `current` seeds the channel unless `path` is already followed, in
    /// which case the live channel is at least as fresh.
    pub fn subscribe(&self, path: &str, current: TreeSnapshot) -> watch::Receiver<TreeSnapshot> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.retain(|_, tx| tx.receiver_count() > 0);
        match channels.get(path) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(current);
                channels.insert(path.to_string(), tx);
                rx
            }
        }
    }

    #[cfg(test)]
    fn tracked_paths(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[derive(Default)]
pub struct MemoryTreeStore {
    nodes: Mutex<HashMap<String, BTreeMap<usize, Value>>>,
    hub: SnapshotHub,
}

impl MemoryTreeStore {
    fn apply(&self, path: &str, nodes: Vec<(usize, Value)>) -> TreeSnapshot {
        let mut tree = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let subtree = tree.entry(path.to_string()).or_default();
        subtree.extend(nodes);
        TreeSnapshot {
            children: subtree.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }

    fn snapshot(&self, path: &str) -> TreeSnapshot {
        let tree = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        TreeSnapshot {
            children: tree
                .get(path)
                .map(|s| s.iter().map(|(k, v)| (*k, v.clone())).collect())
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn write(&self, path: &str, index: usize, node: Value) -> anyhow::Result<()> {
        let snapshot = self.apply(path, vec![(index, node)]);
        self.hub.publish(path, snapshot);
        Ok(())
    }

    async fn patch(&self, path: &str, nodes: BTreeMap<String, Value>) -> anyhow::Result<()> {
        let parsed = nodes
            .into_iter()
            .map(|(k, v)| Ok((parse_slot(&k)?, v)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let snapshot = self.apply(path, parsed);
        self.hub.publish(path, snapshot);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> anyhow::Result<watch::Receiver<TreeSnapshot>> {
        Ok(self.hub.subscribe(path, self.snapshot(path)))
    }
}

const NOTIFY_CHANNEL: &str = "week_nodes_changed";

/// Postgres-backed tree. Commits notify on `week_nodes_changed`; a listener
/// task reloads the touched path and publishes it, so writes from other
/// instances reach local subscribers too.
pub struct PgTreeStore {
    db: PgPool,
    hub: Arc<SnapshotHub>,
}

impl PgTreeStore {
    pub async fn connect(db: PgPool) -> anyhow::Result<Self> {
        let hub = Arc::new(SnapshotHub::default());
        let mut listener = PgListener::connect_with(&db)
            .await
            .context("connect tree listener")?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .context("listen for tree changes")?;

        let (pool, task_hub) = (db.clone(), hub.clone());
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(note) => {
                        let path = note.payload();
                        match load_subtree(&pool, path).await {
                            Ok(snapshot) => {
                                debug!(path, children = snapshot.len(), "tree change published");
                                task_hub.publish(path, snapshot);
                            }
                            Err(e) => error!(error = %e, path, "reload subtree failed"),
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "tree listener error; retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self { db, hub })
    }
}

async fn load_subtree(db: &PgPool, path: &str) -> anyhow::Result<TreeSnapshot> {
    let rows = sqlx::query_as::<_, (i32, Json<Value>)>(
        r#"
        SELECT slot, node
          FROM week_nodes
         WHERE path = $1
         ORDER BY slot ASC
        "#,
    )
    .bind(path)
    .fetch_all(db)
    .await
    .with_context(|| format!("load subtree {}", path))?;

    Ok(TreeSnapshot {
        children: rows
            .into_iter()
            .map(|(slot, Json(node))| (slot.max(0) as usize, node))
            .collect(),
    })
}

#[async_trait]
impl TreeStore for PgTreeStore {
    async fn write(&self, path: &str, index: usize, node: Value) -> anyhow::Result<()> {
        let mut nodes = BTreeMap::new();
        nodes.insert(index.to_string(), node);
        self.patch(path, nodes).await
    }

    async fn patch(&self, path: &str, nodes: BTreeMap<String, Value>) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        for (key, node) in nodes {
            let slot = parse_slot(&key)?;
            sqlx::query(
                r#"
                INSERT INTO week_nodes (path, slot, node)
                VALUES ($1, $2, $3)
                ON CONFLICT (path, slot) DO UPDATE SET node = EXCLUDED.node, updated_at = now()
                "#,
            )
            .bind(path)
            .bind(slot as i32)
            .bind(Json(node))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert {}/{}", path, slot))?;
        }
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(path)
            .execute(&mut *tx)
            .await
            .context("notify tree change")?;
        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> anyhow::Result<watch::Receiver<TreeSnapshot>> {
        let current = load_subtree(&self.db, path).await?;
        Ok(self.hub.subscribe(path, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn patch_merges_children_and_notifies() {
        let store = MemoryTreeStore::default();
        let mut rx = store.subscribe("week/ABCD").await.unwrap();
        assert!(rx.borrow_and_update().is_empty());

        let mut first = BTreeMap::new();
        first.insert("0".to_string(), json!({"main": "a"}));
        first.insert("1".to_string(), json!({"main": "b"}));
        store.patch("week/ABCD", first).await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 2);

        store.write("week/ABCD", 1, json!({"main": "c"})).await.unwrap();
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.children[0], (0, json!({"main": "a"})));
        assert_eq!(snap.children[1], (1, json!({"main": "c"})));
    }

    #[tokio::test]
    async fn children_are_ordered_numerically() {
        let store = MemoryTreeStore::default();
        let mut nodes = BTreeMap::new();
        for i in [10usize, 2, 0] {
            nodes.insert(i.to_string(), json!(i));
        }
        store.patch("p", nodes).await.unwrap();
        let rx = store.subscribe("p").await.unwrap();
        let keys: Vec<usize> = rx.borrow().children.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 2, 10]);
    }

    #[tokio::test]
    async fn paths_are_isolated() {
        let store = MemoryTreeStore::default();
        store.write("week/ONE1", 0, json!(1)).await.unwrap();
        let rx = store.subscribe("week/TWO2").await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test]
    async fn abandoned_paths_are_pruned() {
        let store = MemoryTreeStore::default();
        let old = store.subscribe("week/OLD1").await.unwrap();
        let _other = store.subscribe("week/KEEP").await.unwrap();
        assert_eq!(store.hub.tracked_paths(), 2);

        drop(old);
        let mut current = store.subscribe("week/NEW1").await.unwrap();
        assert_eq!(store.hub.tracked_paths(), 2);

        // Writes to a path nobody follows are stored but not tracked.
        store.write("week/OLD1", 0, json!(1)).await.unwrap();
        assert_eq!(store.hub.tracked_paths(), 2);

        store.write("week/NEW1", 0, json!(2)).await.unwrap();
        current.changed().await.unwrap();
        assert_eq!(current.borrow().len(), 1);

        let again = store.subscribe("week/OLD1").await.unwrap();
        assert_eq!(again.borrow().children, vec![(0, json!(1))]);
    }

    #[tokio::test]
    async fn resubscribing_sees_latest_snapshot() {
        let store = MemoryTreeStore::default();
        let first = store.subscribe("week/ABCD").await.unwrap();
        store.write("week/ABCD", 0, json!("a")).await.unwrap();
        drop(first);
        store.write("week/ABCD", 1, json!("b")).await.unwrap();

        let rx = store.subscribe("week/ABCD").await.unwrap();
        assert_eq!(rx.borrow().len(), 2);
    }

    #[tokio::test]
    async fn rejects_non_numeric_keys() {
        let store = MemoryTreeStore::default();
        let mut nodes = BTreeMap::new();
        nodes.insert("monday".to_string(), json!({}));
        assert!(store.patch("p", nodes).await.is_err());
    }
}
