use async_trait::async_trait;
use tokio::sync::watch;

use super::dto::Meal;

/// Local table of the current week; the read side of every client view.
#[async_trait]
pub trait MealCache: Send + Sync {
    /// Live list, ordered by insertion.
    fn observe_all(&self) -> watch::Receiver<Vec<Meal>>;
    async fn all(&self) -> anyhow::Result<Vec<Meal>>;
    async fn insert_or_replace(&self, meal: Meal) -> anyhow::Result<()>;
    async fn delete_all(&self) -> anyhow::Result<()>;
}

pub struct MemoryMealCache {
    rows: watch::Sender<Vec<Meal>>,
}

impl MemoryMealCache {
    pub fn new() -> Self {
        Self {
            rows: watch::channel(Vec::new()).0,
        }
    }
}

impl Default for MemoryMealCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MealCache for MemoryMealCache {
    fn observe_all(&self) -> watch::Receiver<Vec<Meal>> {
        self.rows.subscribe()
    }

    async fn all(&self) -> anyhow::Result<Vec<Meal>> {
        Ok(self.rows.borrow().clone())
    }

    async fn insert_or_replace(&self, meal: Meal) -> anyhow::Result<()> {
        self.rows.send_modify(|rows| {
            match rows.iter_mut().find(|m| m.id == meal.id) {
                Some(existing) => *existing = meal,
                None => rows.push(meal),
            }
        });
        Ok(())
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        self.rows.send_modify(|rows| rows.clear());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MealPayload;

    fn meal(id: usize, main: &str) -> Meal {
        let payload: MealPayload =
            serde_json::from_value(serde_json::json!({ "main": main })).unwrap();
        Meal::from_payload(id, payload)
    }

    #[tokio::test]
    async fn replaces_rows_by_id_in_place() {
        let cache = MemoryMealCache::new();
        cache.insert_or_replace(meal(0, "a")).await.unwrap();
        cache.insert_or_replace(meal(1, "b")).await.unwrap();
        cache.insert_or_replace(meal(0, "c")).await.unwrap();

        let rows = cache.all().await.unwrap();
        let mains: Vec<_> = rows.iter().map(|m| m.main.as_str()).collect();
        assert_eq!(mains, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn observers_see_changes() {
        let cache = MemoryMealCache::new();
        let mut rx = cache.observe_all();
        cache.insert_or_replace(meal(0, "a")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        cache.delete_all().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());
    }
}
