use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use super::dto::{Collection, Recipe, RecipeDocument, RecipeQuery};

/// Document store holding the main and side recipe catalogs.
///
/// Documents are keyed by their ordinal position in the collection.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn get(&self, collection: Collection, key: u64) -> anyhow::Result<Option<Recipe>>;
    async fn put(&self, collection: Collection, key: u64, recipe: &Recipe) -> anyhow::Result<()>;
    async fn count(&self, collection: Collection) -> anyhow::Result<u64>;
    async fn query(&self, q: &RecipeQuery) -> anyhow::Result<Vec<RecipeDocument>>;
}

#[derive(Clone)]
pub struct PgRecipeStore {
    db: PgPool,
}

impl PgRecipeStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

#[async_trait]
impl RecipeStore for PgRecipeStore {
    async fn get(&self, collection: Collection, key: u64) -> anyhow::Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, (Json<Recipe>,)>(
            r#"
            SELECT fields
              FROM recipe_documents
             WHERE collection = $1 AND doc_key = $2
            "#,
        )
        .bind(collection.name())
        .bind(key as i64)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("get {}/{}", collection, key))?;

        Ok(row.map(|(Json(recipe),)| recipe))
    }

    async fn put(&self, collection: Collection, key: u64, recipe: &Recipe) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recipe_documents (collection, doc_key, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, doc_key) DO UPDATE SET fields = EXCLUDED.fields
            "#,
        )
        .bind(collection.name())
        .bind(key as i64)
        .bind(Json(recipe.clone()))
        .execute(&self.db)
        .await
        .with_context(|| format!("put {}/{}", collection, key))?;
        Ok(())
    }

    async fn count(&self, collection: Collection) -> anyhow::Result<u64> {
        let (n,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM recipe_documents WHERE collection = $1",
        )
        .bind(collection.name())
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("count {}", collection))?;
        Ok(n.max(0) as u64)
    }

    async fn query(&self, q: &RecipeQuery) -> anyhow::Result<Vec<RecipeDocument>> {
        let rows = sqlx::query_as::<_, (i64, Json<Recipe>)>(
            r#"
            SELECT doc_key, fields
              FROM recipe_documents
             WHERE collection = $1
               AND ($2 = '' OR fields->>'title' LIKE $3 ESCAPE '\')
             ORDER BY doc_key ASC
             LIMIT $4 OFFSET $5
            "#,
        )
        .bind(q.collection.name())
        .bind(&q.prefix)
        .bind(like_prefix(&q.prefix))
        .bind(q.limit.max(0))
        .bind(q.offset.max(0))
        .fetch_all(&self.db)
        .await
        .with_context(|| format!("query {}", q.collection))?;

        Ok(rows
            .into_iter()
            .map(|(key, Json(recipe))| RecipeDocument {
                id: key as u64,
                recipe,
            })
            .collect())
    }
}

/// In-process catalog that counts remote-style calls.
#[derive(Default)]
pub struct MemoryRecipeStore {
    docs: Mutex<HashMap<Collection, BTreeMap<u64, Recipe>>>,
    gets: AtomicUsize,
    counts: AtomicUsize,
}

impl MemoryRecipeStore {
    pub fn seeded(mains: Vec<Recipe>, sides: Vec<Recipe>) -> Self {
        let store = Self::default();
        {
            let mut docs = store.docs.lock().unwrap_or_else(|e| e.into_inner());
            for (collection, list) in [(Collection::Mains, mains), (Collection::Sides, sides)] {
                let entry = docs.entry(collection).or_default();
                for (i, recipe) in list.into_iter().enumerate() {
                    entry.insert(i as u64, recipe);
                }
            }
        }
        store
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn get(&self, collection: Collection, key: u64) -> anyhow::Result<Option<Recipe>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(&collection).and_then(|c| c.get(&key)).cloned())
    }

    async fn put(&self, collection: Collection, key: u64, recipe: &Recipe) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.entry(collection).or_default().insert(key, recipe.clone());
        Ok(())
    }

    async fn count(&self, collection: Collection) -> anyhow::Result<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs.get(&collection).map_or(0, |c| c.len() as u64))
    }

    async fn query(&self, q: &RecipeQuery) -> anyhow::Result<Vec<RecipeDocument>> {
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        let Some(collection) = docs.get(&q.collection) else {
            return Ok(Vec::new());
        };
        Ok(collection
            .iter()
            .filter(|(_, r)| r.title.starts_with(&q.prefix))
            .skip(q.offset.max(0) as usize)
            .take(q.limit.max(0) as usize)
            .map(|(id, recipe)| RecipeDocument {
                id: *id,
                recipe: recipe.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> Recipe {
        Recipe {
            title: title.into(),
            ingredients: "x".into(),
            ..Recipe::default()
        }
    }

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
        assert_eq!(like_prefix(""), "%");
    }

    #[tokio::test]
    async fn memory_query_filters_by_prefix_and_pages() {
        let store = MemoryRecipeStore::seeded(
            vec![titled("Pasta"), titled("Pizza"), titled("Poke"), titled("Salad")],
            vec![],
        );
        let q = RecipeQuery {
            collection: Collection::Mains,
            limit: 2,
            offset: 1,
            prefix: "P".into(),
        };
        let page = store.query(&q).await.unwrap();
        let titles: Vec<_> = page.iter().map(|d| d.recipe.title.as_str()).collect();
        assert_eq!(titles, vec!["Pizza", "Poke"]);
        assert_eq!(page[0].id, 1);
    }

    #[tokio::test]
    async fn memory_counts_calls() {
        let store = MemoryRecipeStore::seeded(vec![titled("Pasta")], vec![]);
        assert_eq!(store.count(Collection::Sides).await.unwrap(), 0);
        assert!(store.get(Collection::Mains, 0).await.unwrap().is_some());
        assert!(store.get(Collection::Mains, 9).await.unwrap().is_none());
        assert_eq!(store.get_calls(), 2);
        assert_eq!(store.count_calls(), 1);
    }
}
