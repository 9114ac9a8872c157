use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::{
    rngs::StdRng,
    seq::{index, SliceRandom},
    Rng, SeedableRng,
};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::payload::{MealPayload, WeekPatch};
use crate::error::{PlannerError, PlannerResult};
use crate::recipes::{Collection, Recipe, RecipeDocument, RecipeStore};

/// Picks random, non-colliding mains and sides for a week.
///
/// Collection sizes and fetched documents are memoized for the lifetime of
/// the instance. Sizes may go stale when another client appends recipes;
/// sampling only needs them approximately right.
pub struct MenuGenerator {
    store: Arc<dyn RecipeStore>,
    rng: StdRng,
    main_size: u64,
    side_size: u64,
    mains: HashMap<u64, Recipe>,
    sides: HashMap<u64, Recipe>,
    max_redraws: usize,
}

impl MenuGenerator {
    pub fn new(store: Arc<dyn RecipeStore>, max_redraws: usize) -> Self {
        Self::with_rng(store, max_redraws, StdRng::from_entropy())
    }

    pub fn with_seed(store: Arc<dyn RecipeStore>, max_redraws: usize, seed: u64) -> Self {
        Self::with_rng(store, max_redraws, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<dyn RecipeStore>, max_redraws: usize, rng: StdRng) -> Self {
        Self {
            store,
            rng,
            main_size: 0,
            side_size: 0,
            mains: HashMap::new(),
            sides: HashMap::new(),
            max_redraws,
        }
    }

    fn size_slot(&mut self, collection: Collection) -> &mut u64 {
        match collection {
            Collection::Mains => &mut self.main_size,
            Collection::Sides => &mut self.side_size,
        }
    }

    fn cache(&mut self, collection: Collection) -> &mut HashMap<u64, Recipe> {
        match collection {
            Collection::Mains => &mut self.mains,
            Collection::Sides => &mut self.sides,
        }
    }

    /// Cached size if positive, otherwise one count query.
    async fn collection_size(&mut self, collection: Collection) -> PlannerResult<u64> {
        let cached = *self.size_slot(collection);
        if cached > 0 {
            return Ok(cached);
        }
        let size = self.store.count(collection).await?;
        debug!(%collection, size, "collection size resolved");
        *self.size_slot(collection) = size;
        Ok(size)
    }

    async fn sizes(&mut self) -> PlannerResult<(u64, u64)> {
        let sides = self.collection_size(Collection::Sides).await?;
        let mains = self.collection_size(Collection::Mains).await?;
        Ok((mains, sides))
    }

    fn sample(&mut self, size: u64, days: usize) -> Vec<u64> {
        let amount = (size as usize).min(days);
        index::sample(&mut self.rng, size as usize, amount)
            .into_iter()
            .map(|i| i as u64)
            .collect()
    }

    /// Builds a full week. Returns an empty patch when either catalog is empty.
    #[instrument(skip(self))]
    pub async fn generate(&mut self, days: usize) -> PlannerResult<WeekPatch> {
        let mut patch = WeekPatch::new();
        let (mains, sides) = self.sizes().await?;
        if mains == 0 || sides == 0 || days == 0 {
            warn!(mains, sides, "catalog empty, nothing to generate");
            return Ok(patch);
        }

        let main_picks = self.sample(mains, days);
        let side_picks = self.sample(sides, days);
        self.prefetch(&main_picks, &side_picks).await?;

        // Slots stop at the shorter list; the side index is clamped.
        let last_side = side_picks.len() - 1;
        for (i, main) in main_picks.iter().enumerate().take(side_picks.len()) {
            let payload = self.get_recipe(*main, side_picks[i.min(last_side)]).await?;
            patch.insert(i.to_string(), payload);
        }

        info!(slots = patch.len(), "week generated");
        Ok(patch)
    }

    /// Regenerates one slot, never picking a main listed in `avoid`.
    #[instrument(skip(self, avoid), fields(avoided = avoid.len()))]
    pub async fn generate_just_one(
        &mut self,
        avoid: &HashSet<u64>,
        slot: usize,
    ) -> PlannerResult<WeekPatch> {
        let mut patch = WeekPatch::new();
        let (mains, sides) = self.sizes().await?;
        if mains == 0 || sides == 0 {
            warn!(mains, sides, "catalog empty, nothing to generate");
            return Ok(patch);
        }

        let main = self.pick_main(mains, avoid)?;
        let side = self.rng.gen_range(0..sides);
        let payload = self.get_recipe(main, side).await?;
        patch.insert(slot.to_string(), payload);
        Ok(patch)
    }

    fn pick_main(&mut self, mains: u64, avoid: &HashSet<u64>) -> PlannerResult<u64> {
        for _ in 0..self.max_redraws {
            let candidate = self.rng.gen_range(0..mains);
            if !avoid.contains(&candidate) {
                return Ok(candidate);
            }
        }

        let open: Vec<u64> = (0..mains).filter(|k| !avoid.contains(k)).collect();
        warn!(
            redraws = self.max_redraws,
            open = open.len(),
            "redraw cap reached, choosing among remaining mains"
        );
        open.choose(&mut self.rng)
            .copied()
            .ok_or(PlannerError::CatalogExhausted {
                avoided: avoid.len(),
            })
    }

    /// Resolves one main (and its side, if it wants one) into a payload.
    #[instrument(skip(self))]
    pub async fn get_recipe(&mut self, main_idx: u64, side_idx: u64) -> PlannerResult<MealPayload> {
        self.resolve(Collection::Mains, main_idx).await?;
        let needs_side = self.mains.get(&main_idx).is_some_and(|r| r.need_a_side);
        if needs_side {
            self.resolve(Collection::Sides, side_idx).await?;
        }

        let main = self
            .mains
            .get(&main_idx)
            .ok_or(PlannerError::RecipeNotFound {
                collection: Collection::Mains,
                key: main_idx,
            })?;
        let side = if needs_side {
            self.sides.get(&side_idx)
        } else {
            None
        };
        Ok(MealPayload::from_recipes(main_idx, main, side))
    }

    /// Document by key if this instance already fetched it.
    pub fn cached(&self, collection: Collection, key: u64) -> Option<Recipe> {
        let docs = match collection {
            Collection::Mains => &self.mains,
            Collection::Sides => &self.sides,
        };
        docs.get(&key).cloned()
    }

    async fn resolve(&mut self, collection: Collection, key: u64) -> PlannerResult<()> {
        if self.cache(collection).contains_key(&key) {
            return Ok(());
        }
        let recipe = self
            .store
            .get(collection, key)
            .await?
            .ok_or(PlannerError::RecipeNotFound { collection, key })?;
        self.cache(collection).insert(key, recipe);
        Ok(())
    }

    /// Fetches every uncached document a generation will touch, concurrently.
    async fn prefetch(&mut self, mains: &[u64], sides: &[u64]) -> PlannerResult<()> {
        let missing: Vec<u64> = mains
            .iter()
            .copied()
            .filter(|k| !self.mains.contains_key(k))
            .collect();
        for (key, recipe) in self.fetch_many(Collection::Mains, missing).await? {
            self.mains.insert(key, recipe);
        }

        let last = sides.len().saturating_sub(1);
        let mut wanted = Vec::new();
        for (i, main) in mains.iter().enumerate().take(sides.len()) {
            let side = sides[i.min(last)];
            let needs_side = self.mains.get(main).is_some_and(|r| r.need_a_side);
            if needs_side && !self.sides.contains_key(&side) && !wanted.contains(&side) {
                wanted.push(side);
            }
        }
        for (key, recipe) in self.fetch_many(Collection::Sides, wanted).await? {
            self.sides.insert(key, recipe);
        }
        Ok(())
    }

    async fn fetch_many(
        &self,
        collection: Collection,
        keys: Vec<u64>,
    ) -> PlannerResult<Vec<(u64, Recipe)>> {
        let mut set = JoinSet::new();
        for key in keys {
            let store = Arc::clone(&self.store);
            set.spawn(async move { (key, store.get(collection, key).await) });
        }

        let mut out = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            let (key, res) = joined.map_err(anyhow::Error::from)?;
            match res? {
                Some(recipe) => out.push((key, recipe)),
                None => return Err(PlannerError::RecipeNotFound { collection, key }),
            }
        }
        Ok(out)
    }

    /// Appends a recipe using the collection size as its key.
    ///
    /// Keys are never reused; there is no deletion or compaction.
    #[instrument(skip(self, recipe), fields(title = %recipe.title, side = recipe.is_side))]
    pub async fn add(&mut self, recipe: Recipe) -> PlannerResult<(Collection, u64)> {
        recipe.validate().map_err(PlannerError::InvalidRecipe)?;

        let collection = recipe.collection();
        let key = self.collection_size(collection).await?;
        self.store.put(collection, key, &recipe).await?;
        *self.size_slot(collection) = key + 1;
        self.cache(collection).insert(key, recipe);

        info!(%collection, key, "recipe added");
        Ok((collection, key))
    }

    /// Feeds documents read elsewhere (catalog browsing) into the cache.
    pub fn warm<'a>(
        &mut self,
        collection: Collection,
        docs: impl IntoIterator<Item = &'a RecipeDocument>,
    ) {
        let cache = self.cache(collection);
        for doc in docs {
            cache.insert(doc.id, doc.recipe.clone());
        }
    }
}
