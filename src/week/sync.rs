use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::cache::MealCache;
use super::dto::{Meal, MealChoice, WeekPhase, WeekState};
use super::tree::{TreeSnapshot, TreeStore};
use crate::config::PlannerConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::household::{HouseholdCode, Preferences, HOUSEHOLD_CODE_KEY, IS_LOGGED_KEY};
use crate::menu::{MealPayload, MenuGenerator, WeekPatch, MEAL_SCHEMA_VERSION};

/// A snapshot with fewer children than a working week is not a week yet.
pub const MIN_WEEK_CHILDREN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateTarget {
    Week,
    Slot(usize),
}

struct Subscription {
    code: HouseholdCode,
    task: JoinHandle<()>,
}

/// Clears `generating` when a generation ends, including when its future is dropped.
struct GeneratingGuard<'a>(&'a watch::Sender<WeekState>);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| std::mem::replace(&mut s.generating, false));
    }
}

/// Pushes generated weeks into the tree store and mirrors the household's
/// subtree into the local meal cache.
pub struct WeekSync {
    module: String,
    days: usize,
    min_visible: Duration,
    tree: Arc<dyn TreeStore>,
    cache: Arc<dyn MealCache>,
    prefs: Arc<dyn Preferences>,
    generator: Arc<Mutex<MenuGenerator>>,
    state: watch::Sender<WeekState>,
    subscription: Mutex<Option<Subscription>>,
}

impl WeekSync {
    pub fn new(
        cfg: &PlannerConfig,
        tree: Arc<dyn TreeStore>,
        cache: Arc<dyn MealCache>,
        prefs: Arc<dyn Preferences>,
        generator: Arc<Mutex<MenuGenerator>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            module: cfg.module.clone(),
            days: cfg.days,
            min_visible: Duration::from_millis(cfg.min_visible_ms),
            tree,
            cache,
            prefs,
            generator,
            state: watch::channel(WeekState::default()).0,
            subscription: Mutex::new(None),
        })
    }

    pub fn days(&self) -> usize {
        self.days
    }

    pub fn cache(&self) -> &Arc<dyn MealCache> {
        &self.cache
    }

    pub fn state(&self) -> watch::Receiver<WeekState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> WeekState {
        self.state.borrow().clone()
    }

    fn set_phase(&self, phase: WeekPhase) {
        self.state.send_if_modified(|s| {
            let changed = s.phase != phase;
            s.phase = phase;
            changed
        });
    }

    pub async fn current_code(&self) -> PlannerResult<HouseholdCode> {
        let raw = self.prefs.get_string(HOUSEHOLD_CODE_KEY).await?;
        if raw.is_empty() {
            return Err(PlannerError::NoHousehold);
        }
        HouseholdCode::parse(&raw)
    }

    /// Boot: reflect an already populated cache, then follow the stored household.
    pub async fn start(self: &Arc<Self>) -> PlannerResult<()> {
        if !self.cache.all().await?.is_empty() {
            self.set_phase(WeekPhase::Initialized);
        }
        match self.observe_week().await {
            Err(PlannerError::NoHousehold) => {
                info!("no household code stored; waiting for one");
                Ok(())
            }
            other => other,
        }
    }

    /// (Re)subscribes to the stored household's week. Any previous
    /// subscription is torn down first.
    #[instrument(skip(self))]
    pub async fn observe_week(self: &Arc<Self>) -> PlannerResult<()> {
        let mut slot = self.subscription.lock().await;
        self.observe_locked(&mut slot).await
    }

    async fn observe_locked(self: &Arc<Self>, slot: &mut Option<Subscription>) -> PlannerResult<()> {
        let code = self.current_code().await?;
        stop(slot).await;

        let path = code.path(&self.module);
        let mut rx = self.tree.subscribe(&path).await?;
        let weak = Arc::downgrade(self);
        let task_code = code.clone();
        let task = tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                let Some(sync) = weak.upgrade() else { break };
                sync.apply_snapshot(&task_code, snapshot).await;
                drop(sync);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        info!(%path, "subscribed to household week");
        *slot = Some(Subscription { code, task });
        Ok(())
    }

    async fn apply_snapshot(&self, code: &HouseholdCode, snapshot: TreeSnapshot) {
        if snapshot.len() < MIN_WEEK_CHILDREN {
            debug!(%code, children = snapshot.len(), "week not populated yet");
            self.set_phase(WeekPhase::Empty);
            return;
        }

        let mut applied = 0usize;
        for (index, (_, node)) in snapshot.children.into_iter().enumerate() {
            let payload: MealPayload = match serde_json::from_value(node) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%code, index, error = %e, "skipping undecodable day");
                    continue;
                }
            };
            if !payload.is_supported() {
                warn!(%code, index, v = payload.v, "skipping day with newer schema");
                continue;
            }
            if let Err(e) = self
                .cache
                .insert_or_replace(Meal::from_payload(index, payload))
                .await
            {
                error!(%code, index, error = %e, "cache insert failed");
                self.state.send_modify(|s| s.error = true);
                return;
            }
            applied += 1;
        }

        self.set_phase(WeekPhase::Initialized);
        info!(%code, applied, "week snapshot applied");
    }

    /// Generates the whole week or one slot and patches it into the tree.
    ///
    /// An empty result (empty catalog) is reported as an error and nothing is written.
    #[instrument(skip(self, code), fields(code = %code))]
    pub async fn generate(
        &self,
        code: &HouseholdCode,
        target: GenerateTarget,
    ) -> PlannerResult<Vec<String>> {
        if let GenerateTarget::Slot(slot) = target {
            self.check_slot(slot)?;
        }

        self.state.send_modify(|s| {
            s.generating = true;
            s.error = false;
        });
        let _generating = GeneratingGuard(&self.state);
        let started = Instant::now();
        let generated = self.build_patch(target).await;

        // Keep the loading state visible for a minimum time.
        let elapsed = started.elapsed();
        if elapsed < self.min_visible {
            tokio::time::sleep(self.min_visible - elapsed).await;
        }

        let outcome = match generated {
            Ok(patch) if patch.is_empty() => Err(PlannerError::EmptyCatalog),
            Ok(patch) => self.write_patch(code, patch).await,
            Err(e) => Err(e),
        };

        self.state.send_modify(|s| {
            s.generating = false;
            s.error = outcome.is_err();
            s.written = outcome.is_ok();
        });
        match &outcome {
            Ok(slots) => info!(slots = slots.len(), "generation written"),
            Err(e) => warn!(error = %e, "generation failed"),
        }
        outcome
    }

    async fn build_patch(&self, target: GenerateTarget) -> PlannerResult<WeekPatch> {
        match target {
            GenerateTarget::Week => self.generator.lock().await.generate(self.days).await,
            GenerateTarget::Slot(slot) => {
                let avoid: HashSet<u64> = self
                    .cache
                    .all()
                    .await?
                    .into_iter()
                    .filter(|m| m.id != slot)
                    .filter_map(|m| m.server_id)
                    .collect();
                self.generator
                    .lock()
                    .await
                    .generate_just_one(&avoid, slot)
                    .await
            }
        }
    }

    async fn write_patch(&self, code: &HouseholdCode, patch: WeekPatch) -> PlannerResult<Vec<String>> {
        let mut nodes = BTreeMap::new();
        for (key, payload) in patch {
            let node = serde_json::to_value(&payload).map_err(anyhow::Error::from)?;
            nodes.insert(key, node);
        }
        let slots: Vec<String> = nodes.keys().cloned().collect();
        self.tree.patch(&code.path(&self.module), nodes).await?;
        Ok(slots)
    }

    fn check_slot(&self, slot: usize) -> PlannerResult<()> {
        if slot >= self.days {
            return Err(PlannerError::SlotOutOfRange {
                slot,
                days: self.days,
            });
        }
        Ok(())
    }

    /// Regenerates one slot, or writes a user-picked meal straight into it.
    #[instrument(skip(self, code, choice), fields(code = %code))]
    pub async fn change_single_meal(
        &self,
        code: &HouseholdCode,
        slot: usize,
        choice: MealChoice,
    ) -> PlannerResult<Vec<String>> {
        match choice {
            MealChoice::Auto => self.generate(code, GenerateTarget::Slot(slot)).await,
            MealChoice::Explicit { mut meal } => {
                self.check_slot(slot)?;
                meal.v = MEAL_SCHEMA_VERSION;
                let node = serde_json::to_value(&meal).map_err(anyhow::Error::from)?;
                let res = self
                    .tree
                    .write(&code.path(&self.module), slot, node)
                    .await
                    .map_err(PlannerError::from);
                self.state.send_modify(|s| {
                    s.error = res.is_err();
                    s.written = res.is_ok();
                });
                res?;
                info!(slot, main = %meal.main, "meal set by hand");
                Ok(vec![slot.to_string()])
            }
        }
    }

    /// Switches household: persist, wipe the local week, resubscribe.
    #[instrument(skip(self))]
    pub async fn updating_with_a_new_code(self: &Arc<Self>, raw: &str) -> PlannerResult<HouseholdCode> {
        let code = HouseholdCode::parse(raw)?;
        let mut slot = self.subscription.lock().await;
        if let Some(previous) = slot.as_ref() {
            debug!(previous = %previous.code, "leaving household");
        }
        let previous_code = self.prefs.get_string(HOUSEHOLD_CODE_KEY).await?;
        let previous_logged = self.prefs.get_bool(IS_LOGGED_KEY).await?;
        let previous_phase = self.current_state().phase;

        self.prefs.put_string(code.as_str(), HOUSEHOLD_CODE_KEY).await?;
        self.set_phase(WeekPhase::Refreshing);
        stop(&mut slot).await;

        if let Err(e) = self.switch_locked(&mut slot).await {
            warn!(%code, error = %e, "household switch failed; restoring previous household");
            self.restore_locked(&mut slot, &previous_code, previous_logged, previous_phase)
                .await;
            return Err(e);
        }

        info!(%code, "household switched");
        Ok(code)
    }

    async fn switch_locked(self: &Arc<Self>, slot: &mut Option<Subscription>) -> PlannerResult<()> {
        self.prefs.put_bool(true, IS_LOGGED_KEY).await?;
        self.cache.delete_all().await?;
        self.observe_locked(slot).await
    }

    /// Puts the previous code back and follows it again, flagging the error.
    async fn restore_locked(
        self: &Arc<Self>,
        slot: &mut Option<Subscription>,
        previous_code: &str,
        previous_logged: bool,
        previous_phase: WeekPhase,
    ) {
        let restored = match self.prefs.put_string(previous_code, HOUSEHOLD_CODE_KEY).await {
            Ok(()) => self.prefs.put_bool(previous_logged, IS_LOGGED_KEY).await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            error!(error = %e, "previous household could not be restored");
        }
        self.state.send_modify(|s| {
            s.phase = previous_phase;
            s.error = true;
        });
        match self.observe_locked(slot).await {
            Ok(()) | Err(PlannerError::NoHousehold) => {}
            Err(e) => error!(error = %e, "previous household could not be resubscribed"),
        }
    }
}

async fn stop(slot: &mut Option<Subscription>) {
    if let Some(previous) = slot.take() {
        previous.task.abort();
        let _ = previous.task.await;
        debug!(code = %previous.code, "subscription stopped");
    }
}

impl Drop for WeekSync {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.get_mut().take() {
            sub.task.abort();
        }
    }
}
