pub mod aggregates;
pub mod commit;
pub mod config;
pub mod error;
pub mod outcome;
pub mod reconcile;
pub mod records;
pub mod scheduler;
pub mod store;

pub use crate::error::{WarrenError, WarrenErrorCode};
pub use crate::outcome::{
    resolve_outcome, resolve_suboutcome, resolve_weighted, Outcome, SubOutcome,
};

use crate::aggregates::EditionGrant;
use crate::commit::commit_user;
use crate::config::{CoreConfig, GameConfig};
use crate::error::log_suppressed;
use crate::reconcile::reconcile_user;
use crate::records::global::{LeaderboardRecord, QuestCycleRecord};
use crate::records::user::{CollectedItem, UserRecord};
use crate::records::{user_key, QUEST_CYCLE_KEY};
use crate::scheduler::{ShardKey, ShardScheduler};
use crate::store::{FsBackend, RecordStore, StorageBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-operation context: the wall clock and whether the caller's context is
/// eligible for the extended item set. Explicit so tests control time.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext {
    pub now_ms: u64,
    pub extended_set: bool,
}

impl MutationContext {
    pub fn now(extended_set: bool) -> Self {
        Self {
            now_ms: now_ms(),
            extended_set,
        }
    }

    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms,
            extended_set: false,
        }
    }
}

/// Result of an award: allocated editions, bonus-kind editions granted for
/// first awards of `gives_bonus` rarities, and the merged user record.
#[derive(Debug, Clone)]
pub struct AwardReceipt {
    pub grants: Vec<EditionGrant>,
    pub bonus_editions: Vec<u64>,
    pub user: UserRecord,
}

/// The persistence and concurrency-control core. One instance per process;
/// constructed explicitly and passed by reference so tests can run
/// independent instances side by side.
///
/// Callers hold transient copies of records; every mutation goes through a
/// shard task that loads, reconciles, mutates and commits.
pub struct WarrenInstance {
    game: Arc<GameConfig>,
    store: RecordStore,
    scheduler: ShardScheduler,
}

impl WarrenInstance {
    /// Opens a file-backed instance rooted at `dir`.
    pub fn open(core: CoreConfig, game: GameConfig, dir: &Path) -> Result<Self, WarrenError> {
        let backend = FsBackend::open(dir)?;
        Ok(Self::with_backend(core, game, Arc::new(backend)))
    }

    pub fn with_backend(
        core: CoreConfig,
        game: GameConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        let scheduler = ShardScheduler::new(core.entity_shards, core.task_timeout());
        info!(
            entity_shards = core.entity_shards,
            task_timeout_ms = core.task_timeout_ms,
            "warren instance opened"
        );
        Self {
            game: Arc::new(game),
            store: RecordStore::new(backend),
            scheduler,
        }
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn scheduler(&self) -> &ShardScheduler {
        &self.scheduler
    }

    /// Reads a user record without scheduling. The copy is disposable and
    /// must not be written back directly.
    pub fn user(&self, user_id: &str) -> Result<Option<UserRecord>, WarrenError> {
        self.store.load(&user_key(user_id))
    }

    pub fn board(&self, board: &str) -> Result<Option<LeaderboardRecord>, WarrenError> {
        self.store.load(&records::board_key(board))
    }

    pub fn current_cycle(&self) -> Result<QuestCycleRecord, WarrenError> {
        Ok(self.store.load(QUEST_CYCLE_KEY)?.unwrap_or_default())
    }

    /// Lazily creates (and reconciles) the user record under its shard.
    pub async fn get_or_create_user(
        &self,
        ctx: MutationContext,
        user_id: &str,
    ) -> Result<UserRecord, WarrenError> {
        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::entity(user_id), async move {
                let key = user_key(&id);
                let cycle: QuestCycleRecord =
                    store.load(QUEST_CYCLE_KEY)?.unwrap_or_default();
                let (mut user, created) = store.load_or_create::<UserRecord>(&key)?;
                if created {
                    info!(user = %id, "created user record");
                }
                let before = user.clone();
                reconcile_user(&mut user, &game, &cycle, ctx.now_ms, ctx.extended_set);
                if created || user != before {
                    store.save(&key, &user)?;
                }
                Ok(user)
            })
            .await
    }

    /// Runs a mutation under the user's shard: load, reconcile, mutate,
    /// commit-protocol merge, persist. The closure's error aborts the task
    /// without persisting.
    pub async fn mutate_user<F, R>(
        &self,
        ctx: MutationContext,
        user_id: &str,
        mutation: F,
    ) -> Result<R, WarrenError>
    where
        F: FnOnce(&mut UserRecord) -> Result<R, WarrenError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::entity(user_id), async move {
                let key = user_key(&id);
                let cycle: QuestCycleRecord =
                    store.load(QUEST_CYCLE_KEY)?.unwrap_or_default();
                let (mut user, created) = store.load_or_create::<UserRecord>(&key)?;
                if created {
                    info!(user = %id, "created user record");
                }
                reconcile_user(&mut user, &game, &cycle, ctx.now_ms, ctx.extended_set);
                let base = user.clone();
                let out = mutation(&mut user)?;
                commit_user(
                    &store,
                    &game,
                    &cycle,
                    &key,
                    &base,
                    &user,
                    ctx.now_ms,
                    ctx.extended_set,
                )?;
                Ok(out)
            })
            .await
    }

    /// Allocates the next edition for one kind under the global shard.
    pub async fn allocate_edition(&self, kind: &str) -> Result<u64, WarrenError> {
        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let kinds = vec![kind.to_string()];
        let (grants, _) = self
            .scheduler
            .submit(ShardKey::Global, async move {
                aggregates::allocate_editions(&store, &game, &kinds)
            })
            .await?;
        grants
            .into_iter()
            .next()
            .map(|g| g.edition)
            .ok_or_else(|| WarrenError::Validation("empty allocation".into()))
    }

    /// Awards item kinds to a user: editions are allocated under the global
    /// shard, the collection/stat/quest updates run under the user's shard,
    /// and the leaderboard refresh runs under the global shard afterwards.
    ///
    /// An unknown kind is a hard failure before anything is scheduled. The
    /// trailing leaderboard refresh is best-effort; its errors are logged and
    /// suppressed.
    pub async fn award_items(
        &self,
        ctx: MutationContext,
        user_id: &str,
        kinds: Vec<String>,
        scores: Vec<i64>,
    ) -> Result<AwardReceipt, WarrenError> {
        for kind in &kinds {
            if self.game.rarity_of(kind).is_none() {
                return Err(WarrenError::UnknownItemKind(kind.clone()));
            }
        }

        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let alloc_kinds = kinds.clone();
        let (grants, bonus_editions) = self
            .scheduler
            .submit(ShardKey::Global, async move {
                aggregates::allocate_editions(&store, &game, &alloc_kinds)
            })
            .await?;

        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let id = user_id.to_string();
        let task_grants = grants.clone();
        let task_bonus = bonus_editions.clone();
        let user = self
            .scheduler
            .submit(ShardKey::entity(user_id), async move {
                let key = user_key(&id);
                let cycle: QuestCycleRecord =
                    store.load(QUEST_CYCLE_KEY)?.unwrap_or_default();
                let (mut user, created) = store.load_or_create::<UserRecord>(&key)?;
                if created {
                    info!(user = %id, "created user record");
                }
                reconcile_user(&mut user, &game, &cycle, ctx.now_ms, ctx.extended_set);
                let base = user.clone();
                apply_award(&mut user, &game, &cycle, &task_grants, &task_bonus, &scores, ctx.now_ms)?;
                commit_user(
                    &store,
                    &game,
                    &cycle,
                    &key,
                    &base,
                    &user,
                    ctx.now_ms,
                    ctx.extended_set,
                )
            })
            .await?;

        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let id = user_id.to_string();
        let snapshot = user.clone();
        let refresh = self
            .scheduler
            .submit(ShardKey::Global, async move {
                aggregates::sync_boards(&store, &game, &id, &snapshot)
            })
            .await;
        if let Err(err) = refresh {
            log_suppressed("leaderboard refresh after award", &err);
        }

        Ok(AwardReceipt {
            grants,
            bonus_editions,
            user,
        })
    }

    /// Upserts a board value and re-evaluates the top pointer under the
    /// global shard. Returns whether the top pointer changed.
    pub async fn record_board_value(
        &self,
        board: &str,
        user_id: &str,
        value: i64,
    ) -> Result<bool, WarrenError> {
        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        let board = board.to_string();
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::Global, async move {
                aggregates::update_board_entry(&store, &game, &board, &id, value)?;
                aggregates::maybe_set_top(&store, &game, &board, &id, value)
            })
            .await
    }

    /// Replaces the active quest cycle under the global shard.
    pub async fn rotate_quest_cycle(
        &self,
        now_ms: u64,
        quest_ids: Vec<String>,
    ) -> Result<QuestCycleRecord, WarrenError> {
        let store = self.store.clone();
        let game = Arc::clone(&self.game);
        self.scheduler
            .submit(ShardKey::Global, async move {
                aggregates::rotate_quest_cycle(&store, &game, now_ms, quest_ids)
            })
            .await
    }

    pub async fn set_ban(&self, user_id: &str, until_ms: u64) -> Result<(), WarrenError> {
        let store = self.store.clone();
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::Global, async move {
                aggregates::set_ban(&store, &id, until_ms)
            })
            .await
    }

    pub async fn clear_ban(&self, user_id: &str) -> Result<(), WarrenError> {
        let store = self.store.clone();
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::Global, async move {
                aggregates::clear_ban(&store, &id)
            })
            .await
    }

    /// Returns the ban expiry if the user is currently banned; prunes an
    /// expired entry as a side effect.
    pub async fn check_ban(
        &self,
        user_id: &str,
        now_ms: u64,
    ) -> Result<Option<u64>, WarrenError> {
        let store = self.store.clone();
        let id = user_id.to_string();
        self.scheduler
            .submit(ShardKey::Global, async move {
                aggregates::check_ban(&store, &id, now_ms)
            })
            .await
    }
}

/// Applies one award batch to an in-memory user record: quest progress,
/// collection entries with bounded edition tracking, score and totals, and
/// the bonus-kind grants.
fn apply_award(
    user: &mut UserRecord,
    game: &GameConfig,
    cycle: &QuestCycleRecord,
    grants: &[EditionGrant],
    bonus_editions: &[u64],
    scores: &[i64],
    now_ms: u64,
) -> Result<(), WarrenError> {
    use crate::config::QuestKind;

    for (i, grant) in grants.iter().enumerate() {
        let rarity = game
            .rarity_of(&grant.kind)
            .ok_or_else(|| WarrenError::UnknownItemKind(grant.kind.clone()))?;
        let score = scores.get(i).copied().unwrap_or(0);

        for (slot, quest_id) in cycle.active.iter().enumerate() {
            let Some(bump) = (match game.quests.get(quest_id) {
                Some(QuestKind::CollectItems { tier }) if *tier == rarity.tier => Some(1),
                Some(QuestKind::CollectScore) if score > 0 => Some(score as u64),
                _ => None,
            }) else {
                continue;
            };
            if let Some(progress) = user.stats.quests.progress.get_mut(slot) {
                *progress += bump;
            }
        }

        debug!(kind = %grant.kind, edition = grant.edition, "adding item to collection");
        let entry = user
            .items
            .items
            .entry(grant.kind.clone())
            .or_insert_with(|| CollectedItem {
                first_obtained: now_ms,
                ..CollectedItem::default()
            });
        entry.num += 1;
        entry.last_obtained = now_ms;
        if rarity.track_all_editions || grant.edition <= game.bounds.max_tracked_editions as u64 {
            entry.editions.push(grant.edition);
            entry.editions.sort_unstable();
            entry.edition_times.push(now_ms);
            entry.edition_times.sort_unstable();
        }

        user.stats.general.last_item = grant.kind.clone();
        user.stats.general.score += score.max(0);
        user.stats.general.total_items += 1;
    }

    if !bonus_editions.is_empty() && !game.bonus_kind.is_empty() {
        debug!(kind = %game.bonus_kind, count = bonus_editions.len(), "adding bonus items");
        let entry = user
            .items
            .items
            .entry(game.bonus_kind.clone())
            .or_insert_with(|| CollectedItem {
                first_obtained: now_ms,
                ..CollectedItem::default()
            });
        entry.num += bonus_editions.len() as u64;
        entry.last_obtained = now_ms;
        entry.editions.extend_from_slice(bonus_editions);
        entry.editions.sort_unstable();
        entry
            .edition_times
            .extend(std::iter::repeat(now_ms).take(bonus_editions.len()));
        entry.edition_times.sort_unstable();

        user.stats.general.last_item = game.bonus_kind.clone();
        user.stats.general.total_items += bonus_editions.len() as u64;
    }

    Ok(())
}
