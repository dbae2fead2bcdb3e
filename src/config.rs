use std::collections::BTreeMap;
use std::time::Duration;

/// Runtime configuration for a warren instance.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Number of entity shards. The global shard is always one extra lane.
    pub entity_shards: usize,
    /// How long a queued task may run before it is dropped and the shard
    /// advances.
    pub task_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            entity_shards: 10,
            task_timeout_ms: 180_000,
        }
    }
}

impl CoreConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

/// Numeric bounds applied by reconciliation.
#[derive(Debug, Clone)]
pub struct Bounds {
    /// Currency score is clamped into `[0, max_score]`.
    pub max_score: i64,
    /// Ceiling for the derived item multiplier.
    pub multiplier_ceiling: u64,
    /// Cap for each sequential booster application to the visual multiplier.
    pub booster_bonus_cap: u64,
    /// Length of one daily cycle in milliseconds. A streak resets after two
    /// cycles without a qualifying action.
    pub cycle_length_ms: u64,
    /// How many editions of one item kind are tracked per user.
    pub max_tracked_editions: usize,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            max_score: 1_000_000_000,
            multiplier_ceiling: 1_000,
            booster_bonus_cap: 50,
            cycle_length_ms: 86_400_000,
            max_tracked_editions: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemKindConfig {
    pub rarity: String,
    /// Kind only obtainable (and only counted toward completion) in contexts
    /// eligible for the extended item set.
    pub extended_only: bool,
}

#[derive(Debug, Clone)]
pub struct RarityConfig {
    pub weight: f64,
    /// Seed value for a kind's price summaries on first edition.
    pub base_score: i64,
    /// First award of a kind with this rarity also advances the bonus kind's
    /// edition counter.
    pub gives_bonus: bool,
    /// Kinds of this rarity count toward the completion badge.
    pub counts_toward_completion: bool,
    /// Editions of this rarity are tracked without the per-user cap.
    pub track_all_editions: bool,
    /// Tier matched against `QuestKind::CollectItems`.
    pub tier: u32,
}

#[derive(Debug, Clone)]
pub struct BoosterKindConfig {
    /// Held count and its high-water mark are clamped into `[0, max_total]`.
    pub max_total: i64,
}

/// What a quest slot counts. Consulted when awards bump quest progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestKind {
    /// Progress per item collected of the matching rarity tier.
    CollectItems { tier: u32 },
    /// Progress per point of score collected.
    CollectScore,
    /// Progress per daily claimed.
    CompleteDailies,
    /// Progress per use of the named booster.
    UseBooster { kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOrdering {
    /// Higher value leads (accumulation boards).
    Descending,
    /// Lower value leads (fastest-time boards).
    Ascending,
}

/// Which user field feeds a leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardSource {
    Score,
    TotalItems,
    Multiplier,
    HighestStreak,
}

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub ordering: BoardOrdering,
    pub source: BoardSource,
}

/// Static game configuration. Loading it from disk belongs to the caller;
/// reconciliation and the award path only consult it.
#[derive(Debug, Clone, Default)]
pub struct GameConfig {
    pub items: BTreeMap<String, ItemKindConfig>,
    pub rarities: BTreeMap<String, RarityConfig>,
    pub boosters: BTreeMap<String, BoosterKindConfig>,
    pub quests: BTreeMap<String, QuestKind>,
    pub boards: BTreeMap<String, BoardConfig>,
    pub challenge_categories: Vec<String>,
    /// Kind granted alongside the first edition of a `gives_bonus` rarity.
    pub bonus_kind: String,
    /// Badge granted when a user owns every completion-counted kind.
    pub completion_badge: String,
    pub bounds: Bounds,
}

impl GameConfig {
    pub fn rarity_of(&self, kind: &str) -> Option<&RarityConfig> {
        let item = self.items.get(kind)?;
        self.rarities.get(&item.rarity)
    }

    /// Whether a kind counts toward the completion badge in the given context.
    pub fn counts_toward_completion(&self, kind: &str, extended_set: bool) -> bool {
        let Some(item) = self.items.get(kind) else {
            return false;
        };
        if item.extended_only && !extended_set {
            return false;
        }
        self.rarities
            .get(&item.rarity)
            .is_some_and(|r| r.counts_toward_completion)
    }

    /// Maximum number of distinct kinds achievable toward completion.
    pub fn max_completion_count(&self, extended_set: bool) -> usize {
        self.items
            .keys()
            .filter(|kind| self.counts_toward_completion(kind, extended_set))
            .count()
    }
}
