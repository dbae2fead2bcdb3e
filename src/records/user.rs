use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of quest slots per cycle.
pub const QUEST_SLOTS: usize = 7;
/// Claim slots: one per quest plus the full-completion bonus claim.
pub const CLAIM_SLOTS: usize = 8;

/// Per-user persisted document. Created lazily on first access, mutated only
/// inside scheduler-held shard tasks, never deleted.
///
/// Maps are `BTreeMap` so the serialized form is deterministic; the
/// reconciliation-idempotence property is checked on serialized bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub items: ItemCollection,
    #[serde(default)]
    pub stats: UserStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub items: BTreeMap<String, CollectedItem>,
    #[serde(default)]
    pub boosters: BTreeMap<String, BoosterState>,
    #[serde(default)]
    pub badges: BTreeMap<String, CollectedBadge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedItem {
    pub num: u64,
    pub first_obtained: u64,
    pub last_obtained: u64,
    /// Tracked unique-instance numbers, ascending, bounded by
    /// `Bounds::max_tracked_editions` unless the rarity tracks all editions.
    #[serde(default)]
    pub editions: Vec<u64>,
    #[serde(default)]
    pub edition_times: Vec<u64>,
}

/// Per-feature accumulators for one booster kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoosterState {
    pub num_total: i64,
    pub highest_total: i64,
    pub num_claimed: u64,
    pub num_used: u64,
    pub num_active: u64,
    pub num_success: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedBadge {
    pub possession: bool,
    pub first_obtained: u64,
    /// Timestamp of the current grant, -1 while lost.
    pub cur_obtained: i64,
    pub last_lost: u64,
    pub times_lost: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub general: GeneralStats,
    #[serde(default)]
    pub quests: QuestStats,
    #[serde(default)]
    pub challenges: BTreeMap<String, ChallengeStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralStats {
    /// Currency score, clamped into `[0, max_score]` by reconciliation.
    pub score: i64,
    pub total_items: u64,
    #[serde(default)]
    pub last_item: String,
    #[serde(default)]
    pub favorite_item: String,
    pub first_daily: u64,
    pub last_daily: u64,
    pub num_dailies: u64,
    pub streak: u64,
    pub highest_streak: u64,
    /// Derived: distinct owned kinds + highest streak, clamped.
    pub multiplier: u64,
    pub highest_multiplier: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStats {
    /// Cached cycle-start timestamp. A mismatch against the global
    /// `QuestCycleRecord` invalidates both vectors.
    pub cycle_start: u64,
    pub progress: Vec<u64>,
    pub claimed: Vec<u64>,
}

impl Default for QuestStats {
    fn default() -> Self {
        Self {
            cycle_start: 0,
            progress: vec![0; QUEST_SLOTS],
            claimed: vec![0; CLAIM_SLOTS],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeStats {
    pub attempts: u64,
    pub wins: u64,
    pub fastest_ms: u64,
}

impl UserRecord {
    /// Distinct item kinds the user owns with a positive count.
    pub fn distinct_owned(&self) -> usize {
        self.items.items.values().filter(|i| i.num > 0).count()
    }
}
