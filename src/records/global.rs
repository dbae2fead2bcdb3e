use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Best-bid/best-ask summary for one item kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub current: i64,
    pub previous: i64,
    #[serde(default)]
    pub user_id: String,
}

/// Global per-kind document. The edition counter is advanced only inside the
/// global shard, which linearizes allocations without a storage-level lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalItemRecord {
    pub cur_edition: u64,
    #[serde(default)]
    pub best_buy: PriceSummary,
    #[serde(default)]
    pub best_sell: PriceSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
    /// User id -> scalar value. Insertion order is irrelevant.
    #[serde(default)]
    pub entries: BTreeMap<String, i64>,
    /// Cached ranking leader. Updated only after a verified better value is
    /// observed; re-applying the same leader is a no-op.
    #[serde(default)]
    pub top_user: Option<String>,
}

/// The single active quest cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestCycleRecord {
    pub cycle_start: u64,
    #[serde(default)]
    pub active: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanRecord {
    /// User id -> expiry timestamp (ms). Entries are removed once expired and
    /// observed.
    #[serde(default)]
    pub bans: BTreeMap<String, u64>,
}
