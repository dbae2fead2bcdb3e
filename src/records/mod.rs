pub mod global;
pub mod user;

pub use global::{BanRecord, GlobalItemRecord, LeaderboardRecord, PriceSummary, QuestCycleRecord};
pub use user::{
    BoosterState, ChallengeStats, CollectedBadge, CollectedItem, GeneralStats, ItemCollection,
    QuestStats, UserRecord, UserStats, CLAIM_SLOTS, QUEST_SLOTS,
};

pub const QUEST_CYCLE_KEY: &str = "quests";
pub const BAN_KEY: &str = "bans";

/// Percent-encodes everything outside `[A-Za-z0-9_-]`, byte-wise. Key
/// derivation stays total over arbitrary identifiers, the same way shard
/// derivation is, and the mapping is injective ('%' itself is encoded).
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(b as char),
            _ => {
                out.push('%');
                out.push_str(&format!("{b:02X}"));
            }
        }
    }
    out
}

pub fn user_key(user_id: &str) -> String {
    format!("user/{}", encode_component(user_id))
}

pub fn item_key(kind: &str) -> String {
    format!("items/{}", encode_component(kind))
}

pub fn board_key(kind: &str) -> String {
    format!("board/{}", encode_component(kind))
}
