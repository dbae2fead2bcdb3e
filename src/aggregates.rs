use crate::config::{BoardOrdering, BoardSource, GameConfig};
use crate::error::WarrenError;
use crate::records::global::{BanRecord, GlobalItemRecord, LeaderboardRecord, QuestCycleRecord};
use crate::records::user::{UserRecord, QUEST_SLOTS};
use crate::records::{board_key, item_key, BAN_KEY, QUEST_CYCLE_KEY};
use crate::store::RecordStore;
use tracing::{debug, info};

/// One allocated edition for one item kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionGrant {
    pub kind: String,
    pub edition: u64,
}

/// Allocates one edition per requested kind, in order. Must run inside the
/// global shard: the scheduler, not a storage-level lock, linearizes
/// concurrent allocations.
///
/// First allocation of a kind initializes its price summaries from the rarity
/// base score. First allocation of a `gives_bonus` kind additionally advances
/// the configured bonus kind's counter; those editions are returned
/// separately.
pub fn allocate_editions(
    store: &RecordStore,
    game: &GameConfig,
    kinds: &[String],
) -> Result<(Vec<EditionGrant>, Vec<u64>), WarrenError> {
    let mut grants = Vec::with_capacity(kinds.len());
    let mut bonus_editions = Vec::new();

    for kind in kinds {
        let rarity = game
            .rarity_of(kind)
            .ok_or_else(|| WarrenError::UnknownItemKind(kind.clone()))?;
        let key = item_key(kind);
        let mut record = match store.load::<GlobalItemRecord>(&key)? {
            Some(record) => record,
            None => {
                info!(kind, "first edition of item kind");
                let mut record = GlobalItemRecord::default();
                record.best_buy.previous = rarity.base_score;
                record.best_sell.previous = rarity.base_score;
                if rarity.gives_bonus && !game.bonus_kind.is_empty() && game.bonus_kind != *kind {
                    let bonus_key = item_key(&game.bonus_kind);
                    let mut bonus: GlobalItemRecord =
                        store.load(&bonus_key)?.unwrap_or_default();
                    bonus.cur_edition += 1;
                    bonus_editions.push(bonus.cur_edition);
                    store.save(&bonus_key, &bonus)?;
                }
                record
            }
        };
        record.cur_edition += 1;
        grants.push(EditionGrant {
            kind: kind.clone(),
            edition: record.cur_edition,
        });
        store.save(&key, &record)?;
    }

    Ok((grants, bonus_editions))
}

/// Upserts a user's value on one board. Global-shard only.
pub fn update_board_entry(
    store: &RecordStore,
    game: &GameConfig,
    board: &str,
    user_id: &str,
    value: i64,
) -> Result<(), WarrenError> {
    if !game.boards.contains_key(board) {
        return Err(WarrenError::UnknownBoard(board.to_string()));
    }
    let key = board_key(board);
    let mut record: LeaderboardRecord = store.load(&key)?.unwrap_or_default();
    record.entries.insert(user_id.to_string(), value);
    store.save(&key, &record)
}

/// Compare-and-set on a board's cached top pointer, gated by the global shard
/// rather than the storage layer. Re-reads the persisted record, compares the
/// candidate against the current top's cached value (a missing top is always
/// beatable), and writes only on a verified lead. Re-applying the reigning
/// top user is a no-op. Returns whether the pointer changed.
pub fn maybe_set_top(
    store: &RecordStore,
    game: &GameConfig,
    board: &str,
    candidate: &str,
    candidate_value: i64,
) -> Result<bool, WarrenError> {
    let board_config = game
        .boards
        .get(board)
        .ok_or_else(|| WarrenError::UnknownBoard(board.to_string()))?;
    let key = board_key(board);
    let mut record: LeaderboardRecord = store.load(&key)?.unwrap_or_default();

    let leads = match record
        .top_user
        .as_deref()
        .and_then(|top| record.entries.get(top))
    {
        None => true,
        Some(&top_value) => match board_config.ordering {
            BoardOrdering::Descending => candidate_value > top_value,
            BoardOrdering::Ascending => candidate_value < top_value,
        },
    };

    if leads && record.top_user.as_deref() != Some(candidate) {
        debug!(board, candidate, candidate_value, "leaderboard top changed");
        record.top_user = Some(candidate.to_string());
        store.save(&key, &record)?;
        return Ok(true);
    }
    Ok(false)
}

/// Refreshes every configured board from a user snapshot. Global-shard only.
pub fn sync_boards(
    store: &RecordStore,
    game: &GameConfig,
    user_id: &str,
    user: &UserRecord,
) -> Result<(), WarrenError> {
    for (board, board_config) in &game.boards {
        let value = match board_config.source {
            BoardSource::Score => user.stats.general.score,
            BoardSource::TotalItems => user.stats.general.total_items as i64,
            BoardSource::Multiplier => user.stats.general.multiplier as i64,
            BoardSource::HighestStreak => user.stats.general.highest_streak as i64,
        };
        update_board_entry(store, game, board, user_id, value)?;
        maybe_set_top(store, game, board, user_id, value)?;
    }
    Ok(())
}

/// Replaces the single active quest cycle. Global-shard only.
pub fn rotate_quest_cycle(
    store: &RecordStore,
    game: &GameConfig,
    now_ms: u64,
    quest_ids: Vec<String>,
) -> Result<QuestCycleRecord, WarrenError> {
    if quest_ids.len() != QUEST_SLOTS {
        return Err(WarrenError::Validation(format!(
            "quest cycle needs {QUEST_SLOTS} quests, got {}",
            quest_ids.len()
        )));
    }
    for quest_id in &quest_ids {
        if !game.quests.contains_key(quest_id) {
            return Err(WarrenError::UnknownQuest(quest_id.clone()));
        }
    }
    let cycle = QuestCycleRecord {
        cycle_start: now_ms,
        active: quest_ids,
    };
    store.save(QUEST_CYCLE_KEY, &cycle)?;
    info!(cycle_start = cycle.cycle_start, "quest cycle rotated");
    Ok(cycle)
}

/// Global-shard only.
pub fn set_ban(store: &RecordStore, user_id: &str, until_ms: u64) -> Result<(), WarrenError> {
    let mut record: BanRecord = store.load(BAN_KEY)?.unwrap_or_default();
    record.bans.insert(user_id.to_string(), until_ms);
    store.save(BAN_KEY, &record)
}

/// Global-shard only.
pub fn clear_ban(store: &RecordStore, user_id: &str) -> Result<(), WarrenError> {
    let mut record: BanRecord = store.load(BAN_KEY)?.unwrap_or_default();
    if record.bans.remove(user_id).is_some() {
        store.save(BAN_KEY, &record)?;
    }
    Ok(())
}

/// Returns the ban expiry if the user is currently banned. An expired entry
/// is pruned as soon as it is observed. Global-shard only.
pub fn check_ban(
    store: &RecordStore,
    user_id: &str,
    now_ms: u64,
) -> Result<Option<u64>, WarrenError> {
    let mut record: BanRecord = store.load(BAN_KEY)?.unwrap_or_default();
    match record.bans.get(user_id).copied() {
        Some(expiry) if expiry > now_ms => Ok(Some(expiry)),
        Some(_) => {
            record.bans.remove(user_id);
            store.save(BAN_KEY, &record)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoardConfig, BoardOrdering, BoardSource, ItemKindConfig, RarityConfig};
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn game() -> GameConfig {
        let mut game = GameConfig {
            bonus_kind: "relic".into(),
            ..GameConfig::default()
        };
        game.rarities.insert(
            "rare".into(),
            RarityConfig {
                weight: 1.0,
                base_score: 50,
                gives_bonus: true,
                counts_toward_completion: true,
                track_all_editions: false,
                tier: 4,
            },
        );
        game.rarities.insert(
            "common".into(),
            RarityConfig {
                weight: 10.0,
                base_score: 2,
                gives_bonus: false,
                counts_toward_completion: true,
                track_all_editions: false,
                tier: 2,
            },
        );
        game.items.insert(
            "comet".into(),
            ItemKindConfig {
                rarity: "rare".into(),
                extended_only: false,
            },
        );
        game.items.insert(
            "pebble".into(),
            ItemKindConfig {
                rarity: "common".into(),
                extended_only: false,
            },
        );
        game.items.insert(
            "relic".into(),
            ItemKindConfig {
                rarity: "common".into(),
                extended_only: false,
            },
        );
        game.boards.insert(
            "score".into(),
            BoardConfig {
                ordering: BoardOrdering::Descending,
                source: BoardSource::Score,
            },
        );
        game.boards.insert(
            "fastest".into(),
            BoardConfig {
                ordering: BoardOrdering::Ascending,
                source: BoardSource::Score,
            },
        );
        game
    }

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryBackend::default()))
    }

    #[test]
    fn editions_increment_by_exactly_one() {
        let store = store();
        let game = game();
        let mut seen = Vec::new();
        for _ in 0..5 {
            let (grants, _) =
                allocate_editions(&store, &game, &["pebble".to_string()]).expect("allocate");
            seen.push(grants[0].edition);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn first_award_of_bonus_rarity_advances_bonus_counter_once() {
        let store = store();
        let game = game();

        let (grants, bonus) =
            allocate_editions(&store, &game, &["comet".to_string()]).expect("allocate");
        assert_eq!(grants[0].edition, 1);
        assert_eq!(bonus, vec![1]);

        // Second award of the same kind: no further bonus edition.
        let (grants, bonus) =
            allocate_editions(&store, &game, &["comet".to_string()]).expect("allocate");
        assert_eq!(grants[0].edition, 2);
        assert!(bonus.is_empty());

        let relic: GlobalItemRecord = store
            .load(&item_key("relic"))
            .expect("load")
            .expect("present");
        assert_eq!(relic.cur_edition, 1);
    }

    #[test]
    fn unknown_kind_is_a_hard_failure() {
        let store = store();
        let err = allocate_editions(&store, &game(), &["ghost".to_string()]).unwrap_err();
        assert_eq!(err.code_str(), "unknown_item_kind");
    }

    #[test]
    fn top_pointer_follows_board_ordering() {
        let store = store();
        let game = game();

        update_board_entry(&store, &game, "score", "alice", 10).expect("entry");
        assert!(maybe_set_top(&store, &game, "score", "alice", 10).expect("cas"));

        // A lower value does not take the descending board.
        update_board_entry(&store, &game, "score", "bob", 5).expect("entry");
        assert!(!maybe_set_top(&store, &game, "score", "bob", 5).expect("cas"));

        update_board_entry(&store, &game, "score", "bob", 11).expect("entry");
        assert!(maybe_set_top(&store, &game, "score", "bob", 11).expect("cas"));

        // Re-applying the reigning top is a no-op.
        assert!(!maybe_set_top(&store, &game, "score", "bob", 11).expect("cas"));

        // Ascending board: lower wins.
        update_board_entry(&store, &game, "fastest", "alice", 300).expect("entry");
        assert!(maybe_set_top(&store, &game, "fastest", "alice", 300).expect("cas"));
        update_board_entry(&store, &game, "fastest", "bob", 200).expect("entry");
        assert!(maybe_set_top(&store, &game, "fastest", "bob", 200).expect("cas"));
    }

    #[test]
    fn expired_bans_are_pruned_when_observed() {
        let store = store();
        set_ban(&store, "alice", 1_000).expect("ban");

        assert_eq!(check_ban(&store, "alice", 500).expect("check"), Some(1_000));
        assert_eq!(check_ban(&store, "alice", 2_000).expect("check"), None);

        let record: BanRecord = store.load(BAN_KEY).expect("load").expect("present");
        assert!(record.bans.is_empty());
    }

    #[test]
    fn quest_rotation_validates_slot_count_and_ids() {
        let store = store();
        let mut game = game();
        game.quests
            .insert("daily".into(), crate::config::QuestKind::CompleteDailies);

        let err = rotate_quest_cycle(&store, &game, 1, vec!["daily".into()]).unwrap_err();
        assert_eq!(err.code_str(), "validation");

        let err =
            rotate_quest_cycle(&store, &game, 1, vec!["nope".into(); QUEST_SLOTS]).unwrap_err();
        assert_eq!(err.code_str(), "unknown_quest");

        let cycle = rotate_quest_cycle(&store, &game, 7_777, vec!["daily".into(); QUEST_SLOTS])
            .expect("rotate");
        assert_eq!(cycle.cycle_start, 7_777);
        let loaded: QuestCycleRecord = store
            .load(QUEST_CYCLE_KEY)
            .expect("load")
            .expect("present");
        assert_eq!(loaded, cycle);
    }
}
