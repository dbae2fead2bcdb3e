use crate::config::GameConfig;
use crate::error::WarrenError;
use crate::reconcile::reconcile_user;
use crate::records::global::QuestCycleRecord;
use crate::records::user::UserRecord;
use crate::store::RecordStore;

/// How one field merges when an in-memory snapshot is committed over a
/// persisted snapshot that has diverged. Declared once here instead of
/// re-derived at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// `latest + (current - base)`: counters that must keep contributions
    /// from tasks that completed between this task's load and its commit.
    Accumulate,
    /// `max(latest, current)`: high-water marks. Delta-adding a high-water
    /// mark can overshoot the true maximum, so these merge by max.
    Max,
    /// `current` wins: fields only ever mutated by the shard holder.
    Replace,
}

/// The full policy table. Fields not listed are `Replace`.
pub const MERGE_POLICIES: &[(&str, MergePolicy)] = &[
    ("stats.quests.progress[*]", MergePolicy::Accumulate),
    ("stats.quests.claimed[*]", MergePolicy::Accumulate),
    ("items.boosters.*.num_claimed", MergePolicy::Accumulate),
    ("items.boosters.*.num_used", MergePolicy::Accumulate),
    ("items.boosters.*.num_success", MergePolicy::Accumulate),
    ("items.boosters.*.highest_total", MergePolicy::Max),
    ("stats.challenges.*.attempts", MergePolicy::Accumulate),
    ("stats.challenges.*.wins", MergePolicy::Accumulate),
    ("stats.general.highest_streak", MergePolicy::Max),
    ("stats.general.highest_multiplier", MergePolicy::Max),
];

fn merge_u64(policy: MergePolicy, base: u64, current: u64, latest: u64) -> u64 {
    match policy {
        MergePolicy::Accumulate => {
            if current >= base {
                latest.saturating_add(current - base)
            } else {
                latest.saturating_sub(base - current)
            }
        }
        MergePolicy::Max => latest.max(current),
        MergePolicy::Replace => current,
    }
}

fn merge_i64(policy: MergePolicy, base: i64, current: i64, latest: i64) -> i64 {
    match policy {
        MergePolicy::Accumulate => latest.saturating_add(current.saturating_sub(base)),
        MergePolicy::Max => latest.max(current),
        MergePolicy::Replace => current,
    }
}

/// Merges `current` (derived from `base`) into `latest`, the freshest
/// persisted snapshot, following `MERGE_POLICIES`.
pub fn merge_user(base: &UserRecord, current: &UserRecord, latest: &UserRecord) -> UserRecord {
    // Replace is the default for every field.
    let mut merged = current.clone();

    // Quest vectors accumulate slot-by-slot within one cycle. Across a cycle
    // boundary the snapshot on the newer cycle wins outright: cycle starts
    // are monotonic, and deltas gathered under a dead cycle are void.
    match latest
        .stats
        .quests
        .cycle_start
        .cmp(&current.stats.quests.cycle_start)
    {
        std::cmp::Ordering::Equal => {
            for i in 0..merged.stats.quests.progress.len() {
                merged.stats.quests.progress[i] = merge_u64(
                    MergePolicy::Accumulate,
                    slot(&base.stats.quests.progress, i),
                    slot(&current.stats.quests.progress, i),
                    slot(&latest.stats.quests.progress, i),
                );
            }
            for i in 0..merged.stats.quests.claimed.len() {
                merged.stats.quests.claimed[i] = merge_u64(
                    MergePolicy::Accumulate,
                    slot(&base.stats.quests.claimed, i),
                    slot(&current.stats.quests.claimed, i),
                    slot(&latest.stats.quests.claimed, i),
                );
            }
        }
        std::cmp::Ordering::Greater => {
            merged.stats.quests = latest.stats.quests.clone();
        }
        // `current` already adopted a newer cycle; `merged` carries it.
        std::cmp::Ordering::Less => {}
    }

    for (kind, booster) in &mut merged.items.boosters {
        let base_b = base.items.boosters.get(kind).cloned().unwrap_or_default();
        let latest_b = latest.items.boosters.get(kind).cloned().unwrap_or_default();
        booster.num_claimed = merge_u64(
            MergePolicy::Accumulate,
            base_b.num_claimed,
            booster.num_claimed,
            latest_b.num_claimed,
        );
        booster.num_used = merge_u64(
            MergePolicy::Accumulate,
            base_b.num_used,
            booster.num_used,
            latest_b.num_used,
        );
        booster.num_success = merge_u64(
            MergePolicy::Accumulate,
            base_b.num_success,
            booster.num_success,
            latest_b.num_success,
        );
        booster.highest_total = merge_i64(
            MergePolicy::Max,
            base_b.highest_total,
            booster.highest_total,
            latest_b.highest_total,
        );
    }

    for (category, challenge) in &mut merged.stats.challenges {
        let base_c = base.stats.challenges.get(category).cloned().unwrap_or_default();
        let latest_c = latest
            .stats
            .challenges
            .get(category)
            .cloned()
            .unwrap_or_default();
        challenge.attempts = merge_u64(
            MergePolicy::Accumulate,
            base_c.attempts,
            challenge.attempts,
            latest_c.attempts,
        );
        challenge.wins = merge_u64(
            MergePolicy::Accumulate,
            base_c.wins,
            challenge.wins,
            latest_c.wins,
        );
    }

    let general = &mut merged.stats.general;
    general.highest_streak = merge_u64(
        MergePolicy::Max,
        base.stats.general.highest_streak,
        general.highest_streak,
        latest.stats.general.highest_streak,
    );
    general.highest_multiplier = merge_u64(
        MergePolicy::Max,
        base.stats.general.highest_multiplier,
        general.highest_multiplier,
        latest.stats.general.highest_multiplier,
    );

    merged
}

fn slot(values: &[u64], i: usize) -> u64 {
    values.get(i).copied().unwrap_or(0)
}

/// Commit step run inside the entity's shard: re-load the latest persisted
/// snapshot, merge, reconcile the result once more, persist. Storage errors
/// propagate; this path never swallows them.
#[allow(clippy::too_many_arguments)]
pub fn commit_user(
    store: &RecordStore,
    game: &GameConfig,
    cycle: &QuestCycleRecord,
    key: &str,
    base: &UserRecord,
    current: &UserRecord,
    now_ms: u64,
    extended_set: bool,
) -> Result<UserRecord, WarrenError> {
    let latest: UserRecord = store.load(key)?.unwrap_or_default();
    let mut merged = merge_user(base, current, &latest);
    reconcile_user(&mut merged, game, cycle, now_ms, extended_set);
    store.save(key, &merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::user::BoosterState;

    #[test]
    fn accumulate_tolerates_diverged_snapshots() {
        let base = UserRecord::default();
        let mut current = base.clone();
        current.stats.quests.progress[2] = 3;

        // Another task committed +5 to the same slot in the meantime.
        let mut latest = base.clone();
        latest.stats.quests.progress[2] = 5;

        let merged = merge_user(&base, &current, &latest);
        assert_eq!(merged.stats.quests.progress[2], 8);
    }

    #[test]
    fn replace_fields_are_last_writer_wins() {
        let mut base = UserRecord::default();
        base.stats.general.score = 10;
        let mut current = base.clone();
        current.stats.general.score = 25;
        let mut latest = base.clone();
        latest.stats.general.score = 99;

        let merged = merge_user(&base, &current, &latest);
        assert_eq!(merged.stats.general.score, 25);
    }

    #[test]
    fn high_water_marks_merge_by_max() {
        let base = UserRecord::default();
        let mut current = base.clone();
        current.stats.general.highest_multiplier = 7;
        current.items.boosters.insert(
            "charm".into(),
            BoosterState {
                highest_total: 3,
                ..BoosterState::default()
            },
        );
        let mut latest = base.clone();
        latest.stats.general.highest_multiplier = 11;
        latest.items.boosters.insert(
            "charm".into(),
            BoosterState {
                highest_total: 6,
                ..BoosterState::default()
            },
        );

        let merged = merge_user(&base, &current, &latest);
        assert_eq!(merged.stats.general.highest_multiplier, 11);
        assert_eq!(merged.items.boosters["charm"].highest_total, 6);
    }

    #[test]
    fn cycle_rotation_between_load_and_commit_voids_stale_deltas() {
        let mut base = UserRecord::default();
        base.stats.quests.cycle_start = 100;
        let mut current = base.clone();
        current.stats.quests.progress[0] = 4;

        let mut latest = UserRecord::default();
        latest.stats.quests.cycle_start = 900;
        latest.stats.quests.progress[0] = 1;

        let merged = merge_user(&base, &current, &latest);
        assert_eq!(merged.stats.quests.cycle_start, 900);
        assert_eq!(merged.stats.quests.progress[0], 1);
    }

    #[test]
    fn newer_in_memory_cycle_survives_a_stale_snapshot() {
        // The task adopted a freshly rotated cycle; the persisted record
        // still carries the old one. The task's vectors must not be clobbered.
        let mut base = UserRecord::default();
        base.stats.quests.cycle_start = 900;
        let mut current = base.clone();
        current.stats.quests.progress[0] = 2;

        let mut latest = UserRecord::default();
        latest.stats.quests.cycle_start = 100;
        latest.stats.quests.progress[0] = 7;

        let merged = merge_user(&base, &current, &latest);
        assert_eq!(merged.stats.quests.cycle_start, 900);
        assert_eq!(merged.stats.quests.progress[0], 2);
    }

    #[test]
    fn policy_table_lists_every_accumulator() {
        let accumulate = MERGE_POLICIES
            .iter()
            .filter(|(_, p)| *p == MergePolicy::Accumulate)
            .count();
        let max = MERGE_POLICIES
            .iter()
            .filter(|(_, p)| *p == MergePolicy::Max)
            .count();
        assert_eq!(accumulate, 7);
        assert_eq!(max, 3);
    }
}
