use crate::config::GameConfig;
use crate::records::global::QuestCycleRecord;
use crate::records::user::{
    BoosterState, ChallengeStats, CollectedBadge, UserRecord, CLAIM_SLOTS, QUEST_SLOTS,
};
use tracing::debug;

/// Normalizes a loaded user record against current configuration and numeric
/// bounds. Invoked every time a record is about to be trusted for mutation
/// and once more on the merged result of a commit.
///
/// Idempotent: a second application with the same inputs is a byte no-op.
pub fn reconcile_user(
    user: &mut UserRecord,
    game: &GameConfig,
    cycle: &QuestCycleRecord,
    now_ms: u64,
    extended_set: bool,
) {
    drop_unconfigured(user, game);
    ensure_feature_defaults(user, game);
    adopt_quest_cycle(user, cycle);
    clamp_accumulators(user, game);
    recompute_derived(user, game, now_ms);
    apply_completion_badge(user, game, now_ms, extended_set);
}

/// Step 1: schema drift is data to drop, not a hard failure. Dropped kinds
/// also release their contribution to `total_items` and any pointers at them.
fn drop_unconfigured(user: &mut UserRecord, game: &GameConfig) {
    let stale: Vec<String> = user
        .items
        .items
        .keys()
        .filter(|kind| !game.items.contains_key(*kind))
        .cloned()
        .collect();
    for kind in stale {
        if let Some(entry) = user.items.items.remove(&kind) {
            debug!(kind, num = entry.num, "dropped unconfigured item kind");
            user.stats.general.total_items = user.stats.general.total_items.saturating_sub(entry.num);
        }
        if user.stats.general.last_item == kind {
            user.stats.general.last_item.clear();
        }
        if user.stats.general.favorite_item == kind {
            user.stats.general.favorite_item.clear();
        }
    }

    user.items
        .boosters
        .retain(|kind, _| game.boosters.contains_key(kind));
    user.stats
        .challenges
        .retain(|category, _| game.challenge_categories.iter().any(|c| c == category));
}

/// Step 2: new features appear as zeroed sub-structures without an explicit
/// migration step.
fn ensure_feature_defaults(user: &mut UserRecord, game: &GameConfig) {
    for kind in game.boosters.keys() {
        user.items
            .boosters
            .entry(kind.clone())
            .or_insert_with(BoosterState::default);
    }
    for category in &game.challenge_categories {
        user.stats
            .challenges
            .entry(category.clone())
            .or_insert_with(ChallengeStats::default);
    }
}

/// Step 3: a cycle-start mismatch invalidates both quest vectors.
fn adopt_quest_cycle(user: &mut UserRecord, cycle: &QuestCycleRecord) {
    let quests = &mut user.stats.quests;
    if quests.cycle_start != cycle.cycle_start {
        quests.cycle_start = cycle.cycle_start;
        quests.progress = vec![0; QUEST_SLOTS];
        quests.claimed = vec![0; CLAIM_SLOTS];
    }
    quests.progress.resize(QUEST_SLOTS, 0);
    quests.claimed.resize(CLAIM_SLOTS, 0);
}

/// Step 4: clamp every bounded accumulator into its configured range.
fn clamp_accumulators(user: &mut UserRecord, game: &GameConfig) {
    let general = &mut user.stats.general;
    general.score = general.score.clamp(0, game.bounds.max_score);

    for (kind, booster) in &mut user.items.boosters {
        let max_total = game.boosters.get(kind).map_or(0, |b| b.max_total);
        booster.num_total = booster.num_total.clamp(0, max_total);
        booster.highest_total = booster.highest_total.clamp(0, max_total);
        // A user cannot have more active than the kind's holding cap. Also
        // bounds the per-application multiplier loop below.
        booster.num_active = booster.num_active.min(max_total.max(0) as u64);
    }
}

/// Step 5: derived fields recomputed deterministically from primary fields.
fn recompute_derived(user: &mut UserRecord, game: &GameConfig, now_ms: u64) {
    let uniques = user.distinct_owned() as u64;
    let active_boosters: u64 = user.items.boosters.values().map(|b| b.num_active).sum();
    let general = &mut user.stats.general;

    if general.highest_streak == 0 {
        general.highest_streak = general.streak;
    }
    if general
        .last_daily
        .saturating_add(2 * game.bounds.cycle_length_ms)
        < now_ms
    {
        general.streak = 0;
    }
    general.highest_streak = general.highest_streak.max(general.streak);

    general.multiplier = (uniques + general.highest_streak).min(game.bounds.multiplier_ceiling);

    // Each active booster applies a diminishing-returns bonus on top of the
    // 1-based multiplier, sequentially, capped per application.
    let mut visual = general.multiplier + 1;
    for _ in 0..active_boosters {
        let bonus = visual.div_ceil(10).min(game.bounds.booster_bonus_cap);
        visual += bonus;
    }
    visual -= 1;
    general.highest_multiplier = general.highest_multiplier.max(visual);
}

/// Step 6: grant or revoke the completion badge by comparing distinct owned
/// completion-counted kinds against the maximum achievable in this context.
fn apply_completion_badge(user: &mut UserRecord, game: &GameConfig, now_ms: u64, extended_set: bool) {
    if game.completion_badge.is_empty() {
        return;
    }
    let owned = user
        .items
        .items
        .iter()
        .filter(|(kind, item)| item.num > 0 && game.counts_toward_completion(kind, extended_set))
        .count();
    let max = game.max_completion_count(extended_set);

    if max > 0 && owned >= max {
        grant_badge(user, &game.completion_badge, now_ms);
    } else {
        revoke_badge(user, &game.completion_badge, now_ms);
    }
}

fn grant_badge(user: &mut UserRecord, badge_id: &str, now_ms: u64) {
    let badge = user
        .items
        .badges
        .entry(badge_id.to_string())
        .or_insert_with(|| CollectedBadge {
            first_obtained: now_ms,
            ..CollectedBadge::default()
        });
    if !badge.possession {
        badge.possession = true;
        badge.cur_obtained = now_ms as i64;
    }
}

fn revoke_badge(user: &mut UserRecord, badge_id: &str, now_ms: u64) {
    // A badge the user never held leaves no entry behind.
    if let Some(badge) = user.items.badges.get_mut(badge_id) {
        if badge.possession {
            badge.possession = false;
            badge.cur_obtained = -1;
            badge.last_lost = now_ms;
            badge.times_lost += 1;
        }
    }
}
