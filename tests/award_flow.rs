use std::sync::Arc;
use warren::config::{
    BoardConfig, BoardOrdering, BoardSource, CoreConfig, GameConfig, ItemKindConfig, QuestKind,
    RarityConfig,
};
use warren::records::user::QUEST_SLOTS;
use warren::store::MemoryBackend;
use warren::{MutationContext, WarrenInstance};

fn game() -> GameConfig {
    let mut game = GameConfig {
        completion_badge: "completionist".into(),
        ..GameConfig::default()
    };
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
    for kind in ["pebble", "shell"] {
        game.items.insert(
            kind.into(),
            ItemKindConfig {
                rarity: "common".into(),
                extended_only: false,
            },
        );
    }
    game.quests
        .insert("tier2".into(), QuestKind::CollectItems { tier: 2 });
    game.quests.insert("points".into(), QuestKind::CollectScore);
    game.quests
        .insert("daily".into(), QuestKind::CompleteDailies);
    game.boards.insert(
        "score".into(),
        BoardConfig {
            ordering: BoardOrdering::Descending,
            source: BoardSource::Score,
        },
    );
    game
}

fn instance() -> WarrenInstance {
    WarrenInstance::with_backend(
        CoreConfig::default(),
        game(),
        Arc::new(MemoryBackend::default()),
    )
}

fn cycle_ids() -> Vec<String> {
    let mut ids = vec!["daily".to_string(); QUEST_SLOTS];
    ids[0] = "tier2".into();
    ids[1] = "points".into();
    ids
}

#[tokio::test]
async fn get_or_create_lazily_persists_a_reconciled_record() {
    let instance = instance();
    let ctx = MutationContext::at(1_000);

    assert!(instance.user("alice").expect("read").is_none());
    let user = instance.get_or_create_user(ctx, "alice").await.expect("create");
    assert_eq!(user.stats.general.score, 0);

    let persisted = instance.user("alice").expect("read").expect("present");
    assert_eq!(persisted, user);
}

#[tokio::test]
async fn award_updates_collection_stats_quests_and_boards() {
    let instance = instance();
    let cycle = instance
        .rotate_quest_cycle(1_000, cycle_ids())
        .await
        .expect("rotate");
    let ctx = MutationContext::at(cycle.cycle_start + 5);

    let receipt = instance
        .award_items(
            ctx,
            "alice",
            vec!["pebble".into(), "shell".into()],
            vec![10, 5],
        )
        .await
        .expect("award");

    // One edition counter per kind.
    let editions: Vec<u64> = receipt.grants.iter().map(|g| g.edition).collect();
    assert_eq!(editions, vec![1, 1]);

    let user = &receipt.user;
    assert_eq!(user.stats.general.score, 15);
    assert_eq!(user.stats.general.total_items, 2);
    assert_eq!(user.stats.general.last_item, "shell");
    assert_eq!(user.items.items["pebble"].num, 1);
    assert_eq!(user.items.items["pebble"].editions, vec![1]);
    assert_eq!(user.items.items["pebble"].first_obtained, ctx.now_ms);

    // Slot 0 counts tier-2 items, slot 1 counts score.
    assert_eq!(user.stats.quests.progress[0], 2);
    assert_eq!(user.stats.quests.progress[1], 15);

    // Owning every completion-counted kind grants the badge.
    assert!(user.items.badges["completionist"].possession);

    // The trailing board refresh ran under the global shard.
    let board = instance.board("score").expect("read").expect("present");
    assert_eq!(board.entries["alice"], 15);
    assert_eq!(board.top_user.as_deref(), Some("alice"));
}

#[tokio::test]
async fn board_top_pointer_moves_only_on_a_verified_lead() {
    let instance = instance();
    instance
        .rotate_quest_cycle(1_000, cycle_ids())
        .await
        .expect("rotate");
    let ctx = MutationContext::at(1_005);

    instance
        .award_items(ctx, "alice", vec!["pebble".into()], vec![10])
        .await
        .expect("award");
    instance
        .award_items(ctx, "bob", vec!["pebble".into()], vec![4])
        .await
        .expect("award");

    let board = instance.board("score").expect("read").expect("present");
    assert_eq!(board.top_user.as_deref(), Some("alice"));
    assert_eq!(board.entries["bob"], 4);

    instance
        .award_items(ctx, "bob", vec!["pebble".into()], vec![20])
        .await
        .expect("award");
    let board = instance.board("score").expect("read").expect("present");
    assert_eq!(board.top_user.as_deref(), Some("bob"));
    assert_eq!(board.entries["bob"], 24);
}

#[tokio::test]
async fn bans_gate_by_expiry() {
    let instance = instance();
    instance.set_ban("alice", 10_000).await.expect("ban");

    assert_eq!(
        instance.check_ban("alice", 5_000).await.expect("check"),
        Some(10_000)
    );
    assert_eq!(instance.check_ban("alice", 10_000).await.expect("check"), None);

    instance.set_ban("bob", 10_000).await.expect("ban");
    instance.clear_ban("bob").await.expect("clear");
    assert_eq!(instance.check_ban("bob", 5_000).await.expect("check"), None);
}
