//! End-to-end workflows: mutations flow through the stats service into the
//! bucket stores, then back out through the HTTP router.

mod utils;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tournament_tally::{
    game::parse_score,
    router,
    stats::{BucketStore, InMemoryBucketStore},
    tournament::{InMemoryTournamentRepository, ParticipantResolution},
    AggregateBucket, AppState, GameMutation, GameRecord, MutationOutcome, PeriodKey, StatsService,
    Tournament,
};
use utils::setup::StoreKind;
use utils::{GameBuilder, TestSetupBuilder};

// ============================================================================
// Worked scenarios
// ============================================================================

fn scenario_game() -> GameBuilder {
    GameBuilder::new("game-1").at("2024-03-01T10:00:00Z")
}

#[tokio::test]
async fn test_scenario_create_then_update_then_move_then_delete() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    // Scenario A: creation
    let created = scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build();
    setup.process(GameMutation::created(created.clone())).await;

    let day_one = setup.bucket("2024-03-01").await;
    assert_eq!((day_one.score(0), day_one.score(1)), (10, 7));
    assert_eq!((day_one.wins(0), day_one.wins(1)), (1, 0));

    // Scenario B: in-place update with a winner change
    let updated = scenario_game().score("Ana", 10).score("Bo", 12).winner("Bo").build();
    setup
        .process(GameMutation::updated(created, updated.clone()))
        .await;

    let day_one = setup.bucket("2024-03-01").await;
    assert_eq!((day_one.score(0), day_one.score(1)), (10, 12));
    assert_eq!((day_one.wins(0), day_one.wins(1)), (0, 1));

    // Scenario C: the game moves to the next day
    let moved = GameBuilder::new("game-1")
        .at("2024-03-02T09:00:00Z")
        .score("Ana", 10)
        .score("Bo", 12)
        .winner("Bo")
        .build();
    let outcome = setup
        .process(GameMutation::updated(updated, moved.clone()))
        .await;
    assert_eq!(outcome.applied.len(), 2);

    let day_one = setup.bucket("2024-03-01").await;
    let day_two = setup.bucket("2024-03-02").await;
    assert_eq!((day_one.score(0), day_one.score(1)), (0, 0));
    assert_eq!((day_one.wins(0), day_one.wins(1)), (0, 0));
    assert_eq!((day_two.score(0), day_two.score(1)), (10, 12));
    assert_eq!((day_two.wins(0), day_two.wins(1)), (0, 1));

    // Scenario D: deletion
    setup.process(GameMutation::deleted(moved)).await;

    let day_two = setup.bucket("2024-03-02").await;
    assert_eq!((day_two.score(0), day_two.score(1)), (0, 0));
    assert_eq!((day_two.wins(0), day_two.wins(1)), (0, 0));
}

#[tokio::test]
async fn test_scenario_b_sums_with_an_earlier_game() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    let first = GameBuilder::new("game-0")
        .at("2024-03-01T08:00:00Z")
        .score("Ana", 3)
        .score("Bo", 7)
        .winner("Bo")
        .build();
    setup.process(GameMutation::created(first)).await;

    let created = scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build();
    setup.process(GameMutation::created(created.clone())).await;

    let updated = scenario_game().score("Ana", 10).score("Bo", 12).winner("Bo").build();
    setup.process(GameMutation::updated(created, updated)).await;

    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!((bucket.score(0), bucket.score(1)), (13, 19));
    assert_eq!((bucket.wins(0), bucket.wins(1)), (0, 2));
}

#[tokio::test]
async fn test_positional_keys_and_unknown_tournament() {
    let setup = TestSetupBuilder::new()
        .with_ana_and_bo()
        .with_resolution(ParticipantResolution::Positional)
        .build();

    let game = GameBuilder::new("game-1")
        .score(0usize, 4)
        .score("1", "6")
        .winner(1usize)
        .build();
    setup.process(GameMutation::created(game)).await;

    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!((bucket.score(0), bucket.score(1)), (4, 6));
    assert_eq!((bucket.wins(0), bucket.wins(1)), (0, 1));

    let stray = GameBuilder::new("game-2")
        .in_tournament("tournament-404")
        .score(0usize, 9)
        .build();
    let outcome = setup.process(GameMutation::created(stray)).await;
    assert!(outcome.is_skipped());
    assert_eq!(setup.bucket("2024-03-01").await.score(0), 4);
}

// ============================================================================
// Extreme inputs
// ============================================================================

#[tokio::test]
async fn test_extreme_scores_saturate_on_create_and_delete() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    let first = scenario_game().score("Ana", 1e19).winner("Ana").build();
    let second = GameBuilder::new("game-2")
        .at("2024-03-01T11:00:00Z")
        .score("Ana", 1e19)
        .score("Bo", "-9223372036854775808")
        .build();
    setup.process(GameMutation::created(first)).await;
    setup.process(GameMutation::created(second.clone())).await;

    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!(bucket.score(0), i64::MAX);
    assert_eq!(bucket.score(1), i64::MIN);
    assert_eq!(bucket.wins(0), 1);

    setup.process(GameMutation::deleted(second)).await;

    // saturated totals lose the first game's share; the floor keeps them at zero
    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!(bucket.score(0), 0);
    assert_eq!(bucket.score(1), 0);
    assert_eq!(bucket.wins(0), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redelivery_counts_once() {
    let setup = TestSetupBuilder::new()
        .with_ana_and_bo()
        .with_store(StoreKind::Optimistic)
        .with_max_retries(10)
        .with_dedupe()
        .build();
    let mutation = GameMutation::created(
        scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build(),
    )
    .with_event_id(Uuid::new_v4());

    let tasks = (0..8).map(|_| {
        let service = setup.service.clone();
        let mutation = mutation.clone();
        tokio::spawn(async move { service.process_mutation(&mutation).await })
    });

    let mut applied = 0;
    for result in join_all(tasks).await {
        applied += result.unwrap().unwrap().applied.len();
    }
    assert_eq!(applied, 1);

    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!((bucket.score(0), bucket.score(1)), (10, 7));
    assert_eq!(bucket.wins(0), 1);
}

// ============================================================================
// Conservation and floors
// ============================================================================

#[tokio::test]
async fn test_cross_period_move_leaves_other_games_untouched() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    let neighbour = GameBuilder::new("game-2")
        .at("2024-03-01T18:00:00Z")
        .score("Ana", 5)
        .score("Bo", 6)
        .winner("Bo")
        .build();
    setup.process(GameMutation::created(neighbour)).await;

    let original = scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build();
    setup.process(GameMutation::created(original.clone())).await;

    let moved = GameBuilder::new("game-1")
        .at("2024-03-02T09:00:00Z")
        .score("Ana", 1)
        .score("Bo", 2)
        .winner("Ana")
        .build();
    setup.process(GameMutation::updated(original, moved)).await;

    let day_one = setup.bucket("2024-03-01").await;
    let day_two = setup.bucket("2024-03-02").await;

    assert_eq!((day_one.score(0), day_one.score(1)), (5, 6));
    assert_eq!((day_one.wins(0), day_one.wins(1)), (0, 1));
    assert_eq!((day_two.score(0), day_two.score(1)), (1, 2));
    assert_eq!((day_two.wins(0), day_two.wins(1)), (1, 0));
}

#[tokio::test]
async fn test_deletion_never_drives_aggregates_negative() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    // Bucket that is already inconsistent with the game being removed
    let store = Arc::new(InMemoryBucketStore::new());
    let mut seeded = AggregateBucket::default();
    seeded.scores.insert(0, 4);
    seeded.scores.insert(1, 20);
    store
        .put_bucket(&setup.tournament_id, PeriodKey::new("2024-03-01"), seeded)
        .await;

    let tournaments = Arc::new(InMemoryTournamentRepository::with_tournaments(vec![
        Tournament::with_names(setup.tournament_id.clone(), &["Ana", "Bo"]),
    ]));
    let service = StatsService::builder(tournaments, store.clone())
        .with_participant_resolution(ParticipantResolution::ByName)
        .build();

    let game = scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build();
    service
        .process_mutation(&GameMutation::deleted(game))
        .await
        .unwrap();

    let bucket = store
        .get_bucket(&setup.tournament_id, &PeriodKey::new("2024-03-01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bucket.score(0), 0);
    assert_eq!(bucket.score(1), 13);
    assert_eq!(bucket.wins(0), 0);
}

// ============================================================================
// Reconciliation against a from-scratch recomputation
// ============================================================================

const DAYS: [&str; 3] = ["2024-03-01", "2024-03-02", "2024-03-03"];
const NAMES: [&str; 3] = ["Ana", "Bo", "Cy"];

fn random_game(rng: &mut StdRng, game_id: &str) -> GameRecord {
    let day = DAYS[rng.random_range(0..DAYS.len())];
    let hour: u32 = rng.random_range(0..24);
    let mut builder = GameBuilder::new(game_id).at(&format!("{}T{:02}:30:00Z", day, hour));

    for name in NAMES {
        if rng.random_bool(0.8) {
            let score: Value = match rng.random_range(0..4) {
                0 => json!(format!("{}", rng.random_range(0..30u32))),
                1 => json!(rng.random_range(0..30u32) as f64 + 0.5),
                _ => json!(rng.random_range(0..30u32)),
            };
            builder = builder.score(name, score);
        }
    }
    if rng.random_bool(0.7) {
        builder = builder.winner(NAMES[rng.random_range(0..NAMES.len())]);
    }
    builder.build()
}

/// Aggregates recomputed from the final set of live games
fn recompute(games: &BTreeMap<String, GameRecord>) -> BTreeMap<String, AggregateBucket> {
    let mut expected: BTreeMap<String, AggregateBucket> = BTreeMap::new();
    for game in games.values() {
        let day = game.date_time.format("%Y-%m-%d").to_string();
        let bucket = expected.entry(day).or_default();
        for (key, raw) in &game.scores {
            let index = NAMES
                .iter()
                .position(|name| *name == key.to_string())
                .unwrap();
            *bucket.scores.entry(index).or_insert(0) += parse_score(raw).unwrap_or(0);
        }
        if let Some(winner) = &game.winner_key {
            let index = NAMES
                .iter()
                .position(|name| *name == winner.to_string())
                .unwrap();
            *bucket.wins.entry(index).or_insert(0) += 1;
        }
    }
    expected
}

async fn run_random_history(store: StoreKind, seed: u64) {
    let setup = TestSetupBuilder::new()
        .with_participants(&NAMES)
        .with_store(store)
        .build();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut live: BTreeMap<String, GameRecord> = BTreeMap::new();

    for step in 0..200 {
        let game_id = format!("game-{}", rng.random_range(0..12));
        let mutation = match live.get(&game_id).cloned() {
            None => {
                let game = random_game(&mut rng, &game_id);
                live.insert(game_id.clone(), game.clone());
                GameMutation::created(game)
            }
            Some(previous) if rng.random_bool(0.25) => {
                live.remove(&game_id);
                GameMutation::deleted(previous)
            }
            Some(previous) => {
                let current = random_game(&mut rng, &game_id);
                live.insert(game_id.clone(), current.clone());
                GameMutation::updated(previous, current)
            }
        };

        let outcome = setup.process(mutation).await;
        assert!(outcome.skipped.is_empty(), "step {} was skipped", step);
    }

    let expected = recompute(&live);
    for day in DAYS {
        let actual = setup.bucket(day).await;
        let wanted = expected.get(day).cloned().unwrap_or_default();
        for index in 0..NAMES.len() {
            assert_eq!(actual.score(index), wanted.score(index), "{} score of {}", day, NAMES[index]);
            assert_eq!(actual.wins(index), wanted.wins(index), "{} wins of {}", day, NAMES[index]);
        }
    }
}

#[tokio::test]
async fn test_random_history_reconciles_with_atomic_store() {
    for seed in [7, 42, 1234] {
        run_random_history(StoreKind::Atomic, seed).await;
    }
}

#[tokio::test]
async fn test_random_history_reconciles_with_optimistic_store() {
    for seed in [7, 42, 1234] {
        run_random_history(StoreKind::Optimistic, seed).await;
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creations_in_one_period_are_all_counted() {
    let setup = TestSetupBuilder::new()
        .with_ana_and_bo()
        .with_store(StoreKind::Optimistic)
        .with_max_retries(25)
        .build();

    let tasks = (0..20).map(|n| {
        let service = setup.service.clone();
        let game = GameBuilder::new(&format!("game-{}", n))
            .at("2024-03-01T12:00:00Z")
            .score("Ana", 2)
            .score("Bo", 3)
            .winner(if n % 2 == 0 { "Ana" } else { "Bo" })
            .build();
        tokio::spawn(async move { service.process_mutation(&GameMutation::created(game)).await })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let bucket = setup.bucket("2024-03-01").await;
    assert_eq!((bucket.score(0), bucket.score(1)), (40, 60));
    assert_eq!((bucket.wins(0), bucket.wins(1)), (10, 10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_in_disjoint_periods() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();

    let tasks = (1..=9).map(|day| {
        let service = setup.service.clone();
        let game = GameBuilder::new(&format!("game-{}", day))
            .at(&format!("2024-03-0{}T12:00:00Z", day))
            .score("Ana", day as i64)
            .winner("Ana")
            .build();
        tokio::spawn(async move { service.process_mutation(&GameMutation::created(game)).await })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let all = setup.buckets.buckets_for(&setup.tournament_id).await.unwrap();
    assert_eq!(all.len(), 9);
    for day in 1..=9i64 {
        let bucket = &all[&PeriodKey::new(format!("2024-03-0{}", day))];
        assert_eq!(bucket.score(0), day);
        assert_eq!(bucket.wins(0), 1);
    }
}

// ============================================================================
// Redelivery
// ============================================================================

#[tokio::test]
async fn test_redelivered_cross_period_update_applies_once() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().with_dedupe().build();

    let original = scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build();
    setup
        .process(GameMutation::created(original.clone()).with_event_id(Uuid::new_v4()))
        .await;

    let moved = GameBuilder::new("game-1")
        .at("2024-03-02T09:00:00Z")
        .score("Ana", 10)
        .score("Bo", 12)
        .winner("Bo")
        .build();
    let update = GameMutation::updated(original, moved).with_event_id(Uuid::new_v4());

    let first: MutationOutcome = setup.process(update.clone()).await;
    let second: MutationOutcome = setup.process(update).await;

    assert_eq!(first.applied.len(), 2);
    assert!(second.applied.is_empty());
    assert_eq!(second.duplicates.len(), 2);

    let day_one = setup.bucket("2024-03-01").await;
    let day_two = setup.bucket("2024-03-02").await;
    assert_eq!((day_one.score(0), day_one.score(1)), (0, 0));
    assert_eq!((day_two.score(0), day_two.score(1)), (10, 12));
    assert_eq!(day_two.wins(1), 1);
}

// ============================================================================
// HTTP surface
// ============================================================================

#[tokio::test]
async fn test_router_posts_mutation_then_reads_bucket() {
    let setup = TestSetupBuilder::new().with_ana_and_bo().build();
    let app = router(AppState::new(setup.service.clone()));

    let mutation = GameMutation::created(
        scenario_game().score("Ana", 10).score("Bo", 7).winner("Ana").build(),
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mutations")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&mutation).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/tournaments/{}/buckets/2024-03-01", setup.tournament_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let bucket: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(bucket["period"], "2024-03-01");
    assert_eq!(bucket["scores"]["0"], 10);
    assert_eq!(bucket["scores"]["1"], 7);
    assert_eq!(bucket["wins"]["0"], 1);
}

#[tokio::test]
async fn test_router_health() {
    let setup = TestSetupBuilder::new().build();
    let app = router(AppState::new(setup.service.clone()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
