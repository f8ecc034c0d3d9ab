use std::sync::Arc;

use classbook::clock::ManualClock;
use classbook::engine::{Engine, EngineError};
use classbook::model::{Actor, BookingStatus, Span};
use ulid::Ulid;

const HOUR: i64 = 3_600_000;
const T0: i64 = 1_893_456_000_000;

fn fresh_engine(tag: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("classbook_int_{tag}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Engine::new(dir.join("classbook.wal"), Arc::new(ManualClock::new(T0))).unwrap();
    Arc::new(engine)
}

fn assert_pairwise_disjoint(spans: &[Span]) {
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_requesters_never_double_book() {
    let engine = fresh_engine("race");
    let room_id = engine.create_resource("aula-magna".into(), 200).await.unwrap().id;

    // 64 requesters fight over 8 overlapping candidate slots, each shifted by
    // 15 minutes, so many pairs overlap and some pairs touch.
    let mut handles = Vec::new();
    for i in 0..64i64 {
        let engine = engine.clone();
        let offset = (i % 8) * HOUR / 4;
        handles.push(tokio::spawn(async move {
            let span = Span::try_new(T0 + HOUR + offset, T0 + 2 * HOUR + offset).unwrap();
            engine.place(room_id, Ulid::new(), span).await
        }));
    }

    let mut admitted = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(b) => admitted.push(b),
            Err(EngineError::IntervalConflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(!admitted.is_empty());
    let placed = engine.list_by_resource(room_id).await.unwrap();
    assert_eq!(placed.len(), admitted.len());
    let spans: Vec<Span> = placed.iter().map(|b| b.span).collect();
    assert_pairwise_disjoint(&spans);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn independent_resources_all_succeed() {
    let engine = fresh_engine("independent");
    let mut rooms = Vec::new();
    for i in 0..16 {
        rooms.push(engine.create_resource(format!("room-{i}"), 20).await.unwrap());
    }

    let span = Span::try_new(T0 + HOUR, T0 + 3 * HOUR).unwrap();
    let mut handles = Vec::new();
    for room in &rooms {
        let engine = engine.clone();
        let id = room.id;
        handles.push(tokio::spawn(async move {
            engine.place(id, Ulid::new(), span).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let placed = engine.list_by_status(&[BookingStatus::Placed]).await.unwrap();
    assert_eq!(placed.len(), rooms.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_and_place_race_keeps_ledger_consistent() {
    let engine = fresh_engine("cancel_race");
    let room_id = engine.create_resource("lab-3".into(), 12).await.unwrap().id;
    let owner = Ulid::new();
    let span = Span::try_new(T0 + HOUR, T0 + 2 * HOUR).unwrap();
    let first = engine.place(room_id, owner, span).await.unwrap();

    let canceller = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.cancel(first.id, Actor::Requester(owner)).await })
    };
    let mut placers = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        placers.push(tokio::spawn(async move {
            engine.place(room_id, Ulid::new(), span).await
        }));
    }

    canceller.await.unwrap().unwrap();
    let mut won = 0;
    for p in placers {
        if p.await.unwrap().is_ok() {
            won += 1;
        }
    }
    // the freed slot goes to at most one requester
    assert!(won <= 1);

    let placed: Vec<Span> = engine
        .list_by_status(&[BookingStatus::Placed])
        .await
        .unwrap()
        .iter()
        .map(|b| b.span)
        .collect();
    assert_eq!(placed.len(), won);
    assert_pairwise_disjoint(&placed);
}
