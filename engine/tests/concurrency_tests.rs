mod support;

use rust_decimal::dec;

use engine::EngineError;
use support::{Harness, OPEN_DAY, key};

#[tokio::test]
async fn parallel_bids_on_distinct_slots_all_land() {
    let h = Harness::ticked().await;

    let mut tasks = Vec::new();
    for gpu in 0..8 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(async move {
            engine.place_bid("alice", key(OPEN_DAY, 12, gpu)).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    assert_eq!(h.available("alice").await, dec!(2));
    for gpu in 0..8 {
        let (price, winner, _) = h.slot_state(key(OPEN_DAY, 12, gpu)).await;
        assert_eq!((price, winner.as_deref()), (1, Some("alice")));
    }
}

#[tokio::test]
async fn contended_slot_serializes_single_against_bulk() {
    // Bob can afford the batch only at base prices, so whichever side wins
    // the slot lock decides whether the batch lands at all.
    let h = Harness::ticked().await;
    h.engine
        .read(|doc| assert_eq!(doc.config.num_gpus, 8))
        .await;

    // Bring bob's available credits down to exactly 8.
    h.engine.place_bid("bob", key(OPEN_DAY, 9, 0)).await.unwrap();
    h.engine.place_bid("bob", key(OPEN_DAY, 9, 0)).await.unwrap();
    assert_eq!(h.available("bob").await, dec!(8));

    let contested = key(OPEN_DAY, 10, 4);
    let batch: Vec<_> = (0..8).map(|gpu| key(OPEN_DAY, 10, gpu)).collect();

    let single = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.place_bid("alice", contested).await })
    };
    let bulk = {
        let engine = h.engine.clone();
        let batch = batch.clone();
        tokio::spawn(async move { engine.place_bulk("bob", &batch).await })
    };

    let single_out = single.await.unwrap();
    let bulk_out = bulk.await.unwrap();

    match bulk_out {
        Ok(results) => {
            // Bulk won the ordering: all eight landed, and alice paid the
            // bumped price on the contested slot.
            assert_eq!(results.len(), 8);
            let alice = single_out.unwrap();
            assert_eq!(alice.new_price, 2);
            assert_eq!(alice.previous_winner.as_deref(), Some("bob"));
        }
        Err(EngineError::InsufficientCredits { required, .. }) => {
            // Single won: the batch saw the raised price, could no longer
            // cover the sum, and left every slot untouched.
            assert_eq!(required, dec!(9));
            let alice = single_out.unwrap();
            assert_eq!(alice.new_price, 1);
            for k in &batch {
                let (price, winner, _) = h.slot_state(*k).await;
                if *k == contested {
                    assert_eq!((price, winner.as_deref()), (1, Some("alice")));
                } else {
                    assert_eq!((price, winner), (0, None));
                }
            }
        }
        Err(other) => panic!("unexpected bulk failure: {other}"),
    }
}

#[tokio::test]
async fn readers_never_observe_a_partial_batch() {
    let h = Harness::ticked().await;
    let batch: Vec<_> = (0..8).map(|gpu| key(OPEN_DAY, 11, gpu)).collect();

    let writer = {
        let engine = h.engine.clone();
        let batch = batch.clone();
        tokio::spawn(async move { engine.place_bulk("carol", &batch).await })
    };

    // Hammer snapshots while the batch is in flight.
    for _ in 0..50 {
        let won = h
            .engine
            .read(|doc| {
                (0..8)
                    .filter(|gpu| {
                        doc.slot(&key(OPEN_DAY, 11, *gpu))
                            .is_some_and(|s| s.winner.as_deref() == Some("carol"))
                    })
                    .count()
            })
            .await;
        assert!(won == 0 || won == 8, "observed partial batch of {won}");
        tokio::task::yield_now().await;
    }

    writer.await.unwrap().unwrap();
    let won = h
        .engine
        .read(|doc| {
            (0..8)
                .filter(|gpu| {
                    doc.slot(&key(OPEN_DAY, 11, *gpu))
                        .is_some_and(|s| s.winner.as_deref() == Some("carol"))
                })
                .count()
        })
        .await;
    assert_eq!(won, 8);
}

#[tokio::test]
async fn overlapping_bulks_never_deadlock() {
    let h = Harness::ticked().await;

    // Two batches sharing three slots, submitted in opposite orders.
    let first: Vec<_> = (0..6).map(|gpu| key(OPEN_DAY, 13, gpu)).collect();
    let second: Vec<_> = (3..8).rev().map(|gpu| key(OPEN_DAY, 13, gpu)).collect();

    let a = {
        let engine = h.engine.clone();
        let keys = first.clone();
        tokio::spawn(async move { engine.place_bulk("alice", &keys).await })
    };
    let b = {
        let engine = h.engine.clone();
        let keys = second.clone();
        tokio::spawn(async move { engine.place_bulk("bob", &keys).await })
    };

    // Sorted acquisition means both finish, in some order.
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // The overlap went to whoever ran second.
    let (price, winner, _) = h.slot_state(key(OPEN_DAY, 13, 3)).await;
    assert_eq!(price, 2);
    assert!(winner.is_some());
}
