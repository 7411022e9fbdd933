//! Races for the last seats of a schedule.

mod common;

use std::sync::Arc;

use common::Gym;
use futures::future::join_all;
use gym_booking::core::{Actor, BookingError};

#[tokio::test]
async fn test_exactly_one_reserve_wins_last_seat() {
    let gym = Gym::new();
    let engine = gym.engine();
    let schedule = gym.class(1, 1).await;

    let mut members = Vec::new();
    for _ in 0..16 {
        members.push(gym.member(Some(1)).await);
    }

    let results = join_all(
        members
            .iter()
            .map(|(member, _)| engine.reserve(*member, schedule, None)),
    )
    .await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::ClassFull)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(full, 15);
    assert_eq!(gym.store.confirmed_count(schedule).await, 1);

    let mut debited = 0;
    for (_, ledger) in &members {
        if gym.credits(*ledger).await == Some(0) {
            debited += 1;
        }
    }
    assert_eq!(debited, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_holds_across_spawned_tasks() {
    let gym = Gym::new();
    let engine = Arc::new(gym.engine());
    let schedule = gym.class(5, 1).await;

    let mut handles = Vec::new();
    for _ in 0..24 {
        let (member, _) = gym.member(Some(2)).await;
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.reserve(member, schedule, None).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err, BookingError::ClassFull),
        }
    }
    assert_eq!(winners, 5);
    assert_eq!(gym.store.confirmed_count(schedule).await, 5);
}

#[tokio::test]
async fn test_same_member_racing_gets_one_booking() {
    let gym = Gym::new();
    let engine = gym.engine();
    let schedule = gym.class(10, 1).await;
    let (member, ledger) = gym.member(Some(10)).await;

    let results = join_all((0..8).map(|_| engine.reserve(member, schedule, None))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == BookingError::DuplicateBooking));
    assert_eq!(gym.credits(ledger).await, Some(9));
}

#[tokio::test]
async fn test_cancel_and_reserve_race_never_overbooks() {
    let gym = Gym::new();
    let engine = gym.engine();
    let schedule = gym.class(1, 1).await;
    let (holder, _) = gym.member(Some(1)).await;
    let (waiting, _) = gym.member(Some(1)).await;
    let booking = engine.reserve(holder, schedule, None).await.unwrap();
    engine.waitlist().join(waiting, schedule).await.unwrap();

    let mut racers = Vec::new();
    for _ in 0..6 {
        racers.push(gym.member(Some(1)).await.0);
    }

    let cancel = engine.cancel(booking.id, Actor::Member(holder), None);
    let reserves = join_all(racers.iter().map(|m| engine.reserve(*m, schedule, None)));
    let (cancelled, _) = tokio::join!(cancel, reserves);
    cancelled.unwrap();

    assert_eq!(gym.store.confirmed_count(schedule).await, 1);
}
