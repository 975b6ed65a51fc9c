//! End-to-end booking scenarios on the in-memory engine.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::{at, book, spectator, Venue};
use futures::future::join_all;
use tickly_server::models::{EventStatus, TicketStatus};
use tickly_server::utils::AppError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_stop_at_zone_capacity() {
    let venue = Venue::new().await;
    let event = venue.published_concert(2).await;
    let zone_id = event.zones[0].id;

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let engine = venue.engine.clone();
            let event_id = event.id;
            tokio::spawn(async move {
                book(&engine, &spectator(), event_id, zone_id, 1, None).await
            })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 2);
    let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(rejected.len(), 1);
    assert!(matches!(
        rejected[0],
        AppError::InsufficientCapacity {
            requested: 1,
            remaining: 0,
            ..
        }
    ));

    let fills = venue.engine.zone_fills(event.id).await.unwrap();
    assert_eq!(fills[0].issued, 2);
    assert_eq!(fills[0].remaining, 0);
}

#[tokio::test]
async fn touching_events_share_an_area_but_overlapping_ones_do_not() {
    let venue = Venue::new().await;

    let first = venue
        .schedule(venue.draft(
            "Morning rehearsal",
            at(3, 10),
            at(3, 12),
            &[(&venue.stage_pit, 100)],
        ))
        .await
        .unwrap();

    // Different template, same area: still a collision.
    let overlapping = venue
        .schedule(venue.draft(
            "Late talk",
            at(3, 11),
            at(3, 13),
            &[(&venue.stage_balcony, 50)],
        ))
        .await;
    match overlapping {
        Err(AppError::Conflict { conflicts }) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].event_id, first.id);
            assert_eq!(conflicts[0].area_ids, vec![venue.stage.id]);
        }
        other => panic!("expected a schedule conflict, got {:?}", other),
    }

    let touching = venue
        .schedule(venue.draft(
            "Lunch concert",
            at(3, 12),
            at(3, 13),
            &[(&venue.stage_balcony, 50)],
        ))
        .await
        .unwrap();
    assert_eq!(touching.status, EventStatus::Draft);
    assert_eq!(touching.start_time, first.end_time);
}

#[tokio::test]
async fn a_ticket_can_only_be_validated_once() {
    let venue = Venue::new().await;
    let event = venue.published_concert(10).await;
    let reservation = venue.book(&spectator(), &event, 1).await.unwrap();
    let code = reservation.tickets[0].redemption_code.clone();

    venue.clock.set(event.start_time - Duration::minutes(30));
    let door = venue.door_staff();

    let first = venue.engine.validate_ticket(&code, &door).await.unwrap();
    assert_eq!(first.ticket_id, reservation.tickets[0].id);
    assert_eq!(first.status, TicketStatus::Used);
    assert_eq!(first.participant.first_name, "Guest1");

    match venue.engine.validate_ticket(&code, &door).await {
        Err(AppError::StateConflict {
            ticket_id,
            status,
            validated_at,
        }) => {
            assert_eq!(ticket_id, first.ticket_id);
            assert_eq!(status, TicketStatus::Used);
            assert_eq!(validated_at, Some(first.validated_at));
        }
        other => panic!("expected a state conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn oversized_booking_creates_nothing() {
    let venue = Venue::new().await;
    let event = venue.published_concert(5).await;
    venue.book(&spectator(), &event, 3).await.unwrap();

    let latecomer = spectator();
    match venue.book(&latecomer, &event, 3).await {
        Err(AppError::InsufficientCapacity {
            requested,
            remaining,
            ..
        }) => {
            assert_eq!(requested, 3);
            assert_eq!(remaining, 2);
        }
        other => panic!("expected insufficient capacity, got {:?}", other),
    }

    assert!(venue
        .engine
        .get_tickets_for_user(latecomer.user_id)
        .await
        .unwrap()
        .is_empty());
    assert!(venue
        .engine
        .get_reservations_for_user(latecomer.user_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        venue
            .engine
            .remaining_capacity(event.id, event.zones[0].id)
            .await
            .unwrap(),
        2
    );
}
