use chrono::{DateTime, Duration, TimeZone, Utc};
use luthier_booking::domain::types::{DateRange, ItemId, Price, RequestStatus, UserId};
use luthier_booking::storage::store::collections;
use luthier_booking::storage::{DocumentStore, InMemoryDocumentStore, SubjectRatingRecord};
use luthier_booking::{BookingConfig, BookingError, BookingOperations, BookingService};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn range(from: i64, to: i64) -> DateRange {
    DateRange::new(day(from), day(to)).unwrap()
}

fn owner() -> UserId {
    UserId::new("owner_001".to_string())
}

fn renter(n: u32) -> UserId {
    UserId::new(format!("renter_{:03}", n))
}

fn service_with_store() -> (BookingService, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let service = BookingService::new(store.clone(), BookingConfig::default());
    (service, store)
}

async fn listed_item(service: &BookingService, daily_price: Price) -> ItemId {
    service
        .create_item(owner(), "1962 Jazzmaster".to_string(), daily_price)
        .await
        .expect("Failed to create item")
}

#[tokio::test]
async fn test_end_to_end_accept_then_competing_request_is_rejected() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    // Request A: two whole days at 10/day.
    let a = service
        .submit_request(item_id, renter(1), range(1, 3))
        .await
        .expect("Failed to submit request A");
    assert_eq!(a.computed_total.as_decimal(), dec!(20.00));
    assert_eq!(a.status, RequestStatus::Pending);

    // A pending request reserves nothing.
    assert!(service
        .check_availability(item_id, range(1, 3))
        .await
        .unwrap());

    let accepted = service.decide(a.id, true, None).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert!(accepted.decided_at.is_some());
    assert!(!service
        .check_availability(item_id, range(1, 3))
        .await
        .unwrap());

    // Request B overlaps the accepted booking.
    let b = service
        .submit_request(item_id, renter(2), range(2, 4))
        .await
        .unwrap();

    let err = service.decide(b.id, true, None).await.unwrap_err();
    assert!(
        matches!(err, BookingError::Conflict { .. }),
        "Accepting an overlapping request should conflict, got {err:?}"
    );

    // The conflict left B pending; the owner still decides its outcome.
    let b_after = service.get_request(b.id).await.unwrap();
    assert_eq!(b_after.status, RequestStatus::Pending);

    let rejected = service
        .decide(b.id, false, Some("dates taken".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("dates taken"));

    // Exactly one blocked range on the persisted item record.
    let item = service.get_item(item_id).await.unwrap();
    assert_eq!(item.unavailable_ranges.len(), 1);
    assert_eq!(item.unavailable_ranges[0].request_id, a.id);

    // Disjoint dates are still free.
    assert!(service
        .check_availability(item_id, range(3, 5))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_decide_is_terminal_and_unknown_ids_surface_not_found() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(15))).await;

    let req = service
        .submit_request(item_id, renter(1), range(1, 2))
        .await
        .unwrap();
    service.decide(req.id, true, None).await.unwrap();

    let err = service.decide(req.id, false, None).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidStateTransition { .. }));

    let err = service
        .decide(luthier_booking::domain::types::RequestId::new(), true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { .. }));
}

#[tokio::test]
async fn test_withdrawn_listing_rejects_new_requests() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(15))).await;

    service.set_available(item_id, false).await.unwrap();
    let err = service
        .submit_request(item_id, renter(1), range(1, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound { kind: "item", .. }));
}

#[tokio::test]
async fn test_cancellation_frees_the_calendar_for_rebooking() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(25))).await;

    let first = service
        .submit_request(item_id, renter(1), range(5, 8))
        .await
        .unwrap();
    service.decide(first.id, true, None).await.unwrap();

    let cancelled = service.cancel(first.id).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    assert!(service
        .check_availability(item_id, range(5, 8))
        .await
        .unwrap());

    // Cancelled is terminal: no second cancel, no rating.
    let err = service.cancel(first.id).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidStateTransition { .. }));

    let second = service
        .submit_request(item_id, renter(2), range(5, 8))
        .await
        .unwrap();
    let accepted = service.decide(second.id, true, None).await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
}

#[tokio::test]
async fn test_rating_flow_rolls_up_and_is_exactly_once() {
    let (service, store) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    let req = service
        .submit_request(item_id, renter(7), range(1, 3))
        .await
        .unwrap();
    service.decide(req.id, true, None).await.unwrap();

    // The booking ended in the past, so it is completable.
    let snapshot = service.record_completion(req.id, 4.5).await.unwrap();
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.mean, 4.5);

    let item = service.get_item(item_id).await.unwrap();
    assert_eq!(item.rating_count, 1);
    assert_eq!(item.rating_mean, 4.5);

    // The renter aggregate was folded symmetrically.
    let doc = store
        .get(collections::SUBJECT_RATINGS, renter(7).as_str())
        .await
        .unwrap()
        .expect("renter aggregate should exist");
    let renter_rating = SubjectRatingRecord::from_document(&doc.body)
        .unwrap()
        .into_aggregator()
        .unwrap();
    assert_eq!(renter_rating.count(), 1);
    assert_eq!(renter_rating.mean(), 4.5);

    // Two audit events, one per subject.
    let events = store
        .query(
            collections::RATING_EVENTS,
            "related_request_id",
            &serde_json::Value::String(req.id.to_string()),
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 2);

    // The duplicate call is a no-op, even with a different score.
    let snapshot = service.record_completion(req.id, 1.0).await.unwrap();
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.mean, 4.5);

    let item = service.get_item(item_id).await.unwrap();
    assert_eq!(item.rating_count, 1);
}

#[tokio::test]
async fn test_rating_requires_a_finished_accepted_booking() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    // Still pending: not completable.
    let pending = service
        .submit_request(item_id, renter(1), range(1, 3))
        .await
        .unwrap();
    let err = service.record_completion(pending.id, 4.0).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidStateTransition { .. }));

    // Accepted but not ended yet: not completable either.
    let start = Utc::now() + Duration::days(30);
    let upcoming = DateRange::new(start, start + Duration::days(2)).unwrap();
    let req = service
        .submit_request(item_id, renter(1), upcoming)
        .await
        .unwrap();
    service.decide(req.id, true, None).await.unwrap();
    let err = service.record_completion(req.id, 4.0).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidStateTransition { .. }));

    // Out-of-range scores are rejected at the input boundary.
    let done = service
        .submit_request(item_id, renter(1), range(10, 12))
        .await
        .unwrap();
    service.decide(done.id, true, None).await.unwrap();
    let err = service.record_completion(done.id, 5.5).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidScore { .. }));
}

#[tokio::test]
async fn test_request_limits_are_enforced() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let config = BookingConfig {
        max_rental_days: 7,
        max_pending_per_item: 1,
    };
    let service = BookingService::new(store, config);
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    let err = service
        .submit_request(item_id, renter(1), range(1, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::LimitExceeded { .. }));

    service
        .submit_request(item_id, renter(1), range(1, 3))
        .await
        .unwrap();
    let err = service
        .submit_request(item_id, renter(2), range(10, 12))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::LimitExceeded { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_produce_exactly_one_winner() {
    let (service, _) = service_with_store();
    let service = Arc::new(service);
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    let a = service
        .submit_request(item_id, renter(1), range(1, 4))
        .await
        .unwrap();
    let b = service
        .submit_request(item_id, renter(2), range(2, 5))
        .await
        .unwrap();

    let task_a = {
        let service = service.clone();
        tokio::spawn(async move { service.decide(a.id, true, None).await })
    };
    let task_b = {
        let service = service.clone();
        tokio::spawn(async move { service.decide(b.id, true, None).await })
    };

    let results = [task_a.await.unwrap(), task_b.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one overlapping accept may win");

    let loser = results
        .iter()
        .find(|r| r.is_err())
        .unwrap()
        .as_ref()
        .unwrap_err();
    assert!(
        matches!(loser, BookingError::Conflict { .. }),
        "the losing accept must surface a conflict, got {loser:?}"
    );

    // One blocked range persisted; the losing request is still pending.
    let item = service.get_item(item_id).await.unwrap();
    assert_eq!(item.unavailable_ranges.len(), 1);

    let pending = service
        .list_requests(item_id, Some(RequestStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_list_requests_filters_by_status() {
    let (service, _) = service_with_store();
    let item_id = listed_item(&service, Price::from_decimal(dec!(10))).await;

    let a = service
        .submit_request(item_id, renter(1), range(1, 3))
        .await
        .unwrap();
    let b = service
        .submit_request(item_id, renter(2), range(4, 6))
        .await
        .unwrap();
    service.decide(a.id, true, None).await.unwrap();

    let all = service.list_requests(item_id, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let accepted = service
        .list_requests(item_id, Some(RequestStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, a.id);

    let pending = service
        .list_requests(item_id, Some(RequestStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);
}
