use event_bucket_core::config::{CursorBoundary, FetchSettings};
use event_bucket_core::contract::{Cursor, FetchRequest, MockEventsApi, PageResponse, Record};
use event_bucket_core::error::FetchError;
use event_bucket_core::fetch::PaginatedFetcher;
use mockall::Sequence;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn settings(page_size: u32, retry_sla: u32) -> FetchSettings {
    FetchSettings {
        page_size,
        retry_sla,
        retry_delay: Duration::ZERO,
        cursor_boundary: CursorBoundary::DropLast,
    }
}

fn record(id: u32) -> serde_json::Value {
    json!({"id": id.to_string(), "object": "event", "seq": id})
}

fn page_body<I: IntoIterator<Item = u32>>(ids: I) -> String {
    serde_json::to_string(&ids.into_iter().map(record).collect::<Vec<_>>()).unwrap()
}

fn ids(records: &[Record]) -> Vec<u32> {
    records
        .iter()
        .map(|r| r.cursor_id().unwrap().parse().unwrap())
        .collect()
}

/// Serves `total` records, `limit` at a time, starting at the cursor record itself
/// (the cursor record re-surfaces as the first entry of the next page).
fn resurfacing_api(total: u32) -> MockEventsApi {
    let mut api = MockEventsApi::new();
    api.expect_post_page().returning(move |req: &FetchRequest| {
        let start = match &req.starting_after {
            None => 1,
            Some(cursor) => cursor.parse::<u32>().unwrap(),
        };
        let end = (start + req.page_size).min(total + 1);
        Ok(PageResponse::new(200, page_body(start..end)))
    });
    api
}

/// Serves `total` records strictly after the cursor.
fn exclusive_api(total: u32) -> MockEventsApi {
    let mut api = MockEventsApi::new();
    api.expect_post_page().returning(move |req: &FetchRequest| {
        let start = match &req.starting_after {
            None => 1,
            Some(cursor) => cursor.parse::<u32>().unwrap() + 1,
        };
        let end = (start + req.page_size).min(total + 1);
        Ok(PageResponse::new(200, page_body(start..end)))
    });
    api
}

#[tokio::test]
async fn full_pages_until_short_page_lose_and_duplicate_nothing() {
    for page_size in [10, 37, 100] {
        for total in [0, 9, 10, 95, 100, 250] {
            let api = resurfacing_api(total);
            let fetcher = PaginatedFetcher::new(&api, settings(page_size, 0));
            let result = fetcher
                .fetch_all_for_day("payment", "2024-03-01")
                .await
                .expect("walk succeeds");
            assert_eq!(
                ids(&result.records),
                (1..=total).collect::<Vec<_>>(),
                "page_size={page_size} total={total}"
            );
            assert_eq!(result.retries, 0);
        }
    }
}

#[tokio::test]
async fn keep_all_boundary_matches_strictly_exclusive_cursor() {
    for total in [0, 10, 23, 40] {
        let api = exclusive_api(total);
        let mut s = settings(10, 0);
        s.cursor_boundary = CursorBoundary::KeepAll;
        let fetcher = PaginatedFetcher::new(&api, s);
        let result = fetcher
            .fetch_all_for_day("payment", "2024-03-01")
            .await
            .expect("walk succeeds");
        assert_eq!(ids(&result.records), (1..=total).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn single_short_page_is_returned_unmodified() {
    let body = r#"[{"id":"evt_1","amount":5,"meta":{"k":"v"}},{"id":"evt_2","amount":7}]"#;
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .withf(|req: &FetchRequest| {
            req.starting_after.is_none()
                && req.ending_before.is_none()
                && req.event_type == "payment"
                && req.day == "2024-03-01"
                && req.page_size == 10
        })
        .returning(move |_| Ok(PageResponse::new(200, body)));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 3));
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap();

    let expected: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();
    assert_eq!(
        result.records.iter().map(|r| r.0.clone()).collect::<Vec<_>>(),
        expected
    );
    assert_eq!(result.retries, 0);
    assert_eq!(result.pages, 1);
}

#[tokio::test]
async fn gateway_timeout_then_success_spends_one_retry() {
    let mut api = MockEventsApi::new();
    let mut seq = Sequence::new();
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(PageResponse::new(200, page_body(1..=3))));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 2));
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap();
    assert_eq!(ids(&result.records), vec![1, 2, 3]);
    assert_eq!(result.retries, 1);
}

#[tokio::test]
async fn zero_retry_budget_fails_on_first_gateway_timeout() {
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 0));
    let err = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            FetchError::RetryExhausted {
                retries: 0,
                last_status: 502
            }
        ),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn retries_stop_once_budget_is_spent() {
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(3)
        .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 2));
    let err = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FetchError::RetryExhausted {
            retries: 2,
            last_status: 502
        }
    ));
}

#[tokio::test]
async fn page_size_below_floor_fails_before_any_request() {
    let mut api = MockEventsApi::new();
    api.expect_post_page().times(0);

    let fetcher = PaginatedFetcher::new(&api, settings(5, 2));
    let err = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Validation { page_size: 5 }));

    let fetcher = PaginatedFetcher::new(&api, settings(101, 2));
    assert!(matches!(
        fetcher.fetch_all_for_day("payment", "2024-03-01").await,
        Err(FetchError::Validation { page_size: 101 })
    ));
}

#[tokio::test]
async fn forbidden_fails_immediately_with_budget_left() {
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .returning(|_| Ok(PageResponse::new(403, r#"{"message":"Forbidden"}"#)));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 5));
    match fetcher.fetch_all_for_day("payment", "2024-03-01").await {
        Err(FetchError::Api { status, body }) => {
            assert_eq!(status, 403);
            assert!(body.contains("Forbidden"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn other_error_statuses_are_not_retried() {
    for status in [400, 404, 405, 500, 503] {
        let mut api = MockEventsApi::new();
        api.expect_post_page()
            .times(1)
            .returning(move |_| Ok(PageResponse::new(status, "nope")));
        let fetcher = PaginatedFetcher::new(&api, settings(10, 5));
        let err = fetcher
            .fetch_all_for_day("payment", "2024-03-01")
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::Api { status: s, .. } if s == status),
            "status {status}: {err:?}"
        );
    }
}

#[tokio::test]
async fn two_gateway_timeouts_on_second_page_then_success() {
    let mut api = MockEventsApi::new();
    let mut seq = Sequence::new();
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|req: &FetchRequest| req.starting_after.is_none())
        .returning(|_| Ok(PageResponse::new(200, page_body(1..=10))));
    api.expect_post_page()
        .times(2)
        .in_sequence(&mut seq)
        .withf(|req: &FetchRequest| req.starting_after.as_deref() == Some("10"))
        .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|req: &FetchRequest| req.starting_after.as_deref() == Some("10"))
        .returning(|_| Ok(PageResponse::new(200, page_body(11..=17))));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 2));
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap();

    let expected: Vec<u32> = (1..=9).chain(11..=17).collect();
    assert_eq!(ids(&result.records), expected);
    assert_eq!(result.retries, 2);
    assert_eq!(result.pages, 2);
}

#[tokio::test]
async fn keep_all_boundary_keeps_the_cursor_record() {
    let mut api = MockEventsApi::new();
    let mut seq = Sequence::new();
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(PageResponse::new(200, page_body(1..=10))));
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|req: &FetchRequest| req.starting_after.as_deref() == Some("10"))
        .returning(|_| Ok(PageResponse::new(200, page_body(11..=17))));

    let mut s = settings(10, 2);
    s.cursor_boundary = CursorBoundary::KeepAll;
    let fetcher = PaginatedFetcher::new(&api, s);
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap();
    assert_eq!(ids(&result.records), (1..=17).collect::<Vec<_>>());
}

#[tokio::test]
async fn retry_budget_resets_for_every_page() {
    let mut api = MockEventsApi::new();
    let mut seq = Sequence::new();
    for body in [page_body(1..=10), page_body(10..=12)] {
        api.expect_post_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));
        api.expect_post_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(PageResponse::new(200, body.clone())));
    }

    let fetcher = PaginatedFetcher::new(&api, settings(10, 1));
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .expect("each page gets its own single retry");
    assert_eq!(ids(&result.records), (1..=12).collect::<Vec<_>>());
    assert_eq!(result.retries, 2);
}

#[tokio::test]
async fn window_cursors_seed_the_walk_and_ending_before_sticks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_mock = seen.clone();
    let mut api = MockEventsApi::new();
    api.expect_post_page().returning(move |req: &FetchRequest| {
        seen_in_mock.lock().unwrap().push(req.clone());
        let start: u32 = req.starting_after.as_deref().unwrap().parse().unwrap();
        let end = (start + req.page_size).min(26);
        Ok(PageResponse::new(200, page_body(start..end)))
    });

    let fetcher = PaginatedFetcher::new(&api, settings(10, 0));
    let window = Cursor {
        starting_after: Some("3".into()),
        ending_before: Some("26".into()),
    };
    let result = fetcher
        .fetch_window("payment", "2024-03-01", window)
        .await
        .unwrap();

    assert_eq!(ids(&result.records), (3..=25).collect::<Vec<_>>());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen
        .iter()
        .all(|r| r.ending_before.as_deref() == Some("26")));
    assert_eq!(
        seen.iter()
            .map(|r| r.starting_after.clone().unwrap())
            .collect::<Vec<_>>(),
        vec!["3", "12", "21"]
    );
}

#[tokio::test]
async fn full_page_without_usable_last_id_is_an_error() {
    let mut records: Vec<serde_json::Value> = (1..=9).map(record).collect();
    records.push(json!({"object": "event"}));
    let body = serde_json::to_string(&records).unwrap();
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .returning(move |_| Ok(PageResponse::new(200, body.clone())));

    let fetcher = PaginatedFetcher::new(&api, settings(10, 0));
    assert!(matches!(
        fetcher.fetch_all_for_day("payment", "2024-03-01").await,
        Err(FetchError::MissingCursor { index: 9 })
    ));
}

#[tokio::test]
async fn transport_failures_and_bad_bodies_are_fatal() {
    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .returning(|_| Err(FetchError::Transport("connection refused".into())));
    let fetcher = PaginatedFetcher::new(&api, settings(10, 3));
    assert!(matches!(
        fetcher.fetch_all_for_day("payment", "2024-03-01").await,
        Err(FetchError::Transport(_))
    ));

    let mut api = MockEventsApi::new();
    api.expect_post_page()
        .times(1)
        .returning(|_| Ok(PageResponse::new(200, "<html>maintenance</html>")));
    let fetcher = PaginatedFetcher::new(&api, settings(10, 3));
    assert!(matches!(
        fetcher.fetch_all_for_day("payment", "2024-03-01").await,
        Err(FetchError::Decode(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn retry_delay_is_applied_before_each_retry() {
    let mut api = MockEventsApi::new();
    let mut seq = Sequence::new();
    api.expect_post_page()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_| Ok(PageResponse::new(502, "Bad Gateway")));
    api.expect_post_page()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(PageResponse::new(200, "[]")));

    let mut s = settings(10, 2);
    s.retry_delay = Duration::from_secs(5);
    let fetcher = PaginatedFetcher::new(&api, s);

    let started = tokio::time::Instant::now();
    let result = fetcher
        .fetch_all_for_day("payment", "2024-03-01")
        .await
        .unwrap();
    assert!(result.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(10));
}
