mod common;
use capfeed_core::{
    FeedConfig, FeedEvent, FeedOrder, FeedSession, FetchMode, PageOutcome, PaginationClient,
    RealtimeEvent, RefreshPolicy,
};
use common::{refs, MockBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SETTLE: Duration = Duration::from_secs(5);

const ARRIVAL: [&str; 5] = [
    "14-08-2025_10-00-05.jpg",
    "14-08-2025_10-00-04.jpg",
    "13-08-2025_10-00-03.jpg",
    "13-08-2025_10-00-02.jpg",
    "12-08-2025_10-00-01.jpg",
];
const CAPTURE: [&str; 5] = [
    "14-08-2025_10-00-05.jpg",
    "14-08-2025_10-00-04.jpg",
    "13-08-2025_10-00-03.jpg",
    "13-08-2025_10-00-02.jpg",
    "/static/cat.jpg",
];

fn session_with(backend: Arc<MockBackend>, order: FeedOrder) -> FeedSession {
    let config = FeedConfig {
        per_page: 2,
        order,
        ..FeedConfig::default()
    };
    let client = PaginationClient::new(backend, config.per_page);
    FeedSession::new(client, &config)
}

#[test]
fn first_page_loads_on_start() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    let st = s.status();
    assert_eq!(st.len, 2);
    assert_eq!(st.pages, 1);
    assert!(st.has_more);
    assert!(!st.fetching);
    assert_eq!(st.mode, FetchMode::Paged);
    assert_eq!(backend.calls(), vec!["page:1:arrival"]);
}

#[test]
fn scrolling_to_the_end_pulls_every_page() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    // viewport far from the end: nothing happens
    assert!(!s.observe_scroll(100));
    assert!(s.observe_scroll(0));
    assert!(s.settle(SETTLE));

    assert_eq!(s.store().sequence(), &refs(&ARRIVAL)[..]);
    assert!(!s.status().has_more);
    assert_eq!(
        backend.calls(),
        vec!["page:1:arrival", "page:2:arrival", "page:3:arrival"]
    );
    assert!(!s.observe_scroll(0));
}

#[test]
fn unsupported_paging_falls_back_once_and_for_good() {
    let backend = Arc::new(MockBackend::unpaged(&[
        "/static/cat.jpg",
        "13-08-2025_10-00-00.jpg",
        "14-08-2025_10-00-00.jpg",
    ]));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    assert_eq!(s.status().mode, FetchMode::FallbackFull);
    assert!(!s.status().has_more);
    assert!(s.client().is_fallback());
    assert_eq!(
        s.store().sequence(),
        &refs(&[
            "14-08-2025_10-00-00.jpg",
            "13-08-2025_10-00-00.jpg",
            "/static/cat.jpg",
        ])[..]
    );
    assert!(!s.observe_scroll(0));

    s.set_order(FeedOrder::Capture);
    assert!(s.settle(SETTLE));
    assert_eq!(s.status().mode, FetchMode::FallbackFull);
    assert_eq!(s.store().len(), 3);
    // paging is never attempted again
    assert_eq!(backend.calls(), vec!["page:1:arrival", "all", "all"]);
}

#[test]
fn failed_page_keeps_sequence_and_can_be_retried() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE).fail_page_once(2));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    assert!(s.observe_scroll(0));
    assert!(s.settle(SETTLE));
    assert_eq!(s.store().len(), 2);
    assert_eq!(s.store().cursor(), 1);
    assert!(s.last_error().is_some());
    assert!(s.status().has_more);

    assert!(s.retry());
    assert!(s.settle(SETTLE));
    assert!(s.last_error().is_none());
    assert_eq!(s.store().sequence(), &refs(&ARRIVAL)[..]);
    assert_eq!(
        backend.calls(),
        vec![
            "page:1:arrival",
            "page:2:arrival",
            "page:2:arrival",
            "page:3:arrival"
        ]
    );
}

#[test]
fn order_switch_forgets_scroll_position() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));
    assert!(s.observe_scroll(0));
    assert!(s.settle(SETTLE));
    assert_eq!(s.store().cursor(), 3);

    // the new sequence starts at the top; only page 1 is requested
    s.set_order(FeedOrder::Capture);
    assert!(s.settle(SETTLE));
    assert_eq!(s.store().cursor(), 1);
    assert_eq!(s.store().len(), 2);
    assert_eq!(
        backend.calls(),
        vec![
            "page:1:arrival",
            "page:2:arrival",
            "page:3:arrival",
            "page:1:capture"
        ]
    );

    // a fresh observation near the end resumes paging
    assert!(s.observe_scroll(0));
    assert!(s.settle(SETTLE));
    assert_eq!(s.store().sequence(), &refs(&CAPTURE)[..]);
}

#[test]
fn order_switch_discards_in_flight_results() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend.clone(), FeedOrder::Arrival);
    s.start();
    s.set_order(FeedOrder::Capture);
    assert!(s.settle(SETTLE));
    // give the arrival fetch time to land, then drain it
    std::thread::sleep(Duration::from_millis(50));
    s.pump();

    assert_eq!(s.order(), FeedOrder::Capture);
    assert_eq!(s.store().sequence(), &refs(&CAPTURE[..2])[..]);
    assert_eq!(s.store().cursor(), 1);
}

#[test]
fn events_from_an_older_generation_are_dropped() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend, FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));
    let before = s.store().sequence().to_vec();

    s.sender()
        .send(FeedEvent::Page {
            generation: s.store().generation() - 1,
            page: 2,
            result: Ok(PageOutcome::Page {
                images: refs(&["ghost.jpg"]),
                page: 2,
                has_more: false,
            }),
        })
        .unwrap();
    assert_eq!(s.pump(), 1);
    assert_eq!(s.store().sequence(), &before[..]);
    assert!(s.status().has_more);
}

#[test]
fn realtime_push_prepends_only_in_arrival_order() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend, FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    let tx = s.sender();
    tx.send(RealtimeEvent::NewImage("15-08-2025_08-00-00.jpg".into()).into())
        .unwrap();
    tx.send(RealtimeEvent::NewImage(ARRIVAL[0].into()).into())
        .unwrap();
    s.pump();
    assert_eq!(s.store().len(), 3);
    assert_eq!(s.store().sequence()[0], "15-08-2025_08-00-00.jpg");
    assert_eq!(s.groups()[0].key.to_string(), "2025-08-15");

    s.set_order(FeedOrder::Capture);
    assert!(s.settle(SETTLE));
    tx.send(RealtimeEvent::NewImage("16-08-2025_08-00-00.jpg".into()).into())
        .unwrap();
    s.pump();
    assert!(!s.store().contains("16-08-2025_08-00-00.jpg"));
}

#[test]
fn lightbox_stays_within_bounds() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let mut s = session_with(backend, FeedOrder::Arrival);
    s.start();
    assert!(s.settle(SETTLE));

    assert!(s.focused().is_none());
    s.open_lightbox(1);
    s.lightbox_next();
    s.lightbox_next();
    assert_eq!(s.focused().map(|(i, _)| i), Some(1));
    s.lightbox_prev();
    s.lightbox_prev();
    let (i, image) = s.focused().unwrap();
    assert_eq!(i, 0);
    assert_eq!(image, ARRIVAL[0]);

    s.set_order(FeedOrder::Capture);
    assert!(!s.lightbox().is_open());
}

#[test]
fn refresh_polls_head_only_for_views_without_pushes() {
    let backend = Arc::new(MockBackend::paged(&ARRIVAL, &CAPTURE));
    let config = FeedConfig {
        per_page: 2,
        order: FeedOrder::Arrival,
        refresh: RefreshPolicy::Every(Duration::ZERO),
        ..FeedConfig::default()
    };
    let mut s = FeedSession::new(PaginationClient::new(backend.clone(), 2), &config);
    s.start();
    assert!(s.settle(SETTLE));
    s.tick(Instant::now());
    assert!(s.settle(SETTLE));
    assert_eq!(backend.calls(), vec!["page:1:arrival"]);

    s.set_order(FeedOrder::Capture);
    assert!(s.settle(SETTLE));
    s.tick(Instant::now());
    assert!(s.settle(SETTLE));
    assert_eq!(
        backend.calls(),
        vec!["page:1:arrival", "page:1:capture", "page:1:capture"]
    );
    assert_eq!(s.store().len(), 2);
}
