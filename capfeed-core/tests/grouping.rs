mod common;
use capfeed_core::timestamp::UNKNOWN;
use capfeed_core::{group_by_date, FeedOrder, FeedStore, GroupingView};
use common::refs;

#[test]
fn groups_by_date_newest_first() {
    let seq = refs(&[
        "/static/12-08-2025_09-00-00.jpg",
        "/static/13-08-2025_10-00-00.jpg",
        "/static/12-08-2025_08-00-00.jpg",
    ]);
    let groups = group_by_date(&seq);
    let keys: Vec<String> = groups.iter().map(|g| g.key.to_string()).collect();
    assert_eq!(keys, vec!["2025-08-13", "2025-08-12"]);

    let older: Vec<(usize, &str)> = groups[1]
        .members
        .iter()
        .map(|m| (m.index, m.image.as_str()))
        .collect();
    assert_eq!(
        older,
        vec![
            (0, "/static/12-08-2025_09-00-00.jpg"),
            (2, "/static/12-08-2025_08-00-00.jpg"),
        ]
    );
    assert_eq!(groups[0].members[0].index, 1);
}

#[test]
fn unstamped_entries_render_in_unknown_group() {
    let seq = refs(&["/static/cat.jpg", "01-01-2024_00-00-00.jpg"]);
    let groups = group_by_date(&seq);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[1].key.to_string(), UNKNOWN);
    assert_eq!(groups[1].members[0].index, 0);
}

#[test]
fn view_recomputes_only_on_change() {
    let mut store = FeedStore::new(FeedOrder::Arrival);
    store.ingest_page(refs(&["12-08-2025_09-00-00.jpg"]), 1, true);
    let mut view = GroupingView::new();
    assert_eq!(view.groups(&store).len(), 1);
    assert!(view.is_current(&store));

    store.ingest_realtime("13-08-2025_09-00-00.jpg".into());
    assert!(!view.is_current(&store));
    let groups = view.groups(&store);
    assert_eq!(groups[0].key.to_string(), "2025-08-13");
    assert_eq!(groups[1].members[0].index, 1);

    // rejected push leaves the memo valid
    store.ingest_realtime("13-08-2025_09-00-00.jpg".into());
    assert!(view.is_current(&store));
}

#[test]
fn groups_serialize_with_string_keys() {
    let groups = group_by_date(&refs(&["12-08-2025_09-00-00.jpg"]));
    let v = serde_json::to_value(&groups).unwrap();
    assert_eq!(v[0]["key"], "2025-08-12");
    assert_eq!(v[0]["members"][0]["index"], 0);
}
