use capfeed_core::realtime::probe;
use capfeed_core::{timestamp, FeedBackend, FeedOrder, HttpBackend};

/// Print one line per backend capability the feed depends on. Failures are
/// reported, never returned; the command itself always succeeds.
pub fn run_checks(backend: &HttpBackend, realtime: bool) {
    println!("server: {}", backend.base_url());

    match backend.fetch_page(1, 1, FeedOrder::Arrival) {
        Ok(p) => println!(
            "paging: supported (total: {})",
            p.total.map(|t| t.to_string()).unwrap_or_else(|| "unknown".into())
        ),
        Err(e) if e.is_not_found() => match backend.fetch_all() {
            Ok(all) => println!("paging: unsupported, full listing has {} image(s)", all.len()),
            Err(e) => println!("paging: unsupported, full listing failed: {e}"),
        },
        Err(e) => {
            println!("paging: unreachable: {e}");
            println!("hint: check --server, {} or [server] base_url", crate::config::SERVER_ENV);
        }
    }

    match backend.fetch_latest() {
        Ok(Some(image)) => println!("latest: {image} ({})", timestamp::display_stamp(&image)),
        Ok(None) => println!("latest: none yet"),
        Err(e) => println!("latest: failed: {e}"),
    }

    if !realtime {
        println!("realtime: disabled in settings");
        return;
    }
    match backend.updates_url() {
        Ok(url) => match probe(url.as_str()) {
            Ok(()) => println!("realtime: ok ({url})"),
            Err(e) => println!("realtime: unavailable ({url}): {e}"),
        },
        Err(e) => println!("realtime: {e}"),
    }
}
