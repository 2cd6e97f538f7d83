use anyhow::{bail, Context, Result};
use capfeed_core::{
    timestamp, FeedOrder, FeedSession, FetchMode, HttpBackend, LatestUpdate, LatestWatch,
    PaginationClient,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod doctor;
mod gallery;
mod theme;

use config::Settings;

#[derive(Parser)]
#[command(name = "capfeed", version, about = "Live photo feed for a remote capture device")]
struct Cli {
    /// Backend base URL (overrides CAPFEED_SERVER and settings.toml)
    #[arg(long, global = true)]
    server: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive date-grouped gallery (default)
    Gallery {
        /// Initial ordering: arrival|capture
        #[arg(long)]
        order: Option<FeedOrder>,
        /// Do not open the realtime channel
        #[arg(long)]
        no_realtime: bool,
    },
    /// Load pages headlessly and print them grouped by capture date
    List {
        #[arg(long)]
        order: Option<FeedOrder>,
        /// Pages to load (default: 1)
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent capture
    Latest {
        /// Keep polling and print every change
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
        /// Report the device offline after this long without a successful poll
        #[arg(long, default_value_t = 10)]
        stale_secs: u64,
        #[arg(long)]
        json: bool,
    },
    /// Print resolved settings and paths
    Config {
        #[arg(long)]
        json: bool,
    },
    /// Probe the backend endpoints the feed depends on
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Gallery {
        order: None,
        no_realtime: false,
    });

    // The gallery owns the terminal, so its logs go to a file.
    let log_file = matches!(command, Commands::Gallery { .. }).then(config::log_path);
    init_logging(log_file.as_deref());

    let settings = config::load_settings();
    let base = settings.base_url(cli.server.as_deref());

    match command {
        Commands::Gallery { order, no_realtime } => {
            let http = connect(&base, &settings)?;
            let mut cfg = settings.feed_config();
            if let Some(o) = order {
                cfg.order = o;
            }
            let mut session = FeedSession::new(PaginationClient::new(http.clone(), cfg.per_page), &cfg);
            session.start();
            if settings.realtime() && !no_realtime {
                session.connect_realtime(http.updates_url()?.to_string());
            }
            let opts = gallery::GalleryOptions {
                base: Some(http.base_url().clone()),
                theme: theme::from_settings(&settings),
            };
            let shown = gallery::run_gallery_default(&mut session, &opts);
            session.disconnect_realtime();
            if let Some(image) = shown? {
                println!("{image}");
            }
        }
        Commands::List { order, pages, json } => {
            let http = connect(&base, &settings)?;
            let mut cfg = settings.feed_config();
            if let Some(o) = order {
                cfg.order = o;
            }
            let wait = settings.timeout() + Duration::from_secs(5);
            let mut session = FeedSession::new(PaginationClient::new(http, cfg.per_page), &cfg);
            session.start();
            loop {
                if !session.settle(wait) {
                    bail!("timed out waiting for {base}");
                }
                if let Some(e) = session.last_error() {
                    bail!("fetching the feed from {base} failed: {e}");
                }
                if session.store().cursor() >= pages || !session.load_next() {
                    break;
                }
            }
            print_list(&mut session, json)?;
        }
        Commands::Latest {
            watch,
            interval_secs,
            stale_secs,
            json,
        } => {
            let http = connect(&base, &settings)?;
            let mut w = LatestWatch::new(http, Duration::from_secs(stale_secs));
            if !watch {
                let update = w.poll(Instant::now())?;
                print_latest(&update, true, json)?;
                return Ok(());
            }
            let mut online: Option<bool> = None;
            loop {
                let now = Instant::now();
                match w.poll(now) {
                    Ok(LatestUpdate::Unchanged) => {}
                    Ok(update) => print_latest(&update, w.is_online(now), json)?,
                    Err(e) => tracing::warn!(error = %e, "latest poll failed"),
                }
                let is_online = w.is_online(now);
                if online != Some(is_online) {
                    if online.is_some() {
                        eprintln!("device {}", if is_online { "online" } else { "offline" });
                    }
                    online = Some(is_online);
                }
                std::thread::sleep(Duration::from_secs(interval_secs.max(1)));
            }
        }
        Commands::Config { json } => {
            let cfg = settings.feed_config();
            let info = ConfigInfo {
                config_dir: config::config_dir().display().to_string(),
                state_dir: config::state_dir().display().to_string(),
                settings_path: config::settings_path().display().to_string(),
                log_path: config::log_path().display().to_string(),
                base_url: base,
                timeout_ms: settings.timeout().as_millis() as u64,
                per_page: cfg.per_page,
                order: cfg.order,
                reconnect_ms: cfg.reconnect_delay.as_millis() as u64,
                refresh_secs: match cfg.refresh {
                    capfeed_core::RefreshPolicy::Off => None,
                    capfeed_core::RefreshPolicy::Every(d) => Some(d.as_secs()),
                },
                realtime: settings.realtime(),
                prefetch_rows: cfg.prefetch_margin,
                settings: &settings,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("config_dir: {}", info.config_dir);
                println!("settings: {}", info.settings_path);
                println!("log: {}", info.log_path);
                println!("server: {} (timeout {} ms)", info.base_url, info.timeout_ms);
                println!(
                    "feed: {} per page, order {}, reconnect {} ms, realtime {}",
                    info.per_page,
                    info.order,
                    info.reconnect_ms,
                    if info.realtime { "on" } else { "off" }
                );
                match info.refresh_secs {
                    Some(s) => println!("refresh: every {s}s"),
                    None => println!("refresh: off"),
                }
            }
        }
        Commands::Doctor => {
            let http = connect(&base, &settings)?;
            doctor::run_checks(&http, settings.realtime());
        }
    }

    Ok(())
}

fn init_logging(file: Option<&Path>) {
    let filter = EnvFilter::try_from_env("CAPFEED_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if let Some(path) = file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(f) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = builder.with_ansi(false).with_writer(Mutex::new(f)).try_init();
            return;
        }
    }
    let _ = builder.with_writer(std::io::stderr).try_init();
}

fn connect(base: &str, settings: &Settings) -> Result<Arc<HttpBackend>> {
    let http = HttpBackend::new(base, settings.timeout())
        .with_context(|| format!("invalid server url: {base}"))?;
    Ok(Arc::new(http))
}

#[derive(Serialize)]
struct ConfigInfo<'a> {
    config_dir: String,
    state_dir: String,
    settings_path: String,
    log_path: String,
    base_url: String,
    timeout_ms: u64,
    per_page: u32,
    order: FeedOrder,
    reconnect_ms: u64,
    refresh_secs: Option<u64>,
    realtime: bool,
    prefetch_rows: usize,
    settings: &'a Settings,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    order: FeedOrder,
    mode: FetchMode,
    pages: u32,
    has_more: bool,
    total: usize,
    groups: &'a [capfeed_core::DateGroup],
}

fn print_list(session: &mut FeedSession, json: bool) -> Result<()> {
    let status = session.status();
    let groups = session.groups();
    if json {
        let out = ListOutput {
            order: status.order,
            mode: status.mode,
            pages: status.pages,
            has_more: status.has_more,
            total: status.len,
            groups,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    for g in groups {
        println!("{} ({})", g.key, g.len());
        for m in &g.members {
            let time = capfeed_core::CaptureStamp::parse(&m.image)
                .map(|s| s.time_label())
                .unwrap_or_else(|| "--:--:--".into());
            println!("  {time}  {}", m.image);
        }
    }
    if status.mode == FetchMode::FallbackFull {
        println!("(full listing; the server does not page)");
    } else if status.has_more {
        println!("(more available; use --pages)");
    }
    Ok(())
}

fn print_latest(update: &LatestUpdate, online: bool, json: bool) -> Result<()> {
    if json {
        let v = match update {
            LatestUpdate::Changed { image, captured } => serde_json::json!({
                "image": image,
                "captured": captured,
                "date": timestamp::group_key(image).to_string(),
                "online": online,
            }),
            _ => serde_json::json!({ "image": null, "online": online }),
        };
        println!("{}", serde_json::to_string(&v)?);
        return Ok(());
    }
    match update {
        LatestUpdate::Changed { image, captured } => println!("{captured}\t{image}"),
        LatestUpdate::Empty => println!("no captures yet"),
        LatestUpdate::Unchanged => {}
    }
    Ok(())
}
