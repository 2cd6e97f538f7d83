use capfeed_core::{FeedConfig, FeedOrder, RefreshPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SERVER: &str = "http://localhost:8001";
pub const SERVER_ENV: &str = "CAPFEED_SERVER";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Option<Server>,
    pub feed: Option<Feed>,
    pub tui: Option<Tui>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Server {
    /// Base URL of the capture backend, e.g. "http://raspberrypi.local:8001"
    pub base_url: Option<String>,
    /// Per-request HTTP timeout in milliseconds (default: 10000)
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Feed {
    /// Images per page (default: 30)
    pub per_page: Option<u32>,
    /// Initial ordering: arrival|capture
    pub order: Option<FeedOrder>,
    /// Delay before reopening a dropped realtime channel (default: 3000)
    pub reconnect_ms: Option<u64>,
    /// Re-fetch interval for views that ignore realtime pushes; 0 or unset disables it
    pub refresh_secs: Option<u64>,
    /// Open the realtime channel at all (default: true)
    pub realtime: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tui {
    /// Rows left below the viewport that trigger the next page (default: 12)
    pub prefetch_rows: Option<usize>,
    pub highlight_fg: Option<String>,
    pub highlight_bg: Option<String>,
    pub border_fg: Option<String>,
    pub help_fg: Option<String>,
}

pub fn config_dir() -> PathBuf {
    if let Some(bd) = directories::BaseDirs::new() {
        bd.config_dir().join("capfeed")
    } else {
        PathBuf::from("./.config/capfeed")
    }
}

pub fn state_dir() -> PathBuf {
    // XDG state dir on Linux; elsewhere fall back to the config dir
    if let Some(bd) = directories::BaseDirs::new() {
        if let Some(sd) = bd.state_dir() {
            return sd.join("capfeed");
        }
    }
    config_dir()
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

pub fn log_path() -> PathBuf {
    state_dir().join("capfeed.log")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Settings::default();
    };
    match toml::from_str(&s) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
            Settings::default()
        }
    }
}

impl Settings {
    /// Flag, then environment, then settings file, then the built-in default.
    pub fn base_url(&self, flag: Option<&str>) -> String {
        let env = std::env::var(SERVER_ENV).ok();
        let file = self.server.as_ref().and_then(|s| s.base_url.clone());
        [flag.map(str::to_string), env, file]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    pub fn timeout(&self) -> Duration {
        let ms = self
            .server
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(10_000);
        Duration::from_millis(ms.max(1))
    }

    pub fn realtime(&self) -> bool {
        self.feed.as_ref().and_then(|f| f.realtime).unwrap_or(true)
    }

    pub fn feed_config(&self) -> FeedConfig {
        let mut cfg = FeedConfig::default();
        if let Some(feed) = &self.feed {
            if let Some(n) = feed.per_page.filter(|n| *n > 0) {
                cfg.per_page = n;
            }
            if let Some(order) = feed.order {
                cfg.order = order;
            }
            if let Some(ms) = feed.reconnect_ms {
                cfg.reconnect_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = feed.refresh_secs.filter(|s| *s > 0) {
                cfg.refresh = RefreshPolicy::Every(Duration::from_secs(secs));
            }
        }
        if let Some(rows) = self.tui.as_ref().and_then(|t| t.prefetch_rows) {
            cfg.prefetch_margin = rows;
        }
        cfg
    }
}
