use std::path::Path;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::error::SyncError;

pub(crate) const CONFIG_FILE_NAME: &str = "threadline_config.json";

const DEFAULT_PAGE_SIZE: u32 = 25;
const DEFAULT_SEEN_DEBOUNCE_MS: u64 = 500;
const DEFAULT_HIGHLIGHT_MS: u64 = 2_000;
const DEFAULT_SCROLL_GUARD_MS: u64 = 700;

/// Tunables for the sync engine. Every key is optional in the JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) page_size: Option<u32>,
    pub(crate) seen_debounce_ms: Option<u64>,
    pub(crate) highlight_ms: Option<u64>,
    pub(crate) programmatic_scroll_guard_ms: Option<u64>,
    // How many entries from either edge count as "the edge" for
    // visibility-driven pagination (0 = only the boundary entry).
    pub(crate) pagination_threshold: Option<usize>,
    pub(crate) utc_offset_minutes: Option<i32>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes).map_err(SyncError::from) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "using default config");
            AppConfig::default()
        }
    }
}

impl AppConfig {
    pub(crate) fn page_size(&self) -> u32 {
        // Diagnostics override, mostly for poking at pagination by hand.
        if let Some(n) = std::env::var("THREADLINE_PAGE_SIZE")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
        {
            return n;
        }
        self.page_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn seen_debounce(&self) -> Duration {
        Duration::from_millis(self.seen_debounce_ms.unwrap_or(DEFAULT_SEEN_DEBOUNCE_MS))
    }

    pub(crate) fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_ms.unwrap_or(DEFAULT_HIGHLIGHT_MS))
    }

    pub(crate) fn scroll_guard(&self) -> Duration {
        Duration::from_millis(
            self.programmatic_scroll_guard_ms
                .unwrap_or(DEFAULT_SCROLL_GUARD_MS),
        )
    }

    pub(crate) fn pagination_threshold(&self) -> usize {
        self.pagination_threshold.unwrap_or(0)
    }

    pub(crate) fn utc_offset(&self) -> FixedOffset {
        let minutes = self.utc_offset_minutes.unwrap_or(0);
        FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or(Utc.fix())
    }
}
