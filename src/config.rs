use std::path::PathBuf;

use crate::backend::BackendOptions;
use crate::model::OperatingHours;
use crate::notify::DEFAULT_CHANNEL_CAPACITY;

pub const WAL_FILE_NAME: &str = "studiodesk.wal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub enforce_no_overlap: bool,
    pub hours: OperatingHours,
    pub notice_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            enforce_no_overlap: true,
            hours: OperatingHours::default(),
            notice_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing or unparsable values fall back to
    /// the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("STUDIODESK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let compact_threshold: u64 = lookup("STUDIODESK_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let enforce_no_overlap = lookup("STUDIODESK_ENFORCE_NO_OVERLAP")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.enforce_no_overlap);
        let open_hour: u8 = lookup("STUDIODESK_OPEN_HOUR")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.hours.open_hour);
        let close_hour: u8 = lookup("STUDIODESK_CLOSE_HOUR")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.hours.close_hour);
        let notice_capacity: usize = lookup("STUDIODESK_NOTICE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.notice_capacity);

        // An inverted or out-of-range window would never be open.
        let hours = if open_hour < close_hour && close_hour <= 24 {
            OperatingHours { open_hour, close_hour }
        } else {
            tracing::warn!("ignoring opening hours {open_hour}..{close_hour}");
            defaults.hours
        };

        Self {
            data_dir,
            compact_threshold,
            enforce_no_overlap,
            hours,
            notice_capacity,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            enforce_no_overlap: self.enforce_no_overlap,
            compact_threshold: self.compact_threshold,
        }
    }
}
