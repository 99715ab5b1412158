use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from `MAITRED_*` environment variables with
/// sensible defaults for every field.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the booking journal.
    pub data_dir: PathBuf,
    /// How long `create_booking` waits to serialize on a (table, date) key.
    pub lock_timeout: Duration,
    /// TTL on a held lock; bounds the damage of a crashed holder.
    pub lock_ttl: Duration,
    /// Reaper cadence for purging past day sheets and expired locks.
    pub reap_interval: Duration,
    /// Journal appends before the compactor rewrites the file.
    pub compact_threshold: u64,
    /// Prometheus exporter port; None disables the exporter.
    pub metrics_port: Option<u16>,
    /// Slot width used when a weekday has no explicit slot windows.
    pub default_slot_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            lock_timeout: Duration::from_secs(3),
            lock_ttl: Duration::from_secs(30),
            reap_interval: Duration::from_secs(60),
            compact_threshold: 1000,
            metrics_port: None,
            default_slot_minutes: 90,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("MAITRED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            lock_timeout: env_parse("MAITRED_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            lock_ttl: env_parse("MAITRED_LOCK_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_ttl),
            reap_interval: env_parse("MAITRED_REAP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reap_interval),
            compact_threshold: env_parse("MAITRED_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: env_parse("MAITRED_METRICS_PORT"),
            default_slot_minutes: env_parse("MAITRED_SLOT_MINUTES")
                .unwrap_or(defaults.default_slot_minutes),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.journal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.lock_timeout < cfg.lock_ttl);
        assert_eq!(cfg.journal_path(), PathBuf::from("./data/bookings.journal"));
    }

    #[test]
    fn env_overrides_apply() {
        // Set-and-unset within one test to avoid cross-test env races.
        unsafe {
            std::env::set_var("MAITRED_LOCK_TIMEOUT_MS", "250");
            std::env::set_var("MAITRED_METRICS_PORT", "9189");
        }
        let cfg = Config::from_env();
        unsafe {
            std::env::remove_var("MAITRED_LOCK_TIMEOUT_MS");
            std::env::remove_var("MAITRED_METRICS_PORT");
        }
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.metrics_port, Some(9189));
    }
}
