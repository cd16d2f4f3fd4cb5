//! Live config handle with atomic reload.
//!
//! Uses `arc-swap` for lock-free reads and atomic replacement, so the host
//! loop can pick up `hotdesk.toml` edits without restarting.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;

use crate::config::{ConfigError, HostConfig};
use crate::utils::hash;

pub struct ConfigHandle {
    current: ArcSwap<HostConfig>,
    /// Hash of the config file content last loaded.
    content_hash: AtomicU64,
}

impl ConfigHandle {
    pub fn new(config: HostConfig) -> Self {
        let content_hash = fs::read_to_string(&config.config_path)
            .map(|content| hash::compute(content.as_bytes()))
            .unwrap_or(0);
        Self {
            current: ArcSwap::from_pointee(config),
            content_hash: AtomicU64::new(content_hash),
        }
    }

    #[inline]
    pub fn get(&self) -> Arc<HostConfig> {
        self.current.load_full()
    }

    /// Reload from disk if the file content changed.
    ///
    /// Returns `Ok(true)` if the config was replaced. CLI overrides applied to
    /// the current config carry over to the new one.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let current = self.get();
        if !current.config_path.is_file() {
            return Ok(false);
        }

        let content = fs::read_to_string(&current.config_path)
            .map_err(|e| ConfigError::Io(current.config_path.clone(), e))?;
        let new_hash = hash::compute(content.as_bytes());
        if new_hash == self.content_hash.load(Ordering::Relaxed) {
            return Ok(false);
        }
        // a broken edit is reported once, not on every poll
        self.content_hash.store(new_hash, Ordering::Relaxed);

        let mut fresh = HostConfig::from_path(&current.config_path)?;
        fresh.overrides = current.overrides.clone();
        fresh.apply_overrides();
        fresh.validate()?;

        self.current.store(Arc::new(fresh));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;

    #[test]
    fn test_reload_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotdesk.toml");
        fs::write(&path, "[reload]\ndebounce_ms = 300\n").unwrap();

        let handle = ConfigHandle::new(HostConfig::load(Some(&path), ConfigOverrides::default()).unwrap());
        assert_eq!(handle.get().reload.debounce_ms, 300);
        assert!(!handle.reload().unwrap());

        fs::write(&path, "[reload]\ndebounce_ms = 150\n").unwrap();
        assert!(handle.reload().unwrap());
        assert_eq!(handle.get().reload.debounce_ms, 150);
    }

    #[test]
    fn test_invalid_edit_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotdesk.toml");
        fs::write(&path, "[scheduler]\ntick_ms = 16\n").unwrap();
        let handle = ConfigHandle::new(HostConfig::load(Some(&path), ConfigOverrides::default()).unwrap());

        fs::write(&path, "[scheduler]\ntick_ms = 0\n").unwrap();
        assert!(handle.reload().is_err());
        assert!(!handle.reload().unwrap());
        assert_eq!(handle.get().scheduler.tick_ms, 16);
    }
}
