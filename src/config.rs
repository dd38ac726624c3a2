//! Centralized configuration and builder for the page cache.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - CacheConfig::from_env() reads the INK_* variables the host firmware
//!   exports; everything has a default that matches a reader which mostly
//!   turns pages forward.
//! - Provide a simple CacheBuilder that returns a CacheConfig, which
//!   PageCache will consume.
//!
//! Tunables:
//! - window_behind / window_ahead: how many pages around the current one
//!   the prefetcher tries to keep resident.
//! - keep_behind / keep_ahead: retention range; pages outside it are
//!   evicted. Must dominate the window range on each side.
//! - request_batch: pages per prefetch request (wire caps this at 5).
//! - trigger_gap: remaining ahead-pages that arms a prefetch.
//! - prefetch_stale_secs: wall-clock bound after which an unanswered
//!   prefetch stops counting as in flight.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::consts::{CACHE_DIR_DEFAULT, REQ_PAGES_MAX};

/// Top-level configuration for the page cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Cache root directory.
    /// Env: INK_CACHE_DIR (default "ble_pages")
    pub root: PathBuf,

    /// Prefetch headroom behind the current page.
    /// Env: INK_WINDOW_BEHIND (default 2)
    pub window_behind: u16,

    /// Prefetch headroom ahead of the current page.
    /// Env: INK_WINDOW_AHEAD (default 5)
    pub window_ahead: u16,

    /// Retention behind the current page.
    /// Env: INK_KEEP_BEHIND (default 5)
    pub keep_behind: u16,

    /// Retention ahead of the current page.
    /// Env: INK_KEEP_AHEAD (default 5)
    pub keep_ahead: u16,

    /// Pages per prefetch request; the wire format caps this at 5.
    /// Env: INK_REQUEST_BATCH (default 5)
    pub request_batch: u8,

    /// Remaining ahead-pages that arms a prefetch.
    /// Env: INK_TRIGGER_GAP (default 2)
    pub trigger_gap: u16,

    /// Staleness bound for an in-flight prefetch, in seconds.
    /// Env: INK_PREFETCH_STALE_SECS (default 30)
    pub prefetch_stale_secs: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(CACHE_DIR_DEFAULT),
            window_behind: 2,
            window_ahead: 5,
            keep_behind: 5,
            keep_ahead: 5,
            request_batch: REQ_PAGES_MAX,
            trigger_gap: 2,
            prefetch_stale_secs: 30,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("INK_CACHE_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.root = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("INK_WINDOW_BEHIND") {
            if let Ok(n) = v.trim().parse::<u16>() {
                cfg.window_behind = n;
            }
        }
        if let Ok(v) = std::env::var("INK_WINDOW_AHEAD") {
            if let Ok(n) = v.trim().parse::<u16>() {
                cfg.window_ahead = n;
            }
        }
        if let Ok(v) = std::env::var("INK_KEEP_BEHIND") {
            if let Ok(n) = v.trim().parse::<u16>() {
                cfg.keep_behind = n;
            }
        }
        if let Ok(v) = std::env::var("INK_KEEP_AHEAD") {
            if let Ok(n) = v.trim().parse::<u16>() {
                cfg.keep_ahead = n;
            }
        }
        if let Ok(v) = std::env::var("INK_REQUEST_BATCH") {
            if let Ok(n) = v.trim().parse::<u8>() {
                cfg.request_batch = n;
            }
        }
        if let Ok(v) = std::env::var("INK_TRIGGER_GAP") {
            if let Ok(n) = v.trim().parse::<u16>() {
                cfg.trigger_gap = n;
            }
        }
        if let Ok(v) = std::env::var("INK_PREFETCH_STALE_SECS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.prefetch_stale_secs = n;
            }
        }

        cfg
    }

    /// Check the invariants the window logic relies on:
    /// retention dominates the window on each side, batch is non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.keep_behind < self.window_behind {
            return Err(anyhow!(
                "keep_behind {} < window_behind {}",
                self.keep_behind,
                self.window_behind
            ));
        }
        if self.keep_ahead < self.window_ahead {
            return Err(anyhow!(
                "keep_ahead {} < window_ahead {}",
                self.keep_ahead,
                self.window_ahead
            ));
        }
        if self.request_batch == 0 {
            return Err(anyhow!("request_batch must be > 0"));
        }
        Ok(())
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_window(mut self, behind: u16, ahead: u16) -> Self {
        self.window_behind = behind;
        self.window_ahead = ahead;
        self
    }

    pub fn with_retention(mut self, behind: u16, ahead: u16) -> Self {
        self.keep_behind = behind;
        self.keep_ahead = ahead;
        self
    }

    pub fn with_request_batch(mut self, batch: u8) -> Self {
        self.request_batch = batch;
        self
    }

    pub fn with_trigger_gap(mut self, gap: u16) -> Self {
        self.trigger_gap = gap;
        self
    }

    pub fn with_prefetch_stale_secs(mut self, secs: u32) -> Self {
        self.prefetch_stale_secs = secs;
        self
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheConfig {{ \
             root: {}, \
             window: -{}/+{}, \
             retention: -{}/+{}, \
             request_batch: {}, \
             trigger_gap: {}, \
             prefetch_stale_secs: {} \
             }}",
            self.root.display(),
            self.window_behind,
            self.window_ahead,
            self.keep_behind,
            self.keep_ahead,
            self.request_batch,
            self.trigger_gap,
            self.prefetch_stale_secs,
        )
    }
}

/// Lightweight builder that produces a CacheConfig.
#[derive(Clone, Debug)]
pub struct CacheBuilder {
    cfg: CacheConfig,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        // Start from env to match host behavior, then allow overrides.
        Self {
            cfg: CacheConfig::from_env(),
        }
    }
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: CacheConfig::default(),
        }
    }

    pub fn root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.cfg.root = root.into();
        self
    }

    pub fn window(mut self, behind: u16, ahead: u16) -> Self {
        self.cfg.window_behind = behind;
        self.cfg.window_ahead = ahead;
        self
    }

    pub fn retention(mut self, behind: u16, ahead: u16) -> Self {
        self.cfg.keep_behind = behind;
        self.cfg.keep_ahead = ahead;
        self
    }

    pub fn request_batch(mut self, batch: u8) -> Self {
        self.cfg.request_batch = batch;
        self
    }

    pub fn trigger_gap(mut self, gap: u16) -> Self {
        self.cfg.trigger_gap = gap;
        self
    }

    pub fn prefetch_stale_secs(mut self, secs: u32) -> Self {
        self.cfg.prefetch_stale_secs = secs;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> CacheConfig {
        self.cfg
    }
}
