// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Runtime configuration for the multiplexer.
//!
//! Defaults are read from the environment:
//! `FBNS_BACKBUFFER` (`full` or `unipage`), `FBNS_MAX_BACKING_BYTES`,
//! `FBNS_FORCE_PAN` and `FBNS_DEBUG_DIFF`.

use std::str::FromStr;

use log::warn;

/// How backing buffers are provisioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackingStrategy {
    /// One private byte per byte of hardware buffer.
    Full,
    /// A single zeroed page aliased across the whole buffer. Background
    /// drawing is discarded.
    SinglePage,
}

impl FromStr for BackingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackingStrategy::Full),
            "unipage" | "single-page" => Ok(BackingStrategy::SinglePage),
            other => Err(format!("unknown backing strategy {other:?}")),
        }
    }
}

/// Multiplexer settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FbNsConfig {
    pub backing: BackingStrategy,
    /// Ceiling on the bytes held by all backing buffers together.
    pub max_backing_bytes: Option<usize>,
    /// Call the device's pan hook after every activation.
    pub force_pan: bool,
    /// Diff shadow and hardware state on every intercepted call.
    pub debug_diff: bool,
}

impl Default for FbNsConfig {
    fn default() -> Self {
        let base = Self::builtin();
        Self {
            backing: env_parse("FBNS_BACKBUFFER").unwrap_or(base.backing),
            max_backing_bytes: env_parse("FBNS_MAX_BACKING_BYTES").or(base.max_backing_bytes),
            force_pan: env_flag("FBNS_FORCE_PAN").unwrap_or(base.force_pan),
            debug_diff: env_flag("FBNS_DEBUG_DIFF").unwrap_or(base.debug_diff),
        }
    }
}

impl FbNsConfig {
    /// Environment-derived configuration.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Compiled-in defaults, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            backing: BackingStrategy::Full,
            max_backing_bytes: None,
            force_pan: false,
            debug_diff: false,
        }
    }
}

fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("ignoring {key}={other:?}: expected a boolean");
            None
        }
    }
}
