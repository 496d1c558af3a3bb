// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Layered YAML configuration, following the same search-path-and-merge
//! shape as a typical local-agent config loader: later layers override
//! earlier ones, and an explicit `--config` path wins over everything.
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default per-tool deadline.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
/// Network log TTL.
const DEFAULT_TTL_HOURS: u64 = 24;
/// Network log size cap.
const DEFAULT_SIZE_CAP_BYTES: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket_path: String,
    pub capture_base: String,
    pub tool_timeout_secs: u64,
    pub capture_ttl_hours: u64,
    pub capture_size_cap_bytes: u64,
    /// Tools that automatically produce a post-action screenshot unless
    /// the request suppresses it.
    pub auto_screenshot_tools: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            capture_base: default_capture_base(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            capture_ttl_hours: DEFAULT_TTL_HOURS,
            capture_size_cap_bytes: DEFAULT_SIZE_CAP_BYTES,
            auto_screenshot_tools: vec![
                "nav.go".into(),
                "nav.back".into(),
                "nav.forward".into(),
                "nav.reload".into(),
                "input.click".into(),
                "input.type".into(),
                "input.scroll".into(),
                "input.key".into(),
            ],
        }
    }
}

#[cfg(unix)]
fn default_socket_path() -> String {
    "/tmp/surf.sock".to_string()
}

#[cfg(not(unix))]
fn default_socket_path() -> String {
    r"\\.\pipe\surf".to_string()
}

#[cfg(unix)]
fn default_capture_base() -> String {
    "/tmp/surf".to_string()
}

#[cfg(not(unix))]
fn default_capture_base() -> String {
    std::env::temp_dir().join("surf").display().to_string()
}

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/surf/config.yaml"));
    paths.push(PathBuf::from("/etc/surf/config.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("surf/config.yaml"));
        paths.push(cfg.join("surf/config.yml"));
    }

    paths.push(PathBuf::from(".surf/config.yaml"));
    paths.push(PathBuf::from(".surf.yaml"));
    paths.push(PathBuf::from("surf.yaml"));

    paths
}

/// Load configuration by merging all discovered YAML files, an optional
/// explicit path, and environment overrides, in that precedence order
/// (env and CLI flags win last).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    if let Ok(path) = std::env::var("SURF_SOCKET_PATH") {
        config.socket_path = path;
    }
    if let Ok(path) = std::env::var("SURF_NETWORK_PATH") {
        config.capture_base = path;
    }

    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}
