//! Pipeline and sink settings shared by the engine and its graph backend.

use serde::{Deserialize, Serialize};

use crate::sink::SinkConfig;

/// Source description overrides, first found wins.
pub const SOURCE_ENV_VARS: &[&str] = &["FS_VIDEO_SRC", "FS_VIDEOSRC"];
/// Capture caps overrides, first found wins.
pub const CAPS_ENV_VARS: &[&str] = &["FS_VIDEO_SRC_CAPS", "FS_VIDEOSRC_CAPS"];
/// Sink description overrides, first found wins.
pub const SINK_ENV_VARS: &[&str] = &["PREVIEW_VIDEO_SINK", "FS_VIDEO_SINK", "FS_VIDEOSINK"];

/// Settings for the engine as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
}

/// Capture branch and teardown settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source bin description; unset means try the built-in candidates
    #[serde(default)]
    pub source: Option<String>,
    /// Sources tried in order when no description is set
    #[serde(default = "default_source_candidates")]
    pub source_candidates: Vec<String>,
    /// Caps forced between the capture branch and the junction
    #[serde(default = "default_caps")]
    pub caps: String,
    /// Upper bound on what the keep-alive queue holds
    #[serde(default = "default_keepalive_max_time_ms")]
    pub keepalive_max_time_ms: u64,
    /// Bounded wait for a detached branch to reach idle
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: None,
            source_candidates: default_source_candidates(),
            caps: default_caps(),
            keepalive_max_time_ms: default_keepalive_max_time_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

fn default_source_candidates() -> Vec<String> {
    vec!["v4l2src".to_string(), "videotestsrc".to_string()]
}

fn default_caps() -> String {
    "video/x-raw,format=I420,width=352,height=288,framerate=15/1".to_string()
}

fn default_keepalive_max_time_ms() -> u64 {
    50
}

fn default_stop_timeout_secs() -> u64 {
    5
}

impl EngineConfig {
    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| names.iter().find_map(|name| lookup(name).filter(|v| !v.is_empty()));

        if let Some(source) = first(SOURCE_ENV_VARS) {
            self.pipeline.source = Some(source);
        }
        if let Some(caps) = first(CAPS_ENV_VARS) {
            self.pipeline.caps = caps;
        }
        if let Some(sink) = first(SINK_ENV_VARS) {
            self.sinks.override_description = Some(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pipeline.keepalive_max_time_ms, 50);
        assert_eq!(config.pipeline.stop_timeout_secs, 5);
        assert!(config.pipeline.caps.contains("width=352"));
        assert!(config.sinks.override_description.is_none());
    }

    #[test]
    fn test_env_overrides_first_found_wins() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FS_VIDEOSRC", "videotestsrc is-live=true"),
            ("FS_VIDEO_SINK", "fakesink"),
            ("FS_VIDEOSINK", "ximagesink"),
            ("FS_VIDEO_SRC_CAPS", ""),
        ]);
        let mut config = EngineConfig::default();
        config.apply_env(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.pipeline.source.as_deref(), Some("videotestsrc is-live=true"));
        assert_eq!(config.sinks.override_description.as_deref(), Some("fakesink"));
        assert_eq!(config.pipeline.caps, EngineConfig::default().pipeline.caps);
    }

    #[test]
    fn test_partial_toml_section() {
        let config: EngineConfig = toml::from_str("[pipeline]\nstop_timeout_secs = 2\n").unwrap();
        assert_eq!(config.pipeline.stop_timeout_secs, 2);
        assert_eq!(config.pipeline.source_candidates.len(), 2);
        assert_eq!(config.sinks, SinkConfig::default());
    }
}
