//! Engine configuration
//!
//! Model-independent knobs: where keys live in the property store, how many
//! hardware revisions to load, packet capacity, and the brightness policy
//! constants. Every field has a default so a JSON file only needs the
//! values it overrides.

use std::string::String;
use std::time::Duration;

use panel_platform::Revision;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Fallback `(cmd_index, candela)` used when a level cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeDefault {
    /// Register command index.
    pub cmd_index: u32,
    /// Luminance in candela.
    pub candela: u32,
}

impl Default for SafeDefault {
    fn default() -> Self {
        Self {
            cmd_index: 28,
            candela: 150,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix prepended to every property key, e.g. `"panel,"`.
    pub key_prefix: String,
    /// Number of hardware revisions to load (A onward).
    pub revision_count: u8,
    /// Maximum descriptors in one assembled transaction.
    pub max_packets: usize,
    /// Boost level at or above which a max-level request selects HBM.
    pub boost_threshold: u8,
    /// Highest backlight level the caller may request.
    pub max_level: u32,
    /// Fallback when a level falls outside the candela map.
    pub safe_default: SafeDefault,
    /// Exclusive-mode drain polls before giving up.
    pub retry_budget: u32,
    /// Exclusive-mode drain poll interval, microseconds.
    pub poll_interval_us: u64,
    /// Apply last-packet framing so a transaction goes out as batched bursts.
    pub single_transmission: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::from("panel,"),
            revision_count: 8,
            max_packets: 128,
            boost_threshold: 6,
            max_level: 255,
            safe_default: SafeDefault::default(),
            retry_budget: 1000,
            poll_interval_us: 500,
            single_transmission: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.revision_count == 0 || self.revision_count > Revision::MAX_INDEX.saturating_add(1) {
            return Err(EngineError::Config(format!(
                "revision_count {} outside 1..=26",
                self.revision_count
            )));
        }
        if self.max_packets == 0 {
            return Err(EngineError::Config(String::from("max_packets must be non-zero")));
        }
        Ok(())
    }

    /// Drain poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Full property key for `stem` at `rev`: `<prefix><stem>_rev<X>`.
    ///
    /// Table stems look like `candela_map_table`; command-set stems carry
    /// their direction, e.g. `aid_tx_cmds`.
    pub fn revision_key(&self, stem: &str, rev: Revision) -> String {
        format!("{}{}_rev{}", self.key_prefix, stem, rev.letter())
    }

    /// Revisions to load, A first.
    pub fn revisions(&self) -> impl Iterator<Item = Revision> {
        Revision::iter(self.revision_count)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = EngineConfig::from_json("{}").expect("defaults");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.safe_default.cmd_index, 28);
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = EngineConfig::from_json(r#"{"max_packets": 4, "key_prefix": "samsung,"}"#)
            .expect("valid");
        assert_eq!(config.max_packets, 4);
        assert_eq!(
            config.revision_key("candela_map_table", Revision::new(1)),
            "samsung,candela_map_table_revB"
        );
        assert_eq!(config.boost_threshold, 6);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"max_packets": 0}"#),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn command_keys_carry_tx_cmds() {
        let config = EngineConfig::default();
        assert_eq!(
            config.revision_key("aid_tx_cmds", Revision::A),
            "panel,aid_tx_cmds_revA"
        );
    }
}
