use anyhow::{Context, Result};
use gitcg_capture::{regions, ScreenRect};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Delays and bounds used by the duel loop, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelTimings {
    pub character_rect_attempts: u32,
    pub character_rect_interval_ms: u64,
    pub active_character_attempts: u32,
    pub active_character_interval_ms: u64,
    /// Pause after the action segment of a round ends
    pub settle_ms: u64,
    /// Pause before pressing end-of-round
    pub round_end_settle_ms: u64,
    /// Pause after a rejected skill, before the dismissing click
    pub failure_pause_ms: u64,
    pub round_start_turn_delay_ms: u64,
    pub turn_poll_interval_ms: u64,
    /// Give up waiting for our turn after this long and carry on
    pub turn_idle_timeout_ms: u64,
    pub reroll_ready_timeout_ms: u64,
    pub default_wait_ms: u64,
    /// Wait after an elemental burst; its animation is the longest
    pub burst_wait_ms: u64,
    /// Wait after a switch performed by a character listed in `quick_switch_characters`
    pub quick_switch_wait_ms: u64,
    /// Gap between the clicks of one in-game action
    pub click_interval_ms: u64,
}

impl Default for DuelTimings {
    fn default() -> Self {
        Self {
            character_rect_attempts: 3,
            character_rect_interval_ms: 1500,
            active_character_attempts: 3,
            active_character_interval_ms: 500,
            settle_ms: 2000,
            round_end_settle_ms: 1000,
            failure_pause_ms: 1000,
            round_start_turn_delay_ms: 1000,
            turn_poll_interval_ms: 500,
            turn_idle_timeout_ms: 30_000,
            reroll_ready_timeout_ms: 10_000,
            default_wait_ms: 10_000,
            burst_wait_ms: 15_000,
            quick_switch_wait_ms: 3000,
            click_interval_ms: 800,
        }
    }
}

/// Read-only settings for automated duels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    /// Character card positions at 1920x1080, used when detection fails
    pub default_character_card_rects: Vec<ScreenRect>,
    /// Window size relative to 1920x1080
    pub asset_scale: f64,
    /// Characters whose switch animation finishes early, so the turn comes back sooner
    pub quick_switch_characters: Vec<String>,
    /// Tesseract language list
    pub ocr_languages: String,
    pub timings: DuelTimings,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            default_character_card_rects: regions::CHARACTER_CARDS.to_vec(),
            asset_scale: 1.0,
            quick_switch_characters: vec!["Mona".to_string()],
            ocr_languages: "eng".to_string(),
            timings: DuelTimings::default(),
        }
    }
}

impl DuelConfig {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "No duel config found at {}. Using defaults.",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded duel config from {}", path.display());
        Ok(config)
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default character card positions scaled to the current window
    pub fn scaled_character_card_rects(&self) -> Vec<ScreenRect> {
        self.default_character_card_rects
            .iter()
            .map(|r| r.scale(self.asset_scale))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent() {
        let config = DuelConfig::load(Path::new("/nonexistent/duel.json")).unwrap();
        assert_eq!(config, DuelConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = DuelConfig::parse(
            r#"{"asset_scale": 0.5, "timings": {"burst_wait_ms": 20000}}"#,
        )
        .unwrap();
        assert_eq!(config.asset_scale, 0.5);
        assert_eq!(config.timings.burst_wait_ms, 20_000);
        assert_eq!(config.timings.default_wait_ms, 10_000);
        assert_eq!(config.default_character_card_rects.len(), 3);
    }

    #[test]
    fn test_scaled_rects() {
        let config = DuelConfig {
            asset_scale: 0.5,
            ..DuelConfig::default()
        };
        let rects = config.scaled_character_card_rects();
        assert_eq!(rects[0], ScreenRect::new(334, 316, 83, 141));
    }

    #[test]
    fn test_quick_switch_settings() {
        let config = DuelConfig::parse(
            r#"{
                "quick_switch_characters": ["Mona", "Ayaka"],
                "timings": {"quick_switch_wait_ms": 2500}
            }"#,
        )
        .unwrap();
        assert_eq!(config.quick_switch_characters, vec!["Mona", "Ayaka"]);
        assert_eq!(config.timings.quick_switch_wait_ms, 2500);
        assert!(config.timings.quick_switch_wait_ms < config.timings.default_wait_ms);
        assert_eq!(DuelConfig::default().quick_switch_characters, vec!["Mona"]);
    }

    #[test]
    fn test_malformed_config_is_error() {
        assert!(DuelConfig::parse(r#"{"asset_scale": "big"}"#).is_err());
    }
}
