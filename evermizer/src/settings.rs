use anyhow::{bail, Context, Result};
use evermizer_game::{CheckKey, GameData, Progress};
use evermizer_logic::{ProgressCounts, ProgressPair};
use serde::{Deserialize, Serialize};

const VERSION: usize = 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RandomizerSettings {
    pub version: usize,
    pub name: Option<String>,
    pub win_condition: WinCondition,
    pub item_placement_settings: ItemPlacementSettings,
}

/// The game is won once every listed check is reached and every progress threshold holds.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WinCondition {
    #[serde(default)]
    pub checks: Vec<CheckKey>,
    #[serde(default)]
    pub progress: Vec<ProgressPair>,
}

impl WinCondition {
    pub fn goal_check(key: CheckKey) -> Self {
        WinCondition {
            checks: vec![key],
            progress: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemPlacementSettings {
    pub max_attempts: usize,
    #[serde(default)]
    pub starting_progress: Vec<ProgressPair>,
}

impl ItemPlacementSettings {
    pub fn starting_counts(&self) -> ProgressCounts {
        let mut counts = ProgressCounts::new();
        counts.collect(&self.starting_progress);
        counts
    }
}

impl RandomizerSettings {
    pub fn default_for(game_data: &GameData) -> Self {
        RandomizerSettings {
            version: VERSION,
            name: None,
            win_condition: WinCondition::goal_check(game_data.goal),
            item_placement_settings: ItemPlacementSettings {
                max_attempts: 100,
                starting_progress: vec![],
            },
        }
    }
}

pub fn parse_settings(settings_str: &str) -> Result<RandomizerSettings> {
    let settings: RandomizerSettings =
        serde_json::from_str(settings_str).context("Unable to parse randomizer settings")?;
    if settings.version > VERSION {
        bail!(
            "Settings version {} is newer than supported version {}",
            settings.version,
            VERSION
        );
    }
    for pair in &settings.item_placement_settings.starting_progress {
        if pair.pieces <= 0 {
            bail!("Starting progress must be positive: {:?}", pair);
        }
    }
    for pair in &settings.win_condition.progress {
        if pair.pieces <= 0 || pair.progress == Progress::None {
            bail!("Win condition progress must be positive: {:?}", pair);
        }
    }
    Ok(settings)
}
