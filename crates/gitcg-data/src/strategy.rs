use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ElementalType;

/// A character skill as authored in the strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillData {
    /// Position of the skill button, 1 being the rightmost (elemental burst)
    pub index: usize,
    pub name: String,
    /// Dice that must match the character's element
    #[serde(default)]
    pub specific_cost: u32,
    /// Dice of any element
    #[serde(default)]
    pub any_cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    pub element: ElementalType,
    pub skills: Vec<SkillData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[default]
    UseSkill,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandData {
    /// Character position, 1 to 3
    pub character: usize,
    #[serde(default)]
    pub action: CommandKind,
    pub skill: usize,
}

/// An authored duel plan: the three characters and the commands to play in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub name: String,
    pub characters: Vec<CharacterData>,
    pub commands: Vec<CommandData>,
}

impl Strategy {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read strategy {}", path.display()))?;
        let strategy = Self::parse(&content)
            .with_context(|| format!("Failed to parse strategy {}", path.display()))?;
        tracing::info!(
            "Loaded strategy '{}': {} characters, {} commands",
            strategy.name,
            strategy.characters.len(),
            strategy.commands.len()
        );
        Ok(strategy)
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
