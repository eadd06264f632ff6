mod config;
mod strategy;

pub use config::{DuelConfig, DuelTimings};
pub use strategy::{CharacterData, CommandData, CommandKind, SkillData, Strategy};

use serde::{Deserialize, Serialize};

/// Dice element. `Omni` is the wildcard that pays for any requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementalType {
    Omni,
    Cryo,
    Hydro,
    Pyro,
    Electro,
    Anemo,
    Geo,
    Dendro,
}

impl std::fmt::Display for ElementalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
