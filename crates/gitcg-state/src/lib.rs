use anyhow::{bail, Result};
use gitcg_capture::ScreenRect;
use gitcg_data::{CommandKind, ElementalType, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Number of character slots. Slot 0 is unused so indices match in-game positions.
pub const CHARACTER_SLOTS: usize = 4;

/// Dice spent on one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceCost {
    pub element: ElementalType,
    pub specific: u32,
    pub any: u32,
}

impl DiceCost {
    pub fn total(&self) -> u32 {
        self.specific + self.any
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub index: usize,
    pub name: String,
    pub cost: DiceCost,
}

/// Transient effects that keep a character from acting. Cleared every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CharacterStatus {
    Frozen,
    Petrified,
    Stunned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub index: usize,
    pub name: String,
    pub element: ElementalType,
    pub skills: Vec<Skill>,
    /// Card position on screen, assigned once per duel
    pub area: Option<ScreenRect>,
    pub is_defeated: bool,
    pub status_list: BTreeSet<CharacterStatus>,
}

impl Character {
    pub fn skill(&self, index: usize) -> Option<&Skill> {
        self.skills.iter().find(|s| s.index == index)
    }

    pub fn has_status(&self) -> bool {
        !self.status_list.is_empty()
    }

    /// Defeated or disabled by a status effect
    pub fn is_unavailable(&self) -> bool {
        self.is_defeated || self.has_status()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SwitchTo { target: usize },
    UseSkill { skill: usize, cost: DiceCost },
}

/// One unit of player intent. For a switch, `character` is the one switched away from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub character: usize,
    pub action: Action,
}

impl ActionCommand {
    pub fn use_skill(character: usize, skill: usize, cost: DiceCost) -> Self {
        Self {
            character,
            action: Action::UseSkill { skill, cost },
        }
    }

    pub fn switch(from: usize, to: usize) -> Self {
        Self {
            character: from,
            action: Action::SwitchTo { target: to },
        }
    }

    pub fn dice_cost(&self) -> u32 {
        match self.action {
            Action::SwitchTo { .. } => 1,
            Action::UseSkill { cost, .. } => cost.total(),
        }
    }

    /// Element of the dice this command consumes. Switches accept any die.
    pub fn element(&self) -> ElementalType {
        match self.action {
            Action::SwitchTo { .. } => ElementalType::Omni,
            Action::UseSkill { cost, .. } => cost.element,
        }
    }

    /// Skill index for a skill use, destination slot for a switch
    pub fn target_index(&self) -> usize {
        match self.action {
            Action::SwitchTo { target } => target,
            Action::UseSkill { skill, .. } => skill,
        }
    }

    /// Skill 1 is the elemental burst
    pub fn is_burst(&self) -> bool {
        matches!(self.action, Action::UseSkill { .. }) && self.target_index() == 1
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Action::SwitchTo { target } => {
                write!(f, "switch {} -> {}", self.character, target)
            }
            Action::UseSkill { skill, cost } => write!(
                f,
                "character {} skill {} ({} {} + {} any)",
                self.character, skill, cost.specific, cost.element, cost.any
            ),
        }
    }
}

/// Mutable snapshot of one duel, owned by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelModel {
    pub characters: [Option<Character>; CHARACTER_SLOTS],
    /// Active character slot, 0 while unknown
    pub current_character: usize,
    pub round_number: u32,
    pub current_card_count: i32,
    pub current_dice_count: i32,
    pub action_command_queue: Vec<ActionCommand>,
}

impl DuelModel {
    /// Build the roster and command queue from an authored strategy
    pub fn from_strategy(strategy: &Strategy) -> Result<Self> {
        if strategy.characters.len() != CHARACTER_SLOTS - 1 {
            bail!(
                "Strategy must list {} characters, found {}",
                CHARACTER_SLOTS - 1,
                strategy.characters.len()
            );
        }

        let mut characters: [Option<Character>; CHARACTER_SLOTS] = Default::default();
        for (i, data) in strategy.characters.iter().enumerate() {
            let index = i + 1;
            let skills = data
                .skills
                .iter()
                .map(|s| Skill {
                    index: s.index,
                    name: s.name.clone(),
                    cost: DiceCost {
                        element: data.element,
                        specific: s.specific_cost,
                        any: s.any_cost,
                    },
                })
                .collect();
            characters[index] = Some(Character {
                index,
                name: data.name.clone(),
                element: data.element,
                skills,
                area: None,
                is_defeated: false,
                status_list: BTreeSet::new(),
            });
        }

        let mut queue = Vec::with_capacity(strategy.commands.len());
        for (n, command) in strategy.commands.iter().enumerate() {
            let Some(character) = characters.get(command.character).and_then(|c| c.as_ref())
            else {
                bail!(
                    "Command {} refers to character {}, expected 1-3",
                    n + 1,
                    command.character
                );
            };
            match command.action {
                CommandKind::UseSkill => {
                    let Some(skill) = character.skill(command.skill) else {
                        bail!(
                            "Command {}: {} has no skill {}",
                            n + 1,
                            character.name,
                            command.skill
                        );
                    };
                    queue.push(ActionCommand::use_skill(
                        character.index,
                        skill.index,
                        skill.cost,
                    ));
                }
            }
        }

        info!(
            "Strategy '{}': {} command(s) for {}",
            strategy.name,
            queue.len(),
            strategy
                .characters
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self {
            characters,
            current_character: 0,
            round_number: 1,
            current_card_count: 0,
            current_dice_count: 0,
            action_command_queue: queue,
        })
    }

    pub fn character(&self, index: usize) -> Option<&Character> {
        self.characters.get(index).and_then(|c| c.as_ref())
    }

    pub fn character_mut(&mut self, index: usize) -> Option<&mut Character> {
        self.characters.get_mut(index).and_then(|c| c.as_mut())
    }

    pub fn clear_character_status(&mut self) {
        for character in self.characters.iter_mut().flatten() {
            if !character.status_list.is_empty() {
                debug!("{} recovers from {:?}", character.name, character.status_list);
                character.status_list.clear();
            }
        }
    }

    /// Character slots in the order the queue first uses them
    pub fn character_switch_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        for command in &self.action_command_queue {
            if !order.contains(&command.character) {
                order.push(command.character);
            }
        }
        order
    }

    pub fn alive_count(&self) -> usize {
        self.characters
            .iter()
            .flatten()
            .filter(|c| !c.is_defeated)
            .count()
    }
}
