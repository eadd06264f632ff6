//! The game table as seen by the duel controller: perception queries and
//! in-game actions, all synchronous from the controller's viewpoint.

mod cards;
mod screen;

pub use cards::{find_character_cards, CardState};
pub use screen::ScreenTable;

use anyhow::Result;
use gitcg_capture::ScreenRect;
use gitcg_data::ElementalType;
use gitcg_state::{Character, CharacterStatus, DuelModel};
use std::collections::BTreeSet;

use crate::cancel::CancelSignal;

/// What one look at the character cards revealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterObservation {
    /// Slot of the active character
    pub active: usize,
    pub defeated: BTreeSet<usize>,
    pub statuses: Vec<(usize, CharacterStatus)>,
}

pub trait DuelTable: Send {
    /// Signal that blocking steps inside table actions must honour.
    /// Cancellation surfaces as a `Cancelled` error from the interrupted call.
    fn bind_cancel(&mut self, _cancel: CancelSignal) {}

    /// Game window size in pixels
    fn window_size(&self) -> Result<(u32, u32)>;

    fn activate_window(&mut self) -> Result<()>;

    /// Pre-duel prompts, including the initial hand selection
    fn prepare_duel(&mut self) -> Result<()>;

    /// Our three character cards, left to right. Anything other than three is a miss.
    fn character_rects(&mut self) -> Result<Vec<ScreenRect>>;

    fn choose_first(&mut self, character: &Character) -> Result<()>;

    /// `None` when the active character could not be told apart
    fn observe_characters(&mut self, model: &DuelModel) -> Result<Option<CharacterObservation>>;

    /// Dice count read from the screen, `None` when unreadable
    fn dice_count(&mut self) -> Result<Option<i32>>;

    fn reroll_ready(&mut self) -> Result<bool>;

    /// Reroll every die whose element is not in `keep`
    fn reroll_dice(&mut self, keep: &BTreeSet<ElementalType>) -> Result<()>;

    fn is_my_turn(&mut self) -> Result<bool>;

    /// The opponent has finished acting and the round has settled
    fn opponent_settled(&mut self) -> Result<bool>;

    fn end_round(&mut self) -> Result<()>;

    fn switch_character(&mut self, target: &Character) -> Result<()>;

    /// `Ok(false)` when the game rejected the skill
    fn use_skill(&mut self, character: &Character, skill: usize) -> Result<bool>;

    /// Neutral click to dismiss a stuck prompt
    fn click_center(&mut self) -> Result<()>;
}
