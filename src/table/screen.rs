use anyhow::{anyhow, Context, Result};
use gitcg_capture::{crop_rect, regions, FrameSource, GameInput, ScreenRect};
use gitcg_data::{DuelConfig, ElementalType};
use gitcg_state::{Character, CharacterStatus, DuelModel};
use gitcg_vision::{
    ColorMatch, ColorSpace, MatchDetail, OcrProfile, OverlayStyle, PreparedRecognition,
    Recognition, RecognitionEngine, RecognitionObject, TextMatch,
};
use image::RgbaImage;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;

use super::cards::{card_top, find_character_cards, CardState};
use super::{CharacterObservation, DuelTable};

/// Upward shift of the active character card at 1080p
const ACTIVE_LIFT: u32 = 20;
/// How far above a card to look for its lifted top edge, at 1080p
const LIFT_SEARCH: u32 = 60;

/// HSV ranges of each die face on the reroll screen. Hue is 0-179.
const DIE_COLORS: [(ElementalType, [u8; 3], [u8; 3]); 8] = [
    (ElementalType::Omni, [0, 0, 200], [179, 40, 255]),
    (ElementalType::Pyro, [0, 80, 100], [12, 255, 255]),
    (ElementalType::Geo, [18, 80, 100], [30, 255, 255]),
    (ElementalType::Dendro, [35, 80, 100], [69, 255, 255]),
    (ElementalType::Anemo, [70, 80, 100], [84, 255, 255]),
    (ElementalType::Cryo, [85, 80, 100], [99, 255, 255]),
    (ElementalType::Hydro, [100, 80, 100], [124, 255, 255]),
    (ElementalType::Electro, [125, 80, 100], [155, 255, 255]),
];

/// Defeated cards are drained of color
const DEFEATED_HSV: ([u8; 3], [u8; 3]) = ([0, 0, 0], [179, 30, 255]);
/// Pale ice crust over a frozen card
const FROZEN_HSV: ([u8; 3], [u8; 3]) = ([85, 60, 200], [100, 200, 255]);

/// `DuelTable` backed by screen captures and injected clicks
pub struct ScreenTable<S, I> {
    source: S,
    input: I,
    engine: RecognitionEngine,
    scale: f64,
    click_interval: Duration,
    cancel: CancelSignal,
    dice_count: PreparedRecognition,
    my_turn: PreparedRecognition,
    reroll_title: PreparedRecognition,
    rejection: PreparedRecognition,
}

impl<S: FrameSource, I: GameInput> ScreenTable<S, I> {
    pub fn new(
        source: S,
        input: I,
        engine: RecognitionEngine,
        config: &DuelConfig,
    ) -> Result<Self> {
        let scale = config.asset_scale;
        let at = |rect: ScreenRect| rect.scale(scale);

        let dice_count = RecognitionObject::color_text(
            at(regions::dice_count()),
            ColorMatch::new(ColorSpace::Rgb, [200, 200, 200], [255, 255, 255]),
            TextMatch::new(OcrProfile::Digits).matching(&[r"^\d+$"]),
        )
        .named("dice_count")
        .drawn(OverlayStyle::default())
        .prepare()
        .context("dice count recognition")?;

        let button = at(regions::round_button());
        let my_turn = RecognitionObject::color(
            button,
            ColorMatch::new(ColorSpace::Hsv, [0, 0, 200], [179, 80, 255])
                .min_count(fraction(button, 0.25)),
        )
        .named("my_turn")
        .drawn(OverlayStyle {
            color: [0, 255, 0],
            thickness: 2,
        })
        .prepare()
        .context("turn indicator recognition")?;

        let reroll_title = RecognitionObject::text(
            at(regions::reroll_title()),
            TextMatch::new(OcrProfile::Text)
                .replace("Reroll", &["Rerol1", "Re-roll", "ReRoll", "Rer0ll"])
                .any_of(&["Reroll"]),
        )
        .named("reroll_title")
        .prepare()
        .context("reroll screen recognition")?;

        let rejection = RecognitionObject::text(
            at(regions::prompt_banner()),
            TextMatch::new(OcrProfile::Text)
                .replace("Not enough", &["Not enongh", "Nat enough", "Not en0ugh"])
                .any_of(&["Not enough", "Insufficient", "cannot"]),
        )
        .named("rejection_prompt")
        .prepare()
        .context("rejection prompt recognition")?;

        Ok(Self {
            source,
            input,
            engine,
            scale,
            click_interval: Duration::from_millis(config.timings.click_interval_ms),
            cancel: CancelSignal::never(),
            dice_count,
            my_turn,
            reroll_title,
            rejection,
        })
    }

    fn at(&self, rect: ScreenRect) -> ScreenRect {
        rect.scale(self.scale)
    }

    fn scaled(&self, length: u32) -> u32 {
        (length as f64 * self.scale).round() as u32
    }

    fn capture(&self) -> Result<RgbaImage> {
        self.source.capture_frame().context("Failed to capture game frame")
    }

    /// Evaluate a recognition, downgrading OCR failures to a miss
    fn evaluate(
        &self,
        frame: &RgbaImage,
        target: &PreparedRecognition,
    ) -> Result<Option<Recognition>> {
        match self.engine.evaluate(frame, target) {
            Ok(recognition) => Ok(Some(recognition)),
            Err(e) if e.is_configuration() => Err(e.into()),
            Err(e) => {
                warn!(
                    "Recognition '{}' unavailable: {}",
                    target.object().name.as_deref().unwrap_or("unnamed"),
                    e
                );
                Ok(None)
            }
        }
    }

    fn found(&self, frame: &RgbaImage, target: &PreparedRecognition) -> Result<bool> {
        Ok(self.evaluate(frame, target)?.map_or(false, |r| r.found))
    }

    fn pixels_in_range(
        &self,
        frame: &RgbaImage,
        area: ScreenRect,
        (lower, upper): ([u8; 3], [u8; 3]),
        share: f64,
    ) -> Result<bool> {
        let target = RecognitionObject::color(
            area,
            ColorMatch::new(ColorSpace::Hsv, lower, upper).min_count(fraction(area, share)),
        )
        .prepare()?;
        self.found(frame, &target)
    }

    /// Click the center of `rect`, then give the game the click interval to react
    fn click_rect(&mut self, rect: ScreenRect) -> Result<()> {
        self.cancel.check()?;
        let (x, y) = rect.center();
        debug!("Click ({}, {})", x, y);
        self.input.click(x, y)?;
        self.cancel.block_for(self.click_interval)?;
        Ok(())
    }

    /// Geometry and condition of the character cards at `areas`
    pub fn inspect_cards(&self, areas: &[ScreenRect]) -> Result<Vec<CardState>> {
        let frame = self.capture()?;
        let lift = self.scaled(ACTIVE_LIFT);
        let search = self.scaled(LIFT_SEARCH);

        areas
            .iter()
            .map(|&area| -> Result<CardState> {
                let top = card_top(&frame, area, search).unwrap_or(area.y);
                Ok(CardState {
                    area,
                    top,
                    lifted: top + lift / 2 < area.y,
                    defeated: self.pixels_in_range(&frame, area, DEFEATED_HSV, 0.9)?,
                    frozen: self.pixels_in_range(&frame, area, FROZEN_HSV, 0.15)?,
                })
            })
            .collect()
    }

    /// Element of each die on the reroll screen, `None` where no face color dominates
    pub fn read_dice(&self) -> Result<Vec<Option<ElementalType>>> {
        let frame = self.capture()?;
        (0..8)
            .map(|i| -> Result<Option<ElementalType>> {
                let die = self.at(regions::reroll_die(i));
                let mut best: Option<(ElementalType, u32)> = None;
                for (element, lower, upper) in DIE_COLORS {
                    let target = RecognitionObject::color(
                        die,
                        ColorMatch::new(ColorSpace::Hsv, lower, upper)
                            .min_count(fraction(die, 0.3)),
                    )
                    .prepare()?;
                    let Some(recognition) = self.evaluate(&frame, &target)? else {
                        continue;
                    };
                    if let MatchDetail::Color { matched_pixels } = recognition.detail {
                        let better = best.map_or(true, |(_, count)| matched_pixels > count);
                        if recognition.found && better {
                            best = Some((element, matched_pixels));
                        }
                    }
                }
                Ok(best.map(|(element, _)| element))
            })
            .collect()
    }

    fn read_dice_count(&self, frame: &RgbaImage) -> Result<Option<i32>> {
        let Some(recognition) = self.evaluate(frame, &self.dice_count)? else {
            return Ok(None);
        };
        if !recognition.found {
            debug!("Dice count unreadable: {:?}", recognition.text());
            return Ok(None);
        }
        Ok(recognition.text().and_then(|t| t.trim().parse().ok()))
    }

    /// Save the current frame and the crops of every known region for debugging
    pub fn save_debug_crops(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let frame = self.capture()?;
        frame.save(dir.join("frame_full.png"))?;

        let mut named = vec![
            ("dice_count".to_string(), self.at(regions::dice_count())),
            ("round_button".to_string(), self.at(regions::round_button())),
            ("reroll_title".to_string(), self.at(regions::reroll_title())),
            ("prompt_banner".to_string(), self.at(regions::prompt_banner())),
            ("character_row".to_string(), self.at(regions::character_row())),
        ];
        for i in 0..8 {
            named.push((format!("die_{}", i), self.at(regions::reroll_die(i))));
        }
        let cards = find_character_cards(&frame, self.at(regions::character_row()));
        for (i, card) in cards.iter().enumerate() {
            named.push((format!("card_{}", i + 1), *card));
        }

        let mut info = format!(
            "Frame: {}x{}\nScale: {:.3}\n\n",
            frame.width(),
            frame.height(),
            self.scale
        );
        for (name, rect) in &named {
            info.push_str(&format!("{}: {}\n", name, rect));
            if rect.intersect(&ScreenRect::of_image(&frame)).is_some() {
                crop_rect(&frame, rect).save(dir.join(format!("{}.png", name)))?;
            }
        }
        std::fs::write(dir.join("regions.txt"), info)?;

        info!("Debug crops saved to {}", dir.display());
        Ok(())
    }
}

impl<S: FrameSource, I: GameInput> DuelTable for ScreenTable<S, I> {
    fn bind_cancel(&mut self, cancel: CancelSignal) {
        self.cancel = cancel;
    }

    fn window_size(&self) -> Result<(u32, u32)> {
        let rect = self.input.window_rect()?;
        Ok((rect.width, rect.height))
    }

    fn activate_window(&mut self) -> Result<()> {
        self.input.activate_window()
    }

    fn prepare_duel(&mut self) -> Result<()> {
        info!("Keeping the starting hand");
        self.click_rect(self.at(regions::confirm_button()))
    }

    fn character_rects(&mut self) -> Result<Vec<ScreenRect>> {
        let frame = self.capture()?;
        let cards = find_character_cards(&frame, self.at(regions::character_row()));
        debug!("Character cards: {:?}", cards);
        Ok(cards)
    }

    fn choose_first(&mut self, character: &Character) -> Result<()> {
        let area = character
            .area
            .ok_or_else(|| anyhow!("{} has no card position", character.name))?;
        info!("Choosing {} to go first", character.name);
        self.click_rect(area)?;
        self.click_rect(self.at(regions::confirm_button()))
    }

    fn observe_characters(&mut self, model: &DuelModel) -> Result<Option<CharacterObservation>> {
        let slots: Vec<(usize, ScreenRect)> = model
            .characters
            .iter()
            .flatten()
            .filter_map(|c| c.area.map(|area| (c.index, area)))
            .collect();
        let areas: Vec<ScreenRect> = slots.iter().map(|(_, area)| *area).collect();
        let cards = self.inspect_cards(&areas)?;

        let mut observation = CharacterObservation::default();
        let mut lifted = Vec::new();
        for ((index, _), card) in slots.iter().zip(&cards) {
            if card.defeated {
                observation.defeated.insert(*index);
                continue;
            }
            if card.frozen {
                observation.statuses.push((*index, CharacterStatus::Frozen));
            }
            if card.lifted {
                lifted.push(*index);
            }
        }

        match lifted.as_slice() {
            [active] => {
                observation.active = *active;
                Ok(Some(observation))
            }
            _ => {
                debug!("Active character ambiguous: lifted cards {:?}", lifted);
                Ok(None)
            }
        }
    }

    fn dice_count(&mut self) -> Result<Option<i32>> {
        let frame = self.capture()?;
        self.read_dice_count(&frame)
    }

    fn reroll_ready(&mut self) -> Result<bool> {
        let frame = self.capture()?;
        self.found(&frame, &self.reroll_title)
    }

    fn reroll_dice(&mut self, keep: &BTreeSet<ElementalType>) -> Result<()> {
        let dice = self.read_dice()?;
        info!("Rolled dice {:?}, keeping {:?}", dice, keep);
        for (i, element) in dice.iter().enumerate() {
            let keep_die = element.map_or(false, |e| keep.contains(&e));
            if !keep_die {
                self.click_rect(self.at(regions::reroll_die(i)))?;
            }
        }
        self.click_rect(self.at(regions::confirm_button()))
    }

    fn is_my_turn(&mut self) -> Result<bool> {
        let frame = self.capture()?;
        self.found(&frame, &self.my_turn)
    }

    fn opponent_settled(&mut self) -> Result<bool> {
        let frame = self.capture()?;
        Ok(self.found(&frame, &self.my_turn)? || self.found(&frame, &self.reroll_title)?)
    }

    fn end_round(&mut self) -> Result<()> {
        let button = self.at(regions::round_button());
        // First click opens the end-round prompt, the second confirms it
        self.click_rect(button)?;
        self.click_rect(button)
    }

    fn switch_character(&mut self, target: &Character) -> Result<()> {
        let area = target
            .area
            .ok_or_else(|| anyhow!("{} has no card position", target.name))?;
        info!("Switching to {}", target.name);
        self.click_rect(area)?;
        // The switch confirmation takes the place of the burst button
        self.click_rect(self.at(regions::skill_button(1)))
    }

    fn use_skill(&mut self, character: &Character, skill: usize) -> Result<bool> {
        let button = self.at(regions::skill_button(skill));
        info!("{} uses skill {}", character.name, skill);
        // Select, then confirm with the dice the game picked
        self.click_rect(button)?;
        self.click_rect(button)?;

        let frame = self.capture()?;
        let rejected = self.found(&frame, &self.rejection)?;
        if rejected {
            warn!("Skill {} of {} was rejected", skill, character.name);
        }
        Ok(!rejected)
    }

    fn click_center(&mut self) -> Result<()> {
        let (w, h) = self.window_size()?;
        self.click_rect(ScreenRect::new(0, 0, w, h))
    }
}

/// Pixel count covering `share` of the rectangle, at least 1
fn fraction(rect: ScreenRect, share: f64) -> u32 {
    ((rect.area() as f64 * share).ceil() as u32).max(1)
}

#[cfg(test)]
mod tests;
