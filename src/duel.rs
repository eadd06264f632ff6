//! The duel controller: a round and turn state machine that perceives the
//! table, keeps the duel model current and plays the queued commands.

use anyhow::anyhow;
use gitcg_advisor::{
    card_count_for_round, compute_wait_time, predict_dice_types, reconcile_dice_count,
    DiceVerdict,
};
use gitcg_capture::{regions, ScreenRect};
use gitcg_data::DuelConfig;
use gitcg_state::{Action, ActionCommand, Character, DuelModel};
use gitcg_vision::{NoOverlay, Overlay};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cancel::{CancelSignal, Cancelled};
use crate::table::{CharacterObservation, DuelTable};

/// Dice rolled at the start of every round
pub const DICE_PER_ROUND: i32 = 8;

/// External task scheduler that must stay quiet while a duel runs
pub trait TaskScheduler: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// Every queued command was executed
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DuelStatus {
    Idle,
    Running { round: u32, dice: i32, queued: usize },
    Finished { reason: TerminationReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DuelPhase {
    Preparing,
    RoundStart,
    ActionPhase,
    RoundEnd,
    Terminated,
}

/// Commands executed in one decision tick and the wait that followed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub round: u32,
    pub executed: Vec<ActionCommand>,
    pub dice_after: i32,
    pub wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelOutcome {
    pub reason: TerminationReason,
    /// Round the duel ended in
    pub rounds: u32,
    pub history: Vec<TickRecord>,
    /// Commands left unexecuted
    pub remaining: Vec<ActionCommand>,
}

/// Collaborators and signals handed to one duel
pub struct DuelContext {
    pub cancel: CancelSignal,
    pub overlay: Arc<dyn Overlay>,
    pub scheduler: Option<Arc<dyn TaskScheduler>>,
    pub status: watch::Sender<DuelStatus>,
}

impl DuelContext {
    pub fn new(cancel: CancelSignal) -> Self {
        Self {
            cancel,
            overlay: Arc::new(NoOverlay),
            scheduler: None,
            status: watch::channel(DuelStatus::Idle).0,
        }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn Overlay>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_status(mut self, status: watch::Sender<DuelStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Why the duel loop stopped early
#[derive(Debug, thiserror::Error)]
enum Interrupt {
    #[error("duel cancelled")]
    Cancelled,
    #[error(transparent)]
    Fault(anyhow::Error),
}

impl From<Cancelled> for Interrupt {
    fn from(_: Cancelled) -> Self {
        Interrupt::Cancelled
    }
}

/// Table calls report cancellation of their own pauses as a `Cancelled` error
impl From<anyhow::Error> for Interrupt {
    fn from(e: anyhow::Error) -> Self {
        if e.is::<Cancelled>() {
            Interrupt::Cancelled
        } else {
            Interrupt::Fault(e)
        }
    }
}

enum PhaseEnd {
    RoundOver,
    QueueExhausted,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub struct DuelController<T> {
    table: T,
    model: DuelModel,
    config: DuelConfig,
    ctx: DuelContext,
    phase: DuelPhase,
    history: Vec<TickRecord>,
}

impl<T: DuelTable> DuelController<T> {
    pub fn new(table: T, model: DuelModel, config: DuelConfig, ctx: DuelContext) -> Self {
        Self {
            table,
            model,
            config,
            ctx,
            phase: DuelPhase::Preparing,
            history: Vec::new(),
        }
    }

    /// Play the duel to its end. Cleanup runs on every path.
    pub async fn run(mut self) -> DuelOutcome {
        info!("Automated duel starting");
        self.table.bind_cancel(self.ctx.cancel.clone());
        if let Some(scheduler) = &self.ctx.scheduler {
            scheduler.pause();
        }

        let reason = match self.play().await {
            Ok(()) => {
                info!("All queued commands executed, duel finished");
                TerminationReason::Completed
            }
            Err(Interrupt::Cancelled) => {
                info!("Duel cancelled");
                TerminationReason::Cancelled
            }
            Err(Interrupt::Fault(e)) => {
                error!("Duel aborted: {:#}", e);
                debug!("{:?}", e);
                TerminationReason::Failed(format!("{:#}", e))
            }
        };
        self.finish(reason)
    }

    fn finish(mut self, reason: TerminationReason) -> DuelOutcome {
        self.enter(DuelPhase::Terminated);
        self.ctx.overlay.clear_all();
        if let Some(scheduler) = &self.ctx.scheduler {
            scheduler.resume();
        }
        self.ctx.status.send_replace(DuelStatus::Finished {
            reason: reason.clone(),
        });
        info!(
            "Duel ended in round {}: {:?}, {} command(s) left",
            self.model.round_number,
            reason,
            self.model.action_command_queue.len()
        );

        DuelOutcome {
            reason,
            rounds: self.model.round_number,
            history: self.history,
            remaining: self.model.action_command_queue,
        }
    }

    async fn play(&mut self) -> Result<(), Interrupt> {
        if self.model.action_command_queue.is_empty() {
            info!("Strategy has no commands");
            return Ok(());
        }

        self.prepare().await?;
        loop {
            self.start_round().await?;
            if let PhaseEnd::QueueExhausted = self.action_phase().await? {
                return Ok(());
            }
            self.end_round().await?;
        }
    }

    fn enter(&mut self, phase: DuelPhase) {
        if self.phase != phase {
            info!("Duel phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn publish_status(&self) {
        self.ctx.status.send_replace(DuelStatus::Running {
            round: self.model.round_number,
            dice: self.model.current_dice_count,
            queued: self.model.action_command_queue.len(),
        });
    }

    async fn prepare(&mut self) -> Result<(), Interrupt> {
        self.enter(DuelPhase::Preparing);
        self.publish_status();
        self.check_resolution();
        self.table.activate_window()?;
        self.table.prepare_duel()?;

        let rects = self.locate_character_cards().await?;
        for (i, rect) in rects.into_iter().enumerate() {
            if let Some(character) = self.model.character_mut(i + 1) {
                character.area = Some(rect);
            }
        }

        let first = self
            .model
            .action_command_queue
            .first()
            .map(|c| c.character)
            .ok_or_else(|| anyhow!("command queue is empty"))?;
        let character = self
            .model
            .character(first)
            .ok_or_else(|| anyhow!("no character in slot {}", first))?;
        info!(
            "First character: {}, switch order {:?}",
            character.name,
            self.model.character_switch_order()
        );
        self.table.choose_first(character)?;
        self.model.current_character = first;
        Ok(())
    }

    fn check_resolution(&self) {
        match self.table.window_size() {
            Ok((w, h)) if (w, h) != (regions::REFERENCE_WIDTH, regions::REFERENCE_HEIGHT) => {
                warn!(
                    "Game window is {}x{}; recognition is calibrated for {}x{}",
                    w,
                    h,
                    regions::REFERENCE_WIDTH,
                    regions::REFERENCE_HEIGHT
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read the game window size: {:#}", e),
        }
    }

    async fn locate_character_cards(&mut self) -> Result<Vec<ScreenRect>, Interrupt> {
        let timings = &self.config.timings;
        let (attempts, interval) = (
            timings.character_rect_attempts.max(1),
            ms(timings.character_rect_interval_ms),
        );

        for attempt in 1..=attempts {
            match self.table.character_rects() {
                Ok(rects) if rects.len() == 3 => {
                    debug!("Character cards: {:?}", rects);
                    return Ok(rects);
                }
                Ok(rects) => debug!(
                    "Found {} character card(s) (attempt {}/{})",
                    rects.len(),
                    attempt,
                    attempts
                ),
                Err(e) => debug!(
                    "Character card detection failed (attempt {}/{}): {:#}",
                    attempt, attempts, e
                ),
            }
            if attempt < attempts {
                self.ctx.cancel.sleep(interval).await?;
            }
        }

        let defaults = self.config.scaled_character_card_rects();
        if defaults.len() != 3 {
            return Err(anyhow!(
                "default character card layout has {} entries, expected 3",
                defaults.len()
            )
            .into());
        }
        warn!("Character cards not recognised, using the default layout");
        Ok(defaults)
    }

    async fn start_round(&mut self) -> Result<(), Interrupt> {
        self.enter(DuelPhase::RoundStart);
        let round = self.model.round_number;
        info!(
            "---------- Round {} ({} character(s) standing) ----------",
            round,
            self.model.alive_count()
        );

        self.model.clear_character_status();
        self.model.current_card_count = card_count_for_round(round, self.model.current_card_count);
        self.model.current_dice_count = DICE_PER_ROUND;
        self.publish_status();

        let keep = predict_dice_types(&self.model);
        info!("Keeping dice {:?} on reroll", keep);
        self.wait_for_reroll().await?;
        self.table.reroll_dice(&keep)?;

        // Dice animations vary and the opponent may go first
        self.wait_for_my_turn(ms(self.config.timings.round_start_turn_delay_ms))
            .await?;
        Ok(())
    }

    async fn action_phase(&mut self) -> Result<PhaseEnd, Interrupt> {
        self.enter(DuelPhase::ActionPhase);
        let settle = ms(self.config.timings.settle_ms);

        loop {
            self.ctx.cancel.check()?;
            info!(
                "Action tick: {} dice, {} cards, {} command(s) queued",
                self.model.current_dice_count,
                self.model.current_card_count,
                self.model.action_command_queue.len()
            );
            if self.model.current_dice_count <= 0 {
                info!("Dice spent");
                self.ctx.cancel.sleep(settle).await?;
                return Ok(PhaseEnd::RoundOver);
            }

            self.observe_characters().await?;
            self.reconcile_dice()?;

            let executed = self.execute_tick().await?;
            if executed.is_empty() {
                info!("Nothing more to do this round");
                self.ctx.cancel.sleep(settle).await?;
                return Ok(PhaseEnd::RoundOver);
            }

            let wait = compute_wait_time(
                &executed,
                &self.model,
                &self.config.quick_switch_characters,
                &self.config.timings,
            );
            self.history.push(TickRecord {
                round: self.model.round_number,
                executed,
                dice_after: self.model.current_dice_count,
                wait,
            });
            self.publish_status();

            self.wait_for_my_turn(wait).await?;
            if self.model.action_command_queue.is_empty() {
                return Ok(PhaseEnd::QueueExhausted);
            }
        }
    }

    /// Refresh the active character, defeats and statuses. A miss leaves the model as it was.
    async fn observe_characters(&mut self) -> Result<(), Interrupt> {
        let timings = &self.config.timings;
        let (attempts, interval) = (
            timings.active_character_attempts.max(1),
            ms(timings.active_character_interval_ms),
        );

        for attempt in 1..=attempts {
            if let Some(observation) = self.table.observe_characters(&self.model)? {
                self.apply_observation(observation);
                return Ok(());
            }
            debug!(
                "Active character not recognised (attempt {}/{})",
                attempt, attempts
            );
            if attempt < attempts {
                self.ctx.cancel.sleep(interval).await?;
            }
        }

        warn!(
            "Active character not recognised, assuming {}",
            self.model.current_character
        );
        Ok(())
    }

    fn apply_observation(&mut self, observation: CharacterObservation) {
        for index in &observation.defeated {
            if let Some(character) = self.model.character_mut(*index) {
                if !character.is_defeated {
                    info!("{} is defeated", character.name);
                    character.is_defeated = true;
                }
            }
        }
        for (index, status) in &observation.statuses {
            if let Some(character) = self.model.character_mut(*index) {
                if character.status_list.insert(*status) {
                    info!("{} is {:?}", character.name, status);
                }
            }
        }
        if observation.active != self.model.current_character {
            if let Some(character) = self.model.character(observation.active) {
                info!("Active character is now {}", character.name);
                self.model.current_character = observation.active;
            }
        }
    }

    fn reconcile_dice(&mut self) -> Result<(), Interrupt> {
        let computed = self.model.current_dice_count;
        let observed = self.table.dice_count()?;
        let reconciled = reconcile_dice_count(computed, observed);

        match reconciled.verdict {
            DiceVerdict::Adjusted => info!(
                "Dice count adjusted by the field: {} -> {}",
                computed, reconciled.value
            ),
            DiceVerdict::Distrusted => warn!(
                "Read {} dice but expected {}; ignoring the reading",
                observed.unwrap_or_default(),
                computed
            ),
            DiceVerdict::Unavailable => debug!("Dice count unreadable"),
            DiceVerdict::Unchanged => {}
        }
        self.model.current_dice_count = reconciled.value;
        Ok(())
    }

    /// Execute at most one action: a switch toward the next eligible command, or the command itself
    async fn execute_tick(&mut self) -> Result<Vec<ActionCommand>, Interrupt> {
        let active = self.model.current_character;
        let active_disabled = self
            .model
            .character(active)
            .map_or(false, Character::has_status);

        let Some(pos) = self
            .model
            .action_command_queue
            .iter()
            .position(|c| is_eligible(&self.model, c, active, active_disabled))
        else {
            return Ok(Vec::new());
        };
        let command = self.model.action_command_queue[pos];

        if command.character != active {
            if self.model.current_dice_count < 1 {
                info!("Not enough dice to switch to character {}", command.character);
                return Ok(Vec::new());
            }
            let target = self
                .model
                .character(command.character)
                .ok_or_else(|| anyhow!("no character in slot {}", command.character))?;
            self.table.switch_character(target)?;

            let switch = ActionCommand::switch(active, command.character);
            self.model.current_dice_count -= 1;
            self.model.current_character = command.character;
            info!("Executed: {}", switch);
            return Ok(vec![switch]);
        }

        let cost = command.dice_cost() as i32;
        if cost > self.model.current_dice_count {
            info!(
                "Not enough dice for {}: need {}, have {}",
                command, cost, self.model.current_dice_count
            );
            return Ok(Vec::new());
        }

        let done = match command.action {
            Action::UseSkill { skill, .. } => {
                let character = self
                    .model
                    .character(command.character)
                    .ok_or_else(|| anyhow!("no character in slot {}", command.character))?;
                self.table.use_skill(character, skill)?
            }
            Action::SwitchTo { target } => {
                let character = self
                    .model
                    .character(target)
                    .ok_or_else(|| anyhow!("no character in slot {}", target))?;
                self.table.switch_character(character)?;
                self.model.current_character = target;
                true
            }
        };

        if !done {
            warn!("Command failed, possibly missing cards: {}", command);
            self.ctx
                .cancel
                .sleep(ms(self.config.timings.failure_pause_ms))
                .await?;
            self.table.click_center()?;
            return Ok(Vec::new());
        }

        self.model.current_dice_count -= cost;
        self.model.action_command_queue.remove(pos);
        info!("Executed: {}", command);
        Ok(vec![command])
    }

    async fn end_round(&mut self) -> Result<(), Interrupt> {
        self.enter(DuelPhase::RoundEnd);
        let timings = &self.config.timings;
        let (pause, settle) = (ms(timings.round_end_settle_ms), ms(timings.settle_ms));

        self.ctx.cancel.sleep(pause).await?;
        info!("Ending round {}", self.model.round_number);
        self.table.end_round()?;
        self.ctx.cancel.sleep(settle).await?;

        self.wait_for_opponent().await?;
        self.model.round_number += 1;
        Ok(())
    }

    /// Sleep `delay`, then poll until it is our turn. Gives up quietly after the idle timeout.
    async fn wait_for_my_turn(&mut self, delay: Duration) -> Result<(), Interrupt> {
        let timings = &self.config.timings;
        let (poll, timeout) = (
            ms(timings.turn_poll_interval_ms),
            ms(timings.turn_idle_timeout_ms),
        );

        self.ctx.cancel.sleep(delay).await?;
        let start = Instant::now();
        loop {
            if self.table.is_my_turn()? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                warn!("Still not our turn after {:?}, carrying on", timeout);
                return Ok(());
            }
            self.ctx.cancel.sleep(poll).await?;
        }
    }

    /// Poll until the opponent has acted and the round has settled. No upper bound.
    async fn wait_for_opponent(&mut self) -> Result<(), Interrupt> {
        let poll = ms(self.config.timings.turn_poll_interval_ms);
        info!("Waiting for the opponent");
        while !self.table.opponent_settled()? {
            self.ctx.cancel.sleep(poll).await?;
        }
        Ok(())
    }

    async fn wait_for_reroll(&mut self) -> Result<(), Interrupt> {
        let timings = &self.config.timings;
        let (poll, timeout) = (
            ms(timings.turn_poll_interval_ms),
            ms(timings.reroll_ready_timeout_ms),
        );

        let start = Instant::now();
        while !self.table.reroll_ready()? {
            if start.elapsed() >= timeout {
                warn!("Reroll screen not recognised, rerolling anyway");
                return Ok(());
            }
            self.ctx.cancel.sleep(poll).await?;
        }
        Ok(())
    }
}

/// A command is skipped when its character is defeated or disabled, or when
/// the active character is disabled and the command belongs to someone else.
fn is_eligible(
    model: &DuelModel,
    command: &ActionCommand,
    active: usize,
    active_disabled: bool,
) -> bool {
    let Some(character) = model.character(command.character) else {
        return false;
    };
    if character.is_unavailable() {
        return false;
    }
    !(active_disabled && command.character != active)
}
