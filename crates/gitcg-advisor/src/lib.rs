use gitcg_data::{DuelTimings, ElementalType};
use gitcg_state::{Action, ActionCommand, DuelModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Observed and computed dice counts may differ by this much before
/// the observation is treated as OCR noise.
pub const DICE_TRUST_MARGIN: i32 = 2;

/// Dice elements worth keeping on reroll, given the queue and the dice budget.
/// Always contains `Omni`.
pub fn predict_dice_types(model: &DuelModel) -> BTreeSet<ElementalType> {
    let budget = i64::from(model.current_dice_count);
    let queue = &model.action_command_queue;
    let mut spent: i64 = 0;
    let mut elements = BTreeSet::from([ElementalType::Omni]);

    for (i, command) in queue.iter().enumerate() {
        let defeated = model
            .character(command.character)
            .map_or(false, |c| c.is_defeated);
        if defeated {
            continue;
        }

        if i > 0 && queue[i - 1].character != command.character {
            spent += 1;
            if spent > budget {
                break;
            }
            elements.insert(command.element());
        }

        spent += i64::from(command.dice_cost());
        if spent > budget {
            break;
        }
        elements.insert(command.element());
    }

    debug!(
        "Predicted dice {:?} for budget {} over {} commands",
        elements,
        budget,
        queue.len()
    );
    elements
}

/// How an OCR dice reading was merged into the computed count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiceVerdict {
    Unchanged,
    Adjusted,
    Distrusted,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub value: i32,
    pub verdict: DiceVerdict,
}

/// Small differences come from field effects and are trusted. Large ones are noise.
pub fn reconcile_dice_count(computed: i32, observed: Option<i32>) -> Reconciliation {
    let Some(observed) = observed else {
        return Reconciliation {
            value: computed,
            verdict: DiceVerdict::Unavailable,
        };
    };

    let diff = (computed - observed).abs();
    if diff == 0 {
        Reconciliation {
            value: computed,
            verdict: DiceVerdict::Unchanged,
        }
    } else if diff <= DICE_TRUST_MARGIN {
        Reconciliation {
            value: observed,
            verdict: DiceVerdict::Adjusted,
        }
    } else {
        Reconciliation {
            value: computed,
            verdict: DiceVerdict::Distrusted,
        }
    }
}

/// Hand size at the start of a round: 5 dealt on round 1, 2 drawn every round after
pub fn card_count_for_round(round: u32, previous: i32) -> i32 {
    if round <= 1 {
        5
    } else {
        previous + 2
    }
}

/// Time to allow for animations after the commands executed in one tick
pub fn compute_wait_time(
    executed: &[ActionCommand],
    model: &DuelModel,
    quick_switch_characters: &[String],
    timings: &DuelTimings,
) -> Duration {
    if executed.iter().any(ActionCommand::is_burst) {
        return Duration::from_millis(timings.burst_wait_ms);
    }

    let quick_switch = executed.iter().any(|command| {
        matches!(command.action, Action::SwitchTo { .. })
            && model
                .character(command.character)
                .map_or(false, |c| quick_switch_characters.contains(&c.name))
    });
    if quick_switch {
        return Duration::from_millis(timings.quick_switch_wait_ms);
    }

    Duration::from_millis(timings.default_wait_ms)
}
