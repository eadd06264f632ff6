pub mod cancel;
pub mod duel;
pub mod pipeline;
pub mod table;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal, Cancelled};
pub use duel::{
    DuelContext, DuelController, DuelOutcome, DuelPhase, DuelStatus, TaskScheduler,
    TerminationReason, TickRecord, DICE_PER_ROUND,
};
pub use pipeline::Pipeline;
pub use table::{CharacterObservation, DuelTable, ScreenTable};

/// Install the fmt subscriber, filtered by `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoduel=debug,gitcg_vision=debug,gitcg_capture=debug".into()),
        )
        .try_init();
}
