use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;
use tracing::info;

use gitcg_data::DuelConfig;
use gitcg_state::DuelModel;
use gitcg_vision::Overlay;

use crate::cancel::{cancel_pair, CancelHandle};
use crate::duel::{DuelContext, DuelController, DuelOutcome, DuelStatus, TaskScheduler};
use crate::table::DuelTable;

/// Runs one duel on its own thread and exposes its status to the caller
pub struct Pipeline {
    cancel: CancelHandle,
    status_rx: watch::Receiver<DuelStatus>,
    worker: JoinHandle<DuelOutcome>,
}

impl Pipeline {
    /// Start the duel and return immediately. The duel thread drives a
    /// current-thread runtime until the duel terminates.
    pub fn start<T>(
        table: T,
        model: DuelModel,
        config: DuelConfig,
        overlay: Arc<dyn Overlay>,
        scheduler: Option<Arc<dyn TaskScheduler>>,
    ) -> Result<Self>
    where
        T: DuelTable + 'static,
    {
        let (cancel, signal) = cancel_pair();
        let (status_tx, status_rx) = watch::channel(DuelStatus::Idle);
        let mut ctx = DuelContext::new(signal)
            .with_overlay(overlay)
            .with_status(status_tx);
        if let Some(scheduler) = scheduler {
            ctx = ctx.with_scheduler(scheduler);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to build the duel runtime")?;
        let queued = model.action_command_queue.len();
        let worker = std::thread::Builder::new()
            .name("duel".to_string())
            .spawn(move || runtime.block_on(DuelController::new(table, model, config, ctx).run()))
            .context("failed to spawn the duel thread")?;

        info!("Pipeline started ({} command(s) queued)", queued);
        Ok(Self {
            cancel,
            status_rx,
            worker,
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        info!("Pipeline stop requested");
    }

    pub fn status(&self) -> DuelStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Wait for the duel thread and return how the duel ended
    pub fn join(self) -> Result<DuelOutcome> {
        self.worker
            .join()
            .map_err(|_| anyhow!("duel thread panicked"))
    }
}
