//! Stage side of the panel: the fixed-rate jog/position poll and user actions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::StageConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::{PulseVector, SharedStage};
use crate::stage::{
    AxisPosition, EmergencyStop, JogButtons, StageJogController, StageMoveController,
};
use crate::status::StatusBoard;

/// Owns the stage controllers and the poll task driving them.
pub struct StagePanel {
    buttons: JogButtons,
    estop: EmergencyStop,
    motion: Arc<Mutex<StageMoveController>>,
    status: StatusBoard,
    stop_on_shutdown: bool,
    poll_task: Option<JoinHandle<()>>,
}

impl StagePanel {
    /// Build the controllers and start polling at `config.poll_interval()`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        stage: SharedStage,
        config: &StageConfig,
        status: StatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> AppResult<Self> {
        let calibration = config.calibration()?;
        let buttons = JogButtons::new();
        let jog = StageJogController::new(Arc::clone(&stage));
        let motion = Arc::new(Mutex::new(StageMoveController::new(
            Arc::clone(&stage),
            calibration,
        )));

        let poll_task = tokio::spawn(run_stage_loop(
            jog,
            Arc::clone(&motion),
            buttons.clone(),
            status.clone(),
            config.poll_interval(),
            shutdown,
        ));

        Ok(Self {
            buttons,
            estop: EmergencyStop::new(stage),
            motion,
            status,
            stop_on_shutdown: config.stop_on_shutdown,
            poll_task: Some(poll_task),
        })
    }

    /// Handle for the presentation layer to report jog button presses.
    pub fn buttons(&self) -> JogButtons {
        self.buttons.clone()
    }

    pub fn emergency_stop_handle(&self) -> EmergencyStop {
        self.estop.clone()
    }

    /// Stop the stage now, without waiting for the next tick.
    pub async fn emergency_stop(&self) -> AppResult<()> {
        let result = self.estop.trigger().await;
        match &result {
            Ok(()) => self.status.set_message("emergency stop"),
            Err(err) => self.status.set_message(format!("emergency stop failed: {err}")),
        }
        result
    }

    pub async fn positions(&self) -> (AxisPosition, AxisPosition, AxisPosition) {
        let motion = self.motion.lock().await;
        (motion.start(), motion.current(), motion.goal())
    }

    pub async fn set_start(&self) -> AxisPosition {
        let start = self.motion.lock().await.set_start();
        self.status.update(|s| s.start = start);
        start
    }

    pub async fn set_goal(&self) -> AxisPosition {
        let goal = self.motion.lock().await.set_goal();
        self.status.update(|s| s.goal = goal);
        goal
    }

    pub async fn move_to(&self, x: f64, y: f64, z: f64) -> AppResult<PulseVector> {
        self.motion.lock().await.move_to(x, y, z).await
    }

    /// Move using the raw text of the three coordinate entries.
    pub async fn move_to_input(&self, x: &str, y: &str, z: &str) -> AppResult<PulseVector> {
        self.motion.lock().await.move_to_input(x, y, z).await
    }

    pub async fn move_to_start(&self) -> AppResult<PulseVector> {
        self.motion.lock().await.move_to_start().await
    }

    pub async fn move_to_goal(&self) -> AppResult<PulseVector> {
        self.motion.lock().await.move_to_goal().await
    }

    pub async fn step(&self, current_step: u32, num_steps: u32) -> AppResult<PulseVector> {
        self.motion.lock().await.step(current_step, num_steps).await
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the poll task to end (the shutdown signal must already be sent),
    /// then stop the stage if configured to.
    ///
    /// The final stop is sent even when the poll task panicked; both failures
    /// are returned together.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        let mut errors = Vec::new();

        if let Some(handle) = self.poll_task.take() {
            if let Err(err) = handle.await {
                error!(error = %err, "stage poll task ended abnormally");
                errors.push(DaqError::from(err));
            }
        }
        if self.stop_on_shutdown {
            if let Err(err) = self.estop.trigger().await {
                errors.push(err);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(DaqError::ShutdownFailed(errors)),
        }
    }
}

/// One tick: jog edge detection first, then position refresh.
///
/// Uses [`MissedTickBehavior::Delay`] so a late tick never causes a burst of
/// catch-up ticks that would sample the buttons twice in a row.
pub async fn run_stage_loop(
    mut jog: StageJogController,
    motion: Arc<Mutex<StageMoveController>>,
    buttons: JogButtons,
    status: StatusBoard,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        ticks += 1;

        match jog.tick(buttons.snapshot()).await {
            Ok(commands) if !commands.is_empty() => debug!(tick = ticks, ?commands, "jog"),
            Ok(_) => {}
            Err(err) => {
                warn!(tick = ticks, error = %err, "jog tick failed");
                status.set_message(format!("stage error: {err}"));
            }
        }

        let refreshed = motion.lock().await.refresh_current_position().await;
        match refreshed {
            Ok(current) => status.update(|s| s.current = current),
            Err(err) => {
                warn!(tick = ticks, error = %err, "position refresh failed");
                status.set_message(format!("stage error: {err}"));
            }
        }
    }

    info!(ticks, "stage poll stopped");
}
