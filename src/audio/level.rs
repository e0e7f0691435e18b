// Input level meter
//
// Polls the capture level tap on a fixed cadence while capture is active
// and reports a percentage. Best-effort: it never blocks and never fails.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::backend::LevelTap;

/// Default polling cadence (~60 frames per second)
pub const DEFAULT_LEVEL_INTERVAL: Duration = Duration::from_millis(16);

pub struct LevelMeter {
    task: JoinHandle<()>,
}

impl LevelMeter {
    /// Start polling `tap`, calling `report` with a percentage whenever it changes.
    pub fn spawn<F>(tap: LevelTap, interval: Duration, report: F) -> Self
    where
        F: Fn(f32) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<f32> = None;

            loop {
                ticker.tick().await;
                if !tap.is_active() {
                    break;
                }

                let percentage = tap.level() * 100.0;
                if last != Some(percentage) {
                    last = Some(percentage);
                    report(percentage);
                }
            }
        });

        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for LevelMeter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
