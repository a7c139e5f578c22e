//! Per-module cycle timers
//!
//! Each module gets one task that sleeps until the module's next trigger and
//! spawns the cycle run with the trigger instant as reference time, so a run
//! always evaluates the window that closed at that instant. A trigger that
//! finds the module's previous run still active is skipped; the runner refuses
//! overlapping runs on its own as well.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::contest::{CycleRunner, ModuleRegistry, PeriodCalculator};
use crate::error::ContestResult;
use crate::models::ModuleConfig;

/// Next trigger strictly after both `now` and the last fired trigger
fn next_fire(
    calc: &PeriodCalculator,
    now: DateTime<Utc>,
    last: Option<DateTime<Utc>>,
) -> ContestResult<DateTime<Utc>> {
    let from = last.map_or(now, |last| last.max(now));
    calc.next_trigger(&from)
}

pub struct Scheduler {
    registry: Arc<ModuleRegistry>,
    runner: Arc<CycleRunner>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(registry: Arc<ModuleRegistry>, runner: Arc<CycleRunner>) -> Self {
        Self {
            registry,
            runner,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn one timer task per module with a usable schedule
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for module in self.registry.iter() {
            let calc = match PeriodCalculator::for_module(module) {
                Ok(calc) => calc,
                Err(e) => {
                    log::error!("{} Not scheduling module: {}", module.tag("run"), e);
                    continue;
                }
            };

            handles.push(tokio::spawn(run_timer(
                module.clone(),
                calc,
                self.runner.clone(),
                self.shutdown.clone(),
            )));
        }
        log::info!("Scheduled {} of {} modules", handles.len(), self.registry.len());
        handles
    }

    /// Stop every timer; cycles already running finish on their own
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

async fn run_timer(
    module: Arc<ModuleConfig>,
    calc: PeriodCalculator,
    runner: Arc<CycleRunner>,
    shutdown: CancellationToken,
) {
    let tag = module.tag("run");

    tokio::select! {
        _ = shutdown.cancelled() => return,
        result = runner.warm_up(&module, Utc::now()) => {
            if let Err(e) = result {
                log::warn!("{} Warm-up failed: {}", tag, e);
            }
        }
    }

    let mut last: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        let trigger = match next_fire(&calc, now, last) {
            Ok(trigger) => trigger,
            Err(e) => {
                log::error!("{} Stopping timer: {}", tag, e);
                return;
            }
        };
        log::debug!("{} Next run at {}", tag, trigger);

        let wait = (trigger - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::debug!("{} Timer stopped", tag);
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        last = Some(trigger);

        if runner.is_running(&module.id) {
            log::info!("{} Previous run still active, skipping trigger {}", tag, trigger);
            continue;
        }

        let runner = runner.clone();
        let module = module.clone();
        let tag = tag.clone();
        tokio::spawn(async move {
            match runner.run_cycle(&module, trigger).await {
                Ok(outcome) => log::debug!("{} Cycle finished: {:?}", tag, outcome),
                Err(e) if e.is_fatal() => log::error!("{} Cycle failed: {}", tag, e),
                Err(e) if e.is_transient() => log::warn!("{} Cycle interrupted: {}", tag, e),
                Err(e) => log::warn!("{} Cycle failed: {}", tag, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::registry::fixtures::module;
    use crate::contest::testing::FakeStore;
    use crate::db::Database;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn test_next_fire_never_repeats_a_trigger() {
        let calc = PeriodCalculator::new("0 0 * * *", "UTC").unwrap();
        let trigger = Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap();

        // Woken a moment early: the fired trigger is not returned again
        let early = trigger - chrono::Duration::milliseconds(5);
        assert_eq!(next_fire(&calc, early, None).unwrap(), trigger);
        assert_eq!(
            next_fire(&calc, early, Some(trigger)).unwrap(),
            trigger + chrono::Duration::days(1)
        );
    }

    #[tokio::test]
    async fn test_start_skips_bad_schedules_and_stops() {
        let mut broken = module("broken");
        broken.source_channel_id = "elsewhere".to_string();
        broken.timezone = "Nowhere/City".to_string();
        let registry = Arc::new(ModuleRegistry::new(vec![module("cotw"), broken]).unwrap());

        let db = Arc::new(Database::in_memory().unwrap());
        let runner = Arc::new(CycleRunner::new(db, Arc::new(FakeStore::default())));
        let scheduler = Scheduler::new(registry, runner);

        let handles = scheduler.start();
        assert_eq!(handles.len(), 1);

        scheduler.stop();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
