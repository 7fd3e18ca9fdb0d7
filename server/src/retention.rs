//! Periodic telemetry retention sweep

use crate::telemetry::TelemetryAggregator;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Purges telemetry older than the retention period on a fixed interval
pub struct RetentionSweeper {
    telemetry: TelemetryAggregator,
    days: u32,
    every: Duration,
}

impl RetentionSweeper {
    pub fn new(telemetry: TelemetryAggregator, days: u32, every: Duration) -> Self {
        Self {
            telemetry,
            days,
            every,
        }
    }

    /// Run one sweep; failures are logged and left for the next tick
    pub async fn sweep(&self) -> usize {
        match self.telemetry.purge_older_than(self.days).await {
            Ok(removed) => {
                debug!(removed, days = self.days, "retention sweep done");
                removed
            }
            Err(e) => {
                warn!(error = %e, "retention sweep failed");
                0
            }
        }
    }

    /// Sweep until shutdown is signalled. The first sweep runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.days == 0 {
            info!("telemetry retention disabled");
            return;
        }

        info!(
            days = self.days,
            interval_secs = self.every.as_secs(),
            "retention sweeper started"
        );

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    info!("retention sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use dronepost_shared::limits::MS_PER_DAY;
    use dronepost_shared::{now_ms, NewTelemetry};

    #[tokio::test]
    async fn test_sweep_removes_expired_samples() {
        let telemetry = TelemetryAggregator::new(Store::in_memory().telemetry);
        let mut old = NewTelemetry::at("drone_01", 1.0, 1.0, 10.0);
        old.timestamp = Some(now_ms() - 10 * MS_PER_DAY);
        telemetry.ingest(old).await.unwrap();
        telemetry
            .ingest(NewTelemetry::at("drone_01", 1.0, 1.0, 10.0))
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(telemetry.clone(), 7, Duration::from_secs(60));
        assert_eq!(sweeper.sweep().await, 1);
        assert_eq!(sweeper.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let telemetry = TelemetryAggregator::new(Store::in_memory().telemetry);
        let sweeper = RetentionSweeper::new(telemetry, 30, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move { sweeper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
