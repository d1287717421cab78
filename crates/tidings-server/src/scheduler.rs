use anyhow::Result;
use tidings_alert::{AlertChecker, CheckSummary};
use tokio::time::{interval, Duration, MissedTickBehavior};

pub struct AlertCheckScheduler {
    checker: AlertChecker,
    tick_secs: u64,
}

impl AlertCheckScheduler {
    pub fn new(checker: AlertChecker, tick_secs: u64) -> Self {
        Self { checker, tick_secs }
    }

    pub async fn run(&self) {
        let options = self.checker.options();
        tracing::info!(
            tick_secs = self.tick_secs,
            max_concurrent = options.max_concurrent,
            max_results = options.max_results,
            "Alert check scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.tick_secs.max(1)));
        // a cycle that overruns the period is not made up
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "Alert check cycle failed");
            }
        }
    }

    pub async fn run_once(&self) -> Result<CheckSummary> {
        let summary = self.checker.check_alerts().await?;
        if summary.failed > 0 || summary.emails_failed > 0 {
            tracing::warn!(
                failed = summary.failed,
                emails_failed = summary.emails_failed,
                "Alert check cycle finished with failures"
            );
        }
        Ok(summary)
    }
}
