use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::processor::ExecutionProcessor;

/// Owns the periodic timer that drives [`ExecutionProcessor::run_tick`].
pub struct SchedulerRuntime {
    processor: Arc<ExecutionProcessor>,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SchedulerRuntime {
    pub fn new(processor: Arc<ExecutionProcessor>) -> Self {
        Self {
            processor,
            notify: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts the tick loop. The first pass runs immediately. Calling `start`
    /// on a running runtime does nothing.
    pub fn start(&mut self, interval: Duration) {
        if self.worker.is_some() {
            return;
        }

        let period = interval.max(Duration::from_millis(1));
        let processor = self.processor.clone();
        let notify = self.notify.clone();
        let shutting_down = self.shutting_down.clone();

        info!(interval_secs = period.as_secs_f64(), "starting scheduler loop");
        self.worker = Some(tokio::spawn(async move {
            tick_loop(processor, period, notify, shutting_down).await;
        }));
    }

    /// Stops the timer and waits for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        self.shutting_down.store(true, Ordering::Release);
        self.notify.notify_one();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                error!("scheduler loop crashed: {:?}", err);
            }
        }
        info!("scheduler loop stopped");
    }
}

async fn tick_loop(
    processor: Arc<ExecutionProcessor>,
    period: Duration,
    notify: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = notify.notified() => {}
        }

        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        match processor.run_tick().await {
            Ok(report) if report.skipped => debug!("tick skipped; pass already running"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "scheduler pass failed"),
        }
    }
}
