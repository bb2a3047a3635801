//! Background job scheduling.
//!
//! Each registered job runs in its own task, sleeping until its next slot.
//! Interval jobs count from process start; report jobs fire on wall-clock
//! calendar slots so a restart never delays or skips them.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use domain::models::RelativeWindow;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// When a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Every N seconds.
    Seconds(u64),
    /// Every hour.
    Hourly,
    /// At `hour`:00 UTC on Sundays (weekly), the 1st of the month (monthly)
    /// or January 1st (yearly).
    Calendar { period: RelativeWindow, hour: u32 },
}

impl JobFrequency {
    /// How long to wait from `now` until the next run, or `None` when no
    /// next run can be computed.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Option<Duration> {
        match *self {
            JobFrequency::Seconds(secs) => Some(Duration::from_secs(secs)),
            JobFrequency::Hourly => Some(Duration::from_secs(3600)),
            JobFrequency::Calendar { period, hour } => {
                let next = next_report_time(period, hour, now)?;
                (next - now).to_std().ok()
            }
        }
    }
}

/// First report slot for `period` strictly after `now`.
pub fn next_report_time(
    period: RelativeWindow,
    hour: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let today = now.date_naive();

    let (current, following) = match period {
        RelativeWindow::Weekly => {
            let since_sunday = u64::from(today.weekday().num_days_from_sunday());
            let sunday = today.checked_sub_days(Days::new(since_sunday))?;
            (sunday, sunday.checked_add_days(Days::new(7))?)
        }
        RelativeWindow::Monthly => {
            let first = today.with_day(1)?;
            (first, first.checked_add_months(Months::new(1))?)
        }
        RelativeWindow::Yearly => (
            NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)?,
        ),
    };

    let slot = current.and_time(at).and_utc();
    if slot > now {
        Some(slot)
    } else {
        Some(following.and_time(at).and_utc())
    }
}

/// A unit of background work.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn frequency(&self) -> JobFrequency;

    /// Runs once. An error is logged and the job stays scheduled.
    async fn execute(&self) -> Result<(), String>;
}

/// Runs registered jobs until shutdown is signalled.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    /// Spawns one task per registered job. Nothing runs until its first slot.
    pub fn start(&mut self) {
        info!(jobs = self.jobs.len(), "Starting job scheduler");

        for job in &self.jobs {
            let handle = tokio::spawn(run_job(Arc::clone(job), self.shutdown_rx.clone()));
            self.handles.push(handle);
        }
    }

    /// Signals every job to stop. Returns immediately.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits up to `timeout` for running jobs to finish.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        let all_done = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };

        match tokio::time::timeout(timeout, all_done).await {
            Ok(()) => info!("All jobs stopped"),
            Err(_) => warn!(timeout = ?timeout, "Job shutdown timed out"),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
    let name = job.name();
    let frequency = job.frequency();
    info!(job = name, frequency = ?frequency, "Job scheduled");

    loop {
        let Some(delay) = frequency.delay_from(Utc::now()) else {
            error!(job = name, frequency = ?frequency, "No next run time; job stopped");
            return;
        };
        debug!(job = name, delay_secs = delay.as_secs(), "Waiting for next run");

        tokio::select! {
            _ = tokio::time::sleep(delay) => run_once(job.as_ref()).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(job = name, "Job shutting down");
                    return;
                }
            }
        }
    }
}

async fn run_once(job: &dyn Job) {
    let name = job.name();
    let started = Instant::now();

    let outcome = match job.execute().await {
        Ok(()) => {
            info!(job = name, elapsed_ms = started.elapsed().as_millis(), "Job completed");
            "success"
        }
        Err(e) => {
            error!(
                job = name,
                elapsed_ms = started.elapsed().as_millis(),
                error = %e,
                "Job failed"
            );
            "failure"
        }
    };
    counter!("scheduled_job_runs_total", "job" => name, "outcome" => outcome).increment(1);
}
