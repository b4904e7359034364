//! Dispatch and reconciliation passes over the job queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use futures_util::TryStreamExt;
use tracing::{debug, error, info, warn};

use tidings_core::{Identifier, Value};
use tidings_store::{Conditions, Filter, Repository};

use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::job::{Job, JobQueue, JobStatus, JobType};
use crate::message::MessageService;
use crate::user::User;

/// Jobs are pulled from the store in groups of this size per dispatch pass.
const DISPATCH_BATCH: usize = 5;

const MESSAGE_TITLE: &str = "Happy Birthday";

/// Drives the periodic dispatch and reconciliation passes.
///
/// Both passes are written to be safe to re-run: dispatch only advances jobs
/// that are still open, and reconciliation only compacts jobs already marked
/// `Success`.
pub struct Scheduler {
    queue: JobQueue,
    users: Repository<User>,
    messages: MessageService,
    config: AppConfig,
}

impl Scheduler {
    pub async fn open(
        store: Arc<dyn tidings_store::DocumentStore>,
        queue: JobQueue,
        messages: MessageService,
        config: AppConfig,
    ) -> Result<Self, tidings_store::StoreError> {
        Ok(Self {
            queue,
            users: Repository::open(store).await?,
            messages,
            config,
        })
    }

    /// Deliver every open job due within the current hour.
    ///
    /// "Due" means `due_date <= end of the current hour minus one minute`, so
    /// a pass running at 08:00 already covers jobs due at 08:59. Failed jobs
    /// match again on the next pass.
    pub async fn dispatch_pass(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let window_end = now
            .with_minute(59)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let filter = Filter::new()
            .field("job_type", JobType::SendBirthdayMessage.as_str())
            .where_field("due_date", Conditions::lesser_than_or_equal(window_end))
            .where_field(
                "status",
                Conditions::any_of([
                    Value::text(JobStatus::Pending.as_str()),
                    Value::text(JobStatus::Failed.as_str()),
                ]),
            );

        let due_jobs = self.queue.find(filter).await?;
        if due_jobs.is_empty() {
            debug!("dispatch pass found no due jobs");
            return Ok(());
        }
        info!(jobs = due_jobs.len(), "dispatching due birthday jobs");

        for batch in due_jobs.chunks(DISPATCH_BATCH) {
            let results =
                futures_util::future::join_all(batch.iter().map(|job| self.dispatch_job(job, now)))
                    .await;
            for result in results {
                result?;
            }
        }
        Ok(())
    }

    /// Run one job to completion: deliver to every member, then mark the job
    /// `Success`, or `Failed` with the first error's text.
    async fn dispatch_job(&self, job: &Job, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if job.users.is_empty() {
            debug!(job = %job.id, "skipping job with no remaining users");
            return Ok(());
        }

        self.queue.mark_processing(job.id, now).await?;

        let members = self
            .users
            .find(Filter::new().id_where(Conditions::any_of(job.users.clone())))
            .await?;

        let outcome = futures_util::stream::iter(members.into_iter().map(Ok))
            .try_for_each_concurrent(self.config.worker_concurrency, |user| {
                self.deliver_to(user, now)
            })
            .await;

        match outcome {
            Ok(()) => {
                self.queue.mark_success(job.id, now).await?;
                info!(job = %job.id, "job completed");
            }
            Err(err) => {
                warn!(job = %job.id, error = %err, "job failed; will retry next pass");
                self.queue.mark_failed(job.id, &err.to_string(), now).await?;
            }
        }
        Ok(())
    }

    /// Send to one user unless a message already reached them this calendar
    /// year; re-running a job after a partial failure must not double-send.
    async fn deliver_to(&self, user: User, now: DateTime<Utc>) -> Result<(), ServiceError> {
        use chrono::Datelike;

        let already_sent = self
            .messages
            .sent_to(user.id)
            .await?
            .iter()
            .any(|m| m.created_at.year() == now.year());
        if already_sent {
            debug!(user = %user.id, "greeting already sent this year");
            return Ok(());
        }

        self.messages
            .send_birthday_message(user.id, &user.full_name(), MESSAGE_TITLE, now)
            .await?;
        Ok(())
    }

    /// Compact the archive: merge `Success` jobs sharing an exact due date
    /// into one job, and sweep open jobs whose user set drained to empty.
    ///
    /// Only jobs due before the start of the current UTC day are touched, so
    /// the day still in flight is never compacted under a running dispatch.
    pub async fn reconcile_pass(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let day_start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
        let succeeded = self
            .queue
            .find(
                Filter::new()
                    .field("job_type", JobType::SendBirthdayMessage.as_str())
                    .field("status", JobStatus::Success.as_str())
                    .where_field("due_date", Conditions::lesser_than_or_equal(day_start)),
            )
            .await?;

        let mut groups: BTreeMap<DateTime<Utc>, Vec<Job>> = BTreeMap::new();
        for job in succeeded {
            groups.entry(job.due_date).or_default().push(job);
        }

        for (due_date, jobs) in groups {
            if jobs.len() < 2 {
                continue;
            }
            let mut users: Vec<Identifier> = Vec::new();
            let mut originals: Vec<Identifier> = Vec::new();
            for job in jobs {
                originals.push(job.id);
                for user in job.users {
                    if !users.contains(&user) {
                        users.push(user);
                    }
                }
            }
            info!(%due_date, merged = originals.len(), "merging completed jobs");
            // Insert the merged record first so a crash between the two
            // writes duplicates history instead of losing it.
            self.queue.record_merged_success(due_date, users, now).await?;
            self.queue
                .delete(Filter::new().id_where(Conditions::any_of(originals)))
                .await?;
        }

        self.sweep_drained_jobs(now).await
    }

    /// Delete open jobs whose user set is empty; cancellation leaves these
    /// behind rather than racing deletion against dispatch.
    async fn sweep_drained_jobs(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let open = self
            .queue
            .find(
                Filter::new()
                    .field("job_type", JobType::SendBirthdayMessage.as_str())
                    .where_field(
                        "status",
                        Conditions::any_of([
                            Value::text(JobStatus::Pending.as_str()),
                            Value::text(JobStatus::Failed.as_str()),
                        ]),
                    )
                    .where_field("due_date", Conditions::lesser_than_or_equal(now)),
            )
            .await?;

        for job in open.into_iter().filter(|j| j.users.is_empty()) {
            debug!(job = %job.id, "sweeping drained job");
            self.queue.delete(job.id).await?;
        }
        Ok(())
    }

    /// Run both passes on their configured intervals until `shutdown`
    /// signals. Pass errors are logged and do not stop the loops.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut dispatch = tokio::time::interval(self.config.dispatch_interval);
        let mut reconcile = tokio::time::interval(self.config.reconcile_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    return;
                }
                _ = dispatch.tick() => {
                    if let Err(err) = self.dispatch_pass(Utc::now()).await {
                        error!(error = %err, "dispatch pass failed");
                    }
                }
                _ = reconcile.tick() => {
                    if let Err(err) = self.reconcile_pass(Utc::now()).await {
                        error!(error = %err, "reconciliation pass failed");
                    }
                }
            }
        }
    }
}
