//! Jobs: due-date-keyed batches of users awaiting a birthday message.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tidings_core::{IdGenerator, IdKind, Identifier, Record, Value};
use tidings_store::{
    Conditions, DocumentStore, Filter, IndexSpec, Persistable, Repository, StoreError, Target,
};

use crate::error::ServiceError;
use crate::fields;

/// Job kind. One variant today; the wire form is kept stable for the stored
/// documents' sake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    SendBirthdayMessage,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::SendBirthdayMessage => "SEND_BIRTHDAY_MESSAGE",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "SEND_BIRTHDAY_MESSAGE" => Ok(JobType::SendBirthdayMessage),
            other => Err(StoreError::Corrupt(format!("unknown job type `{other}`"))),
        }
    }
}

/// Job lifecycle status.
///
/// `Pending → Processing → {Success, Failed}`; a `Failed` job is picked up
/// again by the next dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(StoreError::Corrupt(format!("unknown job status `{other}`"))),
        }
    }
}

/// One recurring per-user job, batching every user that shares a due date.
///
/// `users` is a set semantically: duplicate insertion is a no-op, removal
/// deletes one member by identity equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Identifier,
    pub job_type: JobType,
    pub status: JobStatus,
    pub due_date: DateTime<Utc>,
    pub users: Vec<Identifier>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub succeeded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Persistable for Job {
    const COLLECTION: &'static str = "jobs";

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::ascending(&["job_type", "due_date", "status"])]
    }

    fn into_record(self) -> Record {
        let mut rec = Record::new();
        rec.insert("id".into(), Value::Id(self.id));
        rec.insert("job_type".into(), Value::text(self.job_type.as_str()));
        rec.insert("status".into(), Value::text(self.status.as_str()));
        rec.insert("due_date".into(), Value::Timestamp(self.due_date));
        rec.insert(
            "users".into(),
            Value::List(self.users.into_iter().map(Value::Id).collect()),
        );
        rec.insert("created_at".into(), Value::Timestamp(self.created_at));
        if let Some(ts) = self.updated_at {
            rec.insert("updated_at".into(), Value::Timestamp(ts));
        }
        if let Some(ts) = self.succeeded_at {
            rec.insert("succeeded_at".into(), Value::Timestamp(ts));
        }
        if let Some(ts) = self.failed_at {
            rec.insert("failed_at".into(), Value::Timestamp(ts));
        }
        if let Some(error) = self.error {
            rec.insert("error".into(), Value::Text(error));
        }
        rec
    }

    fn from_record(mut record: Record) -> Result<Self, StoreError> {
        Ok(Self {
            id: fields::take_id(&mut record, "id")?,
            job_type: JobType::parse(&fields::take_text(&mut record, "job_type")?)?,
            status: JobStatus::parse(&fields::take_text(&mut record, "status")?)?,
            due_date: fields::take_timestamp(&mut record, "due_date")?,
            users: fields::take_id_list(&mut record, "users")?,
            created_at: fields::take_timestamp(&mut record, "created_at")?,
            updated_at: fields::opt_timestamp(&mut record, "updated_at"),
            succeeded_at: fields::opt_timestamp(&mut record, "succeeded_at"),
            failed_at: fields::opt_timestamp(&mut record, "failed_at"),
            error: fields::opt_text(&mut record, "error"),
        })
    }
}

/// Domain operations for the recurring birthday job.
#[derive(Clone)]
pub struct JobQueue {
    jobs: Repository<Job>,
    ids: Arc<IdGenerator>,
}

impl JobQueue {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        ids: Arc<IdGenerator>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            jobs: Repository::open(store).await?,
            ids,
        })
    }

    fn status_list(statuses: &[JobStatus]) -> Vec<Value> {
        statuses.iter().map(|s| Value::text(s.as_str())).collect()
    }

    /// Add `user` to the job batched for `due_date`, creating the job if no
    /// open one exists.
    ///
    /// This is read-then-write, not atomic: two concurrent enqueues for the
    /// same due date can both observe "no job" and create one each, leaving
    /// two open jobs where the invariant wants at most one. Accepted and
    /// documented; the loser's job is still delivered and later compacted by
    /// reconciliation.
    pub async fn enqueue(
        &self,
        user: Identifier,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let filter = Filter::new()
            .field("job_type", JobType::SendBirthdayMessage.as_str())
            .field("due_date", due_date)
            .where_field(
                "status",
                Conditions::any_of(Self::status_list(&[JobStatus::Pending, JobStatus::Failed])),
            );

        if let Some(job) = self.jobs.find_one(filter).await? {
            let mut users = job.users;
            if !users.contains(&user) {
                users.push(user);
            }
            let mut patch = Record::new();
            patch.insert(
                "users".into(),
                Value::List(users.into_iter().map(Value::Id).collect()),
            );
            patch.insert("updated_at".into(), Value::Timestamp(now));
            self.jobs.update(job.id, patch).await?;
            return Ok(());
        }

        self.jobs
            .create(Job {
                id: self.ids.generate(IdKind::Job),
                job_type: JobType::SendBirthdayMessage,
                status: JobStatus::Pending,
                due_date,
                users: vec![user],
                created_at: now,
                updated_at: None,
                succeeded_at: None,
                failed_at: None,
                error: None,
            })
            .await?;
        Ok(())
    }

    /// Remove `user` from the job batched for `due_date`.
    ///
    /// Silently no-ops when no matching job exists or the user is not a
    /// member. Never deletes the job, even when its set becomes empty:
    /// empty-set jobs are skipped by dispatch and swept by reconciliation.
    pub async fn cancel(
        &self,
        user: Identifier,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let filter = Filter::new()
            .field("job_type", JobType::SendBirthdayMessage.as_str())
            .field("due_date", due_date)
            .where_field(
                "status",
                Conditions::none_of(Self::status_list(&[JobStatus::Processing])),
            );

        let Some(job) = self.jobs.find_one(filter).await? else {
            return Ok(());
        };

        let users: Vec<Identifier> = job.users.into_iter().filter(|u| *u != user).collect();
        let mut patch = Record::new();
        patch.insert(
            "users".into(),
            Value::List(users.into_iter().map(Value::Id).collect()),
        );
        patch.insert("updated_at".into(), Value::Timestamp(now));
        self.jobs.update(job.id, patch).await?;
        Ok(())
    }

    pub async fn mark_processing(
        &self,
        id: Identifier,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut patch = Record::new();
        patch.insert("status".into(), Value::text(JobStatus::Processing.as_str()));
        patch.insert("updated_at".into(), Value::Timestamp(now));
        self.jobs.update(id, patch).await?;
        Ok(())
    }

    pub async fn mark_success(
        &self,
        id: Identifier,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut patch = Record::new();
        patch.insert("status".into(), Value::text(JobStatus::Success.as_str()));
        patch.insert("succeeded_at".into(), Value::Timestamp(now));
        self.jobs.update(id, patch).await?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        id: Identifier,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut patch = Record::new();
        patch.insert("status".into(), Value::text(JobStatus::Failed.as_str()));
        patch.insert("failed_at".into(), Value::Timestamp(now));
        patch.insert("error".into(), Value::text(error));
        self.jobs.update(id, patch).await?;
        Ok(())
    }

    /// Insert a merged archival job (used by reconciliation).
    pub async fn record_merged_success(
        &self,
        due_date: DateTime<Utc>,
        users: Vec<Identifier>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.jobs
            .create(Job {
                id: self.ids.generate(IdKind::Job),
                job_type: JobType::SendBirthdayMessage,
                status: JobStatus::Success,
                due_date,
                users,
                created_at: now,
                updated_at: None,
                succeeded_at: None,
                failed_at: None,
                error: None,
            })
            .await?;
        Ok(())
    }

    pub async fn find_one(&self, target: impl Into<Target>) -> Result<Option<Job>, ServiceError> {
        Ok(self.jobs.find_one(target).await?)
    }

    pub async fn find(&self, target: impl Into<Target>) -> Result<Vec<Job>, ServiceError> {
        Ok(self.jobs.find(target).await?)
    }

    pub async fn delete(&self, target: impl Into<Target>) -> Result<(), ServiceError> {
        Ok(self.jobs.delete(target).await?)
    }
}
