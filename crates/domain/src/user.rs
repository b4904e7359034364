//! Users and the registration/removal flow.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use tidings_core::{IdGenerator, IdKind, Identifier, Record, Value};
use tidings_store::{DocumentStore, Persistable, Repository, StoreError, Target};

use crate::error::ServiceError;
use crate::fields;
use crate::job::JobQueue;

/// A registered user.
///
/// Name, birth date and timezone are immutable after creation in current
/// flows; only lifecycle timestamps change.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Identifier,
    pub first_name: String,
    pub last_name: String,
    pub location: String,
    pub date_of_birth: DateTime<Utc>,
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Persistable for User {
    const COLLECTION: &'static str = "users";

    fn into_record(self) -> Record {
        let mut rec = Record::new();
        rec.insert("id".into(), Value::Id(self.id));
        rec.insert("first_name".into(), Value::Text(self.first_name));
        rec.insert("last_name".into(), Value::Text(self.last_name));
        rec.insert("location".into(), Value::Text(self.location));
        rec.insert("date_of_birth".into(), Value::Timestamp(self.date_of_birth));
        rec.insert("time_zone".into(), Value::Text(self.time_zone));
        rec.insert("created_at".into(), Value::Timestamp(self.created_at));
        if let Some(ts) = self.updated_at {
            rec.insert("updated_at".into(), Value::Timestamp(ts));
        }
        rec
    }

    fn from_record(mut record: Record) -> Result<Self, StoreError> {
        Ok(Self {
            id: fields::take_id(&mut record, "id")?,
            first_name: fields::take_text(&mut record, "first_name")?,
            last_name: fields::take_text(&mut record, "last_name")?,
            location: fields::take_text(&mut record, "location")?,
            date_of_birth: fields::take_timestamp(&mut record, "date_of_birth")?,
            time_zone: fields::take_text(&mut record, "time_zone")?,
            created_at: fields::take_timestamp(&mut record, "created_at")?,
            updated_at: fields::opt_timestamp(&mut record, "updated_at"),
        })
    }
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub location: String,
    pub date_of_birth: DateTime<Utc>,
}

/// This year's due moment for a birthday: the birth month/day at the
/// scheduled local hour in the user's zone, converted to UTC.
///
/// Feb 29 clamps to Feb 28 in non-leap years; when the scheduled local hour
/// falls into a DST gap or fold, the earliest valid interpretation wins.
pub fn yearly_due_date(
    date_of_birth: DateTime<Utc>,
    zone: Tz,
    year: i32,
    hour: u32,
) -> Result<DateTime<Utc>, ServiceError> {
    let local_birth = date_of_birth.with_timezone(&zone);
    let (month, mut day) = (local_birth.month(), local_birth.day());
    if month == 2 && day == 29 && !is_leap_year(year) {
        day = 28;
    }

    zone.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            ServiceError::Domain(tidings_core::DomainError::validation(format!(
                "no valid local time for {year}-{month:02}-{day:02} {hour:02}:00 in {zone}"
            )))
        })
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// User lifecycle operations, wired to the job queue.
#[derive(Clone)]
pub struct UserService {
    users: Repository<User>,
    queue: JobQueue,
    resolver: Arc<dyn super::timezone::TimezoneResolver>,
    ids: Arc<IdGenerator>,
    schedule_hour: u32,
}

impl UserService {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        queue: JobQueue,
        resolver: Arc<dyn super::timezone::TimezoneResolver>,
        ids: Arc<IdGenerator>,
        schedule_hour: u32,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            users: Repository::open(store).await?,
            queue,
            resolver,
            ids,
            schedule_hour,
        })
    }

    /// Register a user and enqueue their birthday job for this year.
    pub async fn register(
        &self,
        input: NewUser,
        now: DateTime<Utc>,
    ) -> Result<User, ServiceError> {
        let Some(zone) = self.resolver.resolve(&input.location) else {
            return Err(ServiceError::UnsupportedLocation(input.location));
        };

        let due_date = yearly_due_date(input.date_of_birth, zone, now.year(), self.schedule_hour)?;

        let user = User {
            id: self.ids.generate(IdKind::User),
            first_name: input.first_name,
            last_name: input.last_name,
            location: input.location,
            date_of_birth: input.date_of_birth,
            time_zone: zone.name().to_owned(),
            created_at: now,
            updated_at: None,
        };
        self.users.create(user.clone()).await?;
        self.queue.enqueue(user.id, due_date, now).await?;
        Ok(user)
    }

    /// Remove a user, cancelling their open birthday job entry first.
    pub async fn remove(&self, id: Identifier, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if let Some(user) = self.users.find_one(id).await? {
            match user.time_zone.parse::<Tz>() {
                Ok(zone) => {
                    let due_date =
                        yearly_due_date(user.date_of_birth, zone, now.year(), self.schedule_hour)?;
                    self.queue.cancel(user.id, due_date, now).await?;
                }
                Err(_) => {
                    warn!(user = %user.id, zone = %user.time_zone, "stored timezone no longer parses; skipping job cancellation");
                }
            }
        }
        self.users.delete(id).await?;
        Ok(())
    }

    pub async fn find(&self, target: impl Into<Target>) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.find(target).await?)
    }

    pub async fn find_one(&self, target: impl Into<Target>) -> Result<Option<User>, ServiceError> {
        Ok(self.users.find_one(target).await?)
    }
}
