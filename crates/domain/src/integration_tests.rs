//! End-to-end flows over the in-memory store: registration, dispatch,
//! retry, cancellation and reconciliation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use tidings_core::{IdGenerator, Identifier};
use tidings_store::{DocumentStore, Filter, MemoryDocumentStore, Repository};

use crate::config::AppConfig;
use crate::job::{JobQueue, JobStatus};
use crate::message::{Message, MessageService};
use crate::scheduler::Scheduler;
use crate::timezone::TimezoneResolver;
use crate::transport::{DeliveryTransport, TransportError};
use crate::user::{NewUser, UserService};

struct FixedResolver(Tz);

impl TimezoneResolver for FixedResolver {
    fn resolve(&self, _location: &str) -> Option<Tz> {
        Some(self.0)
    }
}

/// Records deliveries; can be primed to fail the next call once.
#[derive(Default)]
struct ScriptedTransport {
    deliveries: Mutex<Vec<(Identifier, String)>>,
    fail_next: Mutex<Option<String>>,
}

impl ScriptedTransport {
    fn delivered(&self) -> Vec<(Identifier, String)> {
        self.deliveries.lock().unwrap().clone()
    }

    fn fail_next(&self, reason: &str) {
        *self.fail_next.lock().unwrap() = Some(reason.to_owned());
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    async fn deliver(&self, recipient: &Identifier, body: &str) -> Result<(), TransportError> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(TransportError::Network(reason));
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((*recipient, body.to_owned()));
        Ok(())
    }
}

struct Harness {
    store: Arc<dyn DocumentStore>,
    transport: Arc<ScriptedTransport>,
    queue: JobQueue,
    users: UserService,
    messages: MessageService,
    scheduler: Scheduler,
}

async fn harness(zone: Tz) -> Harness {
    tidings_observability::init();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let ids = Arc::new(IdGenerator::new());
    let transport = Arc::new(ScriptedTransport::default());

    let queue = JobQueue::open(Arc::clone(&store), Arc::clone(&ids))
        .await
        .unwrap();
    let messages = MessageService::open(
        Arc::clone(&store),
        Arc::clone(&transport) as Arc<dyn DeliveryTransport>,
        Arc::clone(&ids),
    )
    .await
    .unwrap();
    let users = UserService::open(
        Arc::clone(&store),
        queue.clone(),
        Arc::new(FixedResolver(zone)),
        Arc::clone(&ids),
        9,
    )
    .await
    .unwrap();
    let scheduler = Scheduler::open(
        Arc::clone(&store),
        queue.clone(),
        messages.clone(),
        AppConfig::default(),
    )
    .await
    .unwrap();

    Harness {
        store,
        transport,
        queue,
        users,
        messages,
        scheduler,
    }
}

fn ada() -> NewUser {
    NewUser {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        location: "London".into(),
        date_of_birth: Utc.with_ymd_and_hms(1990, 6, 15, 12, 0, 0).unwrap(),
    }
}

fn registration_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
}

/// 09:00 London time on June 15 is 08:00 UTC (BST).
fn expected_due() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 8, 0, 0).unwrap()
}

#[tokio::test]
async fn register_creates_pending_job_due_at_local_nine() {
    let h = harness(chrono_tz::Europe::London).await;
    let user = h.users.register(ada(), registration_time()).await.unwrap();

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.due_date, expected_due());
    assert_eq!(job.users, vec![user.id]);
}

#[tokio::test]
async fn dispatch_before_due_leaves_job_untouched() {
    let h = harness(chrono_tz::Europe::London).await;
    h.users.register(ada(), registration_time()).await.unwrap();

    // 06:00 UTC: the window closes at 06:59, before the 08:00 due moment.
    let early = Utc.with_ymd_and_hms(2026, 6, 15, 6, 0, 0).unwrap();
    h.scheduler.dispatch_pass(early).await.unwrap();

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(h.transport.delivered().is_empty());
}

#[tokio::test]
async fn dispatch_at_due_hour_delivers_and_records() {
    let h = harness(chrono_tz::Europe::London).await;
    let user = h.users.register(ada(), registration_time()).await.unwrap();

    h.scheduler.dispatch_pass(expected_due()).await.unwrap();

    let delivered = h.transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, user.id);
    assert_eq!(delivered[0].1, "Hey, Ada Lovelace it's your birthday");

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert!(job.succeeded_at.is_some());

    let sent = h.messages.sent_to(user.id).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Hey, Ada Lovelace it's your birthday");
}

#[tokio::test]
async fn user_already_greeted_this_year_is_skipped() {
    let h = harness(chrono_tz::Europe::London).await;
    let user = h.users.register(ada(), registration_time()).await.unwrap();

    // Plant an existing message from earlier in the same year.
    let ids = IdGenerator::new();
    let archive: Repository<Message> = Repository::open(Arc::clone(&h.store)).await.unwrap();
    archive
        .create(Message {
            id: ids.generate(tidings_core::IdKind::Message),
            recipient: user.id,
            title: "Happy Birthday".into(),
            body: "Hey, Ada Lovelace it's your birthday".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap(),
        })
        .await
        .unwrap();

    h.scheduler.dispatch_pass(expected_due()).await.unwrap();

    assert!(h.transport.delivered().is_empty());
    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn failed_delivery_marks_job_failed_and_next_pass_retries() {
    let h = harness(chrono_tz::Europe::London).await;
    let user = h.users.register(ada(), registration_time()).await.unwrap();
    h.transport.fail_next("webhook down");

    h.scheduler.dispatch_pass(expected_due()).await.unwrap();

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.failed_at.is_some());
    let error = job.error.clone().unwrap();
    assert!(error.contains("webhook down"), "unexpected error: {error}");
    assert!(h.transport.delivered().is_empty());

    // Half an hour later the failed job matches again and goes through.
    let retry_at = expected_due() + chrono::Duration::minutes(30);
    h.scheduler.dispatch_pass(retry_at).await.unwrap();

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(h.transport.delivered().len(), 1);
    assert_eq!(h.messages.sent_to(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn removed_user_is_never_messaged_and_job_is_swept() {
    let h = harness(chrono_tz::Europe::London).await;
    let user = h.users.register(ada(), registration_time()).await.unwrap();
    h.users.remove(user.id, registration_time()).await.unwrap();

    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert!(job.users.is_empty());

    // Dispatch skips the drained job without advancing it.
    h.scheduler.dispatch_pass(expected_due()).await.unwrap();
    let job = h.queue.find_one(Filter::new()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(h.transport.delivered().is_empty());

    // Reconciliation sweeps it once the due moment has passed.
    h.scheduler.reconcile_pass(expected_due()).await.unwrap();
    assert!(h.queue.find_one(Filter::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn run_loop_stops_on_shutdown_signal() {
    let h = harness(chrono_tz::Europe::London).await;
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(Arc::new(h.scheduler).run(rx));
    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn reconciliation_merges_success_jobs_with_the_same_due_date() {
    let h = harness(chrono_tz::Europe::London).await;
    let ids = IdGenerator::new();
    let u1 = ids.generate(tidings_core::IdKind::User);
    let u2 = ids.generate(tidings_core::IdKind::User);
    let now = registration_time();

    // Two completed jobs for the same due moment, overlapping membership.
    h.queue
        .record_merged_success(expected_due(), vec![u1], now)
        .await
        .unwrap();
    h.queue
        .record_merged_success(expected_due(), vec![u2, u1], now)
        .await
        .unwrap();

    // The nightly pass only compacts days that have fully elapsed.
    let next_day = Utc.with_ymd_and_hms(2026, 6, 16, 0, 30, 0).unwrap();
    h.scheduler.reconcile_pass(next_day).await.unwrap();

    let jobs = h.queue.find(Filter::new()).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Success);
    assert_eq!(jobs[0].due_date, expected_due());
    let mut members = jobs[0].users.clone();
    members.sort();
    let mut expected = vec![u1, u2];
    expected.sort();
    assert_eq!(members, expected);
}
