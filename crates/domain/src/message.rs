//! Sent-message records and the delivery service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use tidings_core::{IdGenerator, IdKind, Identifier, Record, Value};
use tidings_store::{
    Conditions, DocumentStore, Filter, IndexSpec, Persistable, Repository, StoreError,
};

use crate::error::ServiceError;
use crate::fields;
use crate::transport::DeliveryTransport;

/// An audit record of a delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Identifier,
    pub recipient: Identifier,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Persistable for Message {
    const COLLECTION: &'static str = "messages";

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::ascending(&["recipient"])]
    }

    fn into_record(self) -> Record {
        let mut rec = Record::new();
        rec.insert("id".into(), Value::Id(self.id));
        rec.insert("recipient".into(), Value::Id(self.recipient));
        rec.insert("title".into(), Value::Text(self.title));
        rec.insert("body".into(), Value::Text(self.body));
        rec.insert("created_at".into(), Value::Timestamp(self.created_at));
        rec
    }

    fn from_record(mut record: Record) -> Result<Self, StoreError> {
        Ok(Self {
            id: fields::take_id(&mut record, "id")?,
            recipient: fields::take_id(&mut record, "recipient")?,
            title: fields::take_text(&mut record, "title")?,
            body: fields::take_text(&mut record, "body")?,
            created_at: fields::take_timestamp(&mut record, "created_at")?,
        })
    }
}

/// Delivers birthday greetings and records what was sent.
#[derive(Clone)]
pub struct MessageService {
    messages: Repository<Message>,
    transport: Arc<dyn DeliveryTransport>,
    ids: Arc<IdGenerator>,
}

impl MessageService {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn DeliveryTransport>,
        ids: Arc<IdGenerator>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            messages: Repository::open(store).await?,
            transport,
            ids,
        })
    }

    /// Deliver the greeting, then persist the audit record. A delivery
    /// failure leaves no record, so the job retries from scratch.
    pub async fn send_birthday_message(
        &self,
        recipient: Identifier,
        full_name: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<Message, ServiceError> {
        let body = format!("Hey, {full_name} it's your birthday");
        self.transport.deliver(&recipient, &body).await?;

        let message = Message {
            id: self.ids.generate(IdKind::Message),
            recipient,
            title: title.to_owned(),
            body,
            created_at: now,
        };
        self.messages.create(message.clone()).await?;
        info!(recipient = %recipient, "birthday message sent");
        Ok(message)
    }

    /// All messages delivered to a recipient, for duplicate-send checks.
    pub async fn sent_to(&self, recipient: Identifier) -> Result<Vec<Message>, ServiceError> {
        let filter = Filter::new().where_field("recipient", Conditions::equal(Value::Id(recipient)));
        Ok(self.messages.find(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tidings_core::IdGenerator;
    use tidings_store::MemoryDocumentStore;

    use crate::transport::TransportError;

    struct AcceptingTransport;

    #[async_trait::async_trait]
    impl DeliveryTransport for AcceptingTransport {
        async fn deliver(&self, _recipient: &Identifier, _body: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sent_to_returns_only_the_recipients_messages() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ids = Arc::new(IdGenerator::new());
        let service = MessageService::open(store, Arc::new(AcceptingTransport), Arc::clone(&ids))
            .await
            .unwrap();

        let ada = ids.generate(IdKind::User);
        let grace = ids.generate(IdKind::User);
        let now = Utc.with_ymd_and_hms(2026, 6, 15, 8, 0, 0).unwrap();

        service
            .send_birthday_message(ada, "Ada Lovelace", "Happy Birthday", now)
            .await
            .unwrap();
        service
            .send_birthday_message(grace, "Grace Hopper", "Happy Birthday", now)
            .await
            .unwrap();

        let sent = service.sent_to(ada).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, ada);
        assert_eq!(sent[0].body, "Hey, Ada Lovelace it's your birthday");

        let none = service.sent_to(ids.generate(IdKind::User)).await.unwrap();
        assert!(none.is_empty());
    }
}
