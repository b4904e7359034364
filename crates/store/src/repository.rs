//! Generic repository over one entity collection.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::warn;

use tidings_core::{Identifier, Record};

use crate::conflict::classify_schema_conflict;
use crate::document::IndexSpec;
use crate::error::StoreError;
use crate::filter::{translate, Filter, Query};
use crate::mapper::{deserialize, serialize};
use crate::store::DocumentStore;

/// An entity that maps to one store collection.
pub trait Persistable: Sized + Send + Sync {
    /// Collection name.
    const COLLECTION: &'static str;

    /// Index declarations applied when the repository is opened.
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Result<Self, StoreError>;
}

/// Either a bare identifier (shorthand for `{id: that}`) or a full filter.
#[derive(Debug, Clone)]
pub enum Target {
    Id(Identifier),
    Where(Filter),
}

impl Target {
    fn into_query(self) -> Result<Query, StoreError> {
        match self {
            Target::Id(id) => Ok(Query::by_id(id)),
            Target::Where(filter) => translate(&filter),
        }
    }
}

impl From<Identifier> for Target {
    fn from(id: Identifier) -> Self {
        Target::Id(id)
    }
}

impl From<Filter> for Target {
    fn from(filter: Filter) -> Self {
        Target::Where(filter)
    }
}

/// Generic create/update/delete/find over one entity collection.
///
/// Serialization and filter translation run through the document mapper, so
/// identifiers and decimals survive the store's limited value model.
/// `WriteConflict` errors are not resolved here: the caller retries the whole
/// logical operation, since intervening state may have changed.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<T: Persistable> Repository<T> {
    /// Open the repository, declaring the collection and its indexes.
    pub async fn open(store: Arc<dyn DocumentStore>) -> Result<Self, StoreError> {
        store.register(T::COLLECTION, T::indexes()).await?;
        Ok(Self {
            store,
            _entity: PhantomData,
        })
    }

    pub async fn create(&self, item: T) -> Result<(), StoreError> {
        self.create_many(vec![item]).await
    }

    /// Insert a batch in one store call.
    pub async fn create_many(&self, items: Vec<T>) -> Result<(), StoreError> {
        let docs = items
            .into_iter()
            .map(|item| serialize(&item.into_record()))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.insert_many(T::COLLECTION, docs).await
    }

    /// Apply a partial record as a `$set`-equivalent patch.
    ///
    /// When the store rejects a patch path because it traverses a field whose
    /// stored type conflicts with an implicit container (a legacy-schema
    /// failure mode), the offending paths are recovered from the diagnostic,
    /// cleared with a compensating update, and the patch is retried once.
    /// Only the explicitly identified paths are cleared; an unrecognizable
    /// diagnostic surfaces the original error.
    pub async fn update(
        &self,
        target: impl Into<Target>,
        patch: Record,
    ) -> Result<(), StoreError> {
        let query = target.into().into_query()?;
        let set = serialize(&patch)?;

        match self
            .store
            .update_many(T::COLLECTION, &query, set.clone(), &[])
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::PathConflict(message)) => {
                let Some(paths) = classify_schema_conflict(&message) else {
                    return Err(StoreError::PathConflict(message));
                };
                warn!(
                    collection = T::COLLECTION,
                    ?paths,
                    "clearing conflicting paths and retrying patch"
                );
                self.store
                    .update_many(T::COLLECTION, &query, Default::default(), &paths)
                    .await?;
                self.store
                    .update_many(T::COLLECTION, &query, set, &[])
                    .await?;
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Delete matching documents; a no-op if none match.
    pub async fn delete(&self, target: impl Into<Target>) -> Result<(), StoreError> {
        let query = target.into().into_query()?;
        self.store.delete_many(T::COLLECTION, &query).await?;
        Ok(())
    }

    pub async fn find_one(&self, target: impl Into<Target>) -> Result<Option<T>, StoreError> {
        let query = target.into().into_query()?;
        match self.store.find_one(T::COLLECTION, &query).await? {
            Some(doc) => Ok(Some(T::from_record(deserialize(&doc)?)?)),
            None => Ok(None),
        }
    }

    pub async fn find(&self, target: impl Into<Target>) -> Result<Vec<T>, StoreError> {
        let query = target.into().into_query()?;
        self.store
            .find(T::COLLECTION, &query)
            .await?
            .iter()
            .map(|doc| T::from_record(deserialize(doc)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::IndexSpec;
    use crate::filter::Conditions;
    use crate::memory::MemoryDocumentStore;
    use tidings_core::{IdGenerator, IdKind, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Contact {
        id: Identifier,
        email: Option<String>,
        name: String,
    }

    impl Persistable for Contact {
        const COLLECTION: &'static str = "contacts";

        fn indexes() -> Vec<IndexSpec> {
            vec![IndexSpec::ascending(&["name"]).unique()]
        }

        fn into_record(self) -> Record {
            let mut rec = Record::new();
            rec.insert("id".into(), Value::Id(self.id));
            rec.insert("name".into(), Value::text(self.name));
            if let Some(email) = self.email {
                let mut contact = Record::new();
                contact.insert("email".into(), Value::Text(email));
                rec.insert("contact".into(), Value::Record(contact));
            }
            rec
        }

        fn from_record(mut record: Record) -> Result<Self, StoreError> {
            let id = record
                .remove("id")
                .and_then(|v| v.as_id())
                .ok_or_else(|| StoreError::Corrupt("contact without id".into()))?;
            let name = record
                .remove("name")
                .and_then(|v| v.as_text().map(ToOwned::to_owned))
                .ok_or_else(|| StoreError::Corrupt("contact without name".into()))?;
            let email = match record.remove("contact") {
                Some(Value::Record(mut c)) => {
                    c.remove("email").and_then(|v| match v {
                        Value::Text(s) => Some(s),
                        _ => None,
                    })
                }
                _ => None,
            };
            Ok(Self { id, email, name })
        }
    }

    async fn repo() -> (Repository<Contact>, IdGenerator) {
        let store = Arc::new(MemoryDocumentStore::new());
        (
            Repository::open(store).await.unwrap(),
            IdGenerator::new(),
        )
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let (repo, g) = repo().await;
        let contact = Contact {
            id: g.generate(IdKind::User),
            email: Some("ada@example.com".into()),
            name: "ada".into(),
        };
        repo.create(contact.clone()).await.unwrap();

        let by_id = repo.find_one(contact.id).await.unwrap().unwrap();
        assert_eq!(by_id, contact);

        let by_filter = repo
            .find(Filter::new().field("name", "ada"))
            .await
            .unwrap();
        assert_eq!(by_filter, vec![contact]);
    }

    #[tokio::test]
    async fn duplicate_unique_key_surfaces_typed_error() {
        let (repo, g) = repo().await;
        for _ in 0..2 {
            let result = repo
                .create(Contact {
                    id: g.generate(IdKind::User),
                    email: None,
                    name: "ada".into(),
                })
                .await;
            if result.is_err() {
                assert!(matches!(
                    result.unwrap_err(),
                    StoreError::DuplicateKey { .. }
                ));
                return;
            }
        }
        panic!("second insert should have violated the unique name index");
    }

    #[tokio::test]
    async fn update_recovers_from_legacy_schema_conflict() {
        let (repo, g) = repo().await;
        let id = g.generate(IdKind::User);
        repo.create(Contact {
            id,
            email: None,
            name: "ada".into(),
        })
        .await
        .unwrap();

        // Degrade the stored shape the way legacy writers did: `contact`
        // becomes a scalar, so patching `contact.email` must conflict.
        let mut degraded = Record::new();
        degraded.insert("contact".into(), Value::Null);
        repo.update(id, degraded).await.unwrap();

        let mut inner = Record::new();
        inner.insert("email".into(), Value::text("ada@example.com"));
        let mut patch = Record::new();
        patch.insert("contact".into(), Value::Record(inner));
        repo.update(id, patch).await.unwrap();

        let found = repo.find_one(id).await.unwrap().unwrap();
        assert_eq!(found.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn find_with_inclusion_and_delete() {
        let (repo, g) = repo().await;
        let a = g.generate(IdKind::User);
        let b = g.generate(IdKind::User);
        repo.create_many(vec![
            Contact {
                id: a,
                email: None,
                name: "ada".into(),
            },
            Contact {
                id: b,
                email: None,
                name: "grace".into(),
            },
        ])
        .await
        .unwrap();

        let both = repo
            .find(Filter::new().id_where(Conditions::any_of([a, b])))
            .await
            .unwrap();
        assert_eq!(both.len(), 2);

        repo.delete(a).await.unwrap();
        assert!(repo.find_one(a).await.unwrap().is_none());
        assert!(repo.find_one(b).await.unwrap().is_some());

        // Deleting again is a silent no-op.
        repo.delete(a).await.unwrap();
    }
}
