//! # Document Store
//!
//! Every collection is a flat map of `id -> JSON document`.
//!
//! ## Requirements
//!
//! - Lookups by id for users, businesses, forms
//! - One account per email, even under concurrent signups
//! - Listing a business's forms and a form's responses
//! - Small dataset: a few thousand forms, responses grow with traffic
//!
//! ## Implementation
//!
//! - Redis hash per collection: 1 key, then `id -> json` pairs
//! - `HSETNX` on the `users:email` index claims an email atomically
//! - `businesses:owner` maps a user id to their business id
//! - Responses live in `responses:<form id>` so deleting a form drops them with one `DEL`
//! - Listing is `HVALS` then sort by `createdAt`, fine at this size
//!
//! [`MemoryStore`] implements the same contract in-process for local runs and tests.
use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use forms::models::{Business, FeedbackForm, FormResponse, User};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

pub const USERS: &str = "users";
pub const USERS_BY_EMAIL: &str = "users:email";
pub const BUSINESSES: &str = "businesses";
pub const BUSINESSES_BY_OWNER: &str = "businesses:owner";
pub const FORMS: &str = "forms";

pub fn responses_collection(form_id: Uuid) -> String {
    format!("responses:{form_id}")
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt document in {collection}: {source}")]
    Corrupt {
        collection: String,
        source: serde_json::Error,
    },

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, collection: &str, id: &str, document: String) -> Result<(), StoreError>;

    /// Returns `false` and leaves the stored value alone when `id` exists.
    async fn put_if_absent(
        &self,
        collection: &str,
        id: &str,
        document: String,
    ) -> Result<bool, StoreError>;

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    async fn values(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(collection, id).await?)
    }

    async fn put(&self, collection: &str, id: &str, document: String) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.hset(collection, id, document).await?;

        Ok(())
    }

    async fn put_if_absent(
        &self,
        collection: &str,
        id: &str,
        document: String,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hset_nx(collection, id, document).await?)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let removed: u32 = connection.hdel(collection, id).await?;

        Ok(removed > 0)
    }

    async fn values(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hvals(collection).await?)
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(collection).await?;

        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id).cloned()))
    }

    async fn put(&self, collection: &str, id: &str, document: String) -> Result<(), StoreError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);

        Ok(())
    }

    async fn put_if_absent(
        &self,
        collection: &str,
        id: &str,
        document: String,
    ) -> Result<bool, StoreError> {
        // the shard lock is held across the check and the insert
        let mut documents = self.collections.entry(collection.to_string()).or_default();
        if documents.contains_key(id) {
            return Ok(false);
        }
        documents.insert(id.to_string(), document);

        Ok(true)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .get_mut(collection)
            .is_some_and(|mut documents| documents.remove(id).is_some()))
    }

    async fn values(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.remove(collection);

        Ok(())
    }
}

/// A document type stored in its own collection, keyed by `_id`.
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

impl Document for User {
    const COLLECTION: &'static str = USERS;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Business {
    const COLLECTION: &'static str = BUSINESSES;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for FeedbackForm {
    const COLLECTION: &'static str = FORMS;

    fn id(&self) -> Uuid {
        self.id
    }
}

fn decode<T: DeserializeOwned>(collection: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
        collection: collection.to_string(),
        source,
    })
}

/// Typed access on top of a [`DocumentStore`].
#[derive(Clone)]
pub struct Documents {
    store: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: Document>(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        self.store
            .get(T::COLLECTION, &id.to_string())
            .await?
            .map(|raw| decode(T::COLLECTION, &raw))
            .transpose()
    }

    pub async fn save<T: Document>(&self, document: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(document)?;

        self.store
            .put(T::COLLECTION, &document.id().to_string(), encoded)
            .await
    }

    pub async fn all<T: Document>(&self) -> Result<Vec<T>, StoreError> {
        self.store
            .values(T::COLLECTION)
            .await?
            .iter()
            .map(|raw| decode(T::COLLECTION, raw))
            .collect()
    }

    /// Claims the email first; `Ok(false)` means it is already registered.
    pub async fn create_user(&self, user: &User) -> Result<bool, StoreError> {
        let id = user.id.to_string();

        if !self
            .store
            .put_if_absent(USERS_BY_EMAIL, &user.email, id)
            .await?
        {
            return Ok(false);
        }

        if let Err(e) = self.save(user).await {
            self.store.remove(USERS_BY_EMAIL, &user.email).await?;
            return Err(e);
        }

        Ok(true)
    }

    /// Undoes [`Documents::create_user`], releasing the email.
    pub async fn delete_user(&self, user: &User) -> Result<(), StoreError> {
        self.store.remove(USERS, &user.id.to_string()).await?;
        self.store.remove(USERS_BY_EMAIL, &user.email).await?;

        Ok(())
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id) = self.store.get(USERS_BY_EMAIL, email).await? else {
            return Ok(None);
        };

        match Uuid::parse_str(&id) {
            Ok(id) => self.get(id).await,
            Err(_) => Ok(None),
        }
    }

    /// Leaves nothing behind when either write fails.
    pub async fn create_business(&self, business: &Business) -> Result<(), StoreError> {
        self.save(business).await?;

        let indexed = self
            .store
            .put(
                BUSINESSES_BY_OWNER,
                &business.owner.to_string(),
                business.id.to_string(),
            )
            .await;
        if let Err(e) = indexed {
            self.store
                .remove(BUSINESSES, &business.id.to_string())
                .await?;
            return Err(e);
        }

        Ok(())
    }

    pub async fn business_by_owner(&self, owner: Uuid) -> Result<Option<Business>, StoreError> {
        let Some(id) = self
            .store
            .get(BUSINESSES_BY_OWNER, &owner.to_string())
            .await?
        else {
            return Ok(None);
        };

        match Uuid::parse_str(&id) {
            Ok(id) => self.get(id).await,
            Err(_) => Ok(None),
        }
    }

    /// Newest first.
    pub async fn forms_for(&self, business_id: Uuid) -> Result<Vec<FeedbackForm>, StoreError> {
        let mut forms: Vec<FeedbackForm> = self
            .all::<FeedbackForm>()
            .await?
            .into_iter()
            .filter(|form| form.business_id == business_id)
            .collect();
        forms.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(forms)
    }

    /// Removes the form and every response submitted to it.
    pub async fn delete_form(&self, form_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.store.remove(FORMS, &form_id.to_string()).await?;
        if removed {
            self.store
                .drop_collection(&responses_collection(form_id))
                .await?;
        }

        Ok(removed)
    }

    /// `Ok(false)` when the form is gone. A delete racing the write can drop
    /// the collection before it lands, so the form is checked again after.
    pub async fn save_response(&self, response: &FormResponse) -> Result<bool, StoreError> {
        let encoded = serde_json::to_string(response)?;
        let collection = responses_collection(response.form_id);

        self.store
            .put(&collection, &response.id.to_string(), encoded)
            .await?;

        let form = self
            .store
            .get(FORMS, &response.form_id.to_string())
            .await?;
        if form.is_none() {
            self.store.drop_collection(&collection).await?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Newest first.
    pub async fn responses_for(&self, form_id: Uuid) -> Result<Vec<FormResponse>, StoreError> {
        let collection = responses_collection(form_id);
        let mut responses = self
            .store
            .values(&collection)
            .await?
            .iter()
            .map(|raw| decode(&collection, raw))
            .collect::<Result<Vec<FormResponse>, _>>()?;
        responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{Duration, Utc};
    use forms::{
        FieldType,
        models::{Answer, BusinessProfile, FormField, Role},
    };
    use serde_json::json;

    use super::*;

    fn documents() -> Documents {
        Documents::new(Arc::new(MemoryStore::new()))
    }

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: None,
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    fn form(business_id: Uuid, title: &str, age_minutes: i64) -> FeedbackForm {
        let created = Utc::now() - Duration::minutes(age_minutes);
        FeedbackForm {
            id: Uuid::new_v4(),
            business_id,
            title: title.to_string(),
            description: None,
            fields: vec![FormField {
                name: "comment".to_string(),
                label: "Comment".to_string(),
                kind: FieldType::ShortText,
                required: false,
                placeholder: None,
                options: None,
            }],
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_email_claimed_once() {
        let documents = documents();

        assert!(documents.create_user(&user("dup@example.com")).await.unwrap());
        assert!(!documents.create_user(&user("dup@example.com")).await.unwrap());

        let found = documents.user_by_email("dup@example.com").await.unwrap();
        assert!(found.is_some());
        assert_eq!(documents.all::<User>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_signup() {
        let documents = documents();

        let attempts = (0..8).map(|_| {
            let documents = documents.clone();
            tokio::spawn(async move { documents.create_user(&user("race@example.com")).await })
        });

        let mut created = 0;
        for attempt in attempts {
            if attempt.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_forms_newest_first() {
        let documents = documents();
        let business_id = Uuid::new_v4();

        documents.save(&form(business_id, "older", 10)).await.unwrap();
        documents.save(&form(business_id, "newer", 1)).await.unwrap();
        documents.save(&form(Uuid::new_v4(), "other", 0)).await.unwrap();

        let titles: Vec<String> = documents
            .forms_for(business_id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, ["newer", "older"]);
    }

    fn response(form_id: Uuid) -> FormResponse {
        let now = Utc::now();
        FormResponse {
            id: Uuid::new_v4(),
            form_id,
            answers: vec![Answer {
                field_name: "comment".to_string(),
                value: json!("nice"),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Fails the first `put` into `collection`, then behaves like memory.
    struct FlakyStore {
        inner: MemoryStore,
        collection: &'static str,
        tripped: AtomicBool,
    }

    impl FlakyStore {
        fn new(collection: &'static str) -> Self {
            Self {
                inner: MemoryStore::new(),
                collection,
                tripped: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(collection, id).await
        }

        async fn put(&self, collection: &str, id: &str, document: String) -> Result<(), StoreError> {
            if collection == self.collection && !self.tripped.swap(true, Ordering::SeqCst) {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                return Err(StoreError::Encode(err));
            }
            self.inner.put(collection, id, document).await
        }

        async fn put_if_absent(
            &self,
            collection: &str,
            id: &str,
            document: String,
        ) -> Result<bool, StoreError> {
            self.inner.put_if_absent(collection, id, document).await
        }

        async fn remove(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
            self.inner.remove(collection, id).await
        }

        async fn values(&self, collection: &str) -> Result<Vec<String>, StoreError> {
            self.inner.values(collection).await
        }

        async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
            self.inner.drop_collection(collection).await
        }
    }

    #[tokio::test]
    async fn test_delete_form_drops_responses() {
        let documents = documents();
        let form = form(Uuid::new_v4(), "feedback", 0);
        documents.save(&form).await.unwrap();

        let response = response(form.id);
        assert!(documents.save_response(&response).await.unwrap());
        assert_eq!(documents.responses_for(form.id).await.unwrap(), [response]);

        assert!(documents.delete_form(form.id).await.unwrap());
        assert!(!documents.delete_form(form.id).await.unwrap());
        assert!(documents.responses_for(form.id).await.unwrap().is_empty());
        assert!(documents.get::<FeedbackForm>(form.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_response_to_deleted_form_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let documents = Documents::new(store.clone());
        let form = form(Uuid::new_v4(), "feedback", 0);
        documents.save(&form).await.unwrap();

        // the delete lands between the submit's lookup and its write
        assert!(documents.get::<FeedbackForm>(form.id).await.unwrap().is_some());
        assert!(documents.delete_form(form.id).await.unwrap());

        assert!(!documents.save_response(&response(form.id)).await.unwrap());
        let leftover = store.values(&responses_collection(form.id)).await.unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_releases_email() {
        let documents = documents();
        let first = user("again@example.com");

        assert!(documents.create_user(&first).await.unwrap());
        documents.delete_user(&first).await.unwrap();

        assert!(documents.get::<User>(first.id).await.unwrap().is_none());
        assert!(documents.user_by_email("again@example.com").await.unwrap().is_none());
        assert!(documents.create_user(&user("again@example.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_business_rolls_back() {
        let documents = Documents::new(Arc::new(FlakyStore::new(BUSINESSES_BY_OWNER)));
        let owner = Uuid::new_v4();
        let business = Business::new(
            owner,
            BusinessProfile {
                businessname: "Cafe Blue".to_string(),
                location: "Kathmandu".to_string(),
                pancard_number: 42,
                description: "Coffee".to_string(),
            },
        );

        assert!(documents.create_business(&business).await.is_err());
        assert!(documents.all::<Business>().await.unwrap().is_empty());
        assert!(documents.business_by_owner(owner).await.unwrap().is_none());

        documents.create_business(&business).await.unwrap();
        assert_eq!(
            documents.business_by_owner(owner).await.unwrap().map(|b| b.id),
            Some(business.id)
        );
    }

    #[tokio::test]
    async fn test_init_redis_rejects_bad_url() {
        assert!(init_redis("not-a-redis-url").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let store = Arc::new(MemoryStore::new());
        let id = Uuid::new_v4();
        store
            .put(FORMS, &id.to_string(), "{not json".to_string())
            .await
            .unwrap();

        let documents = Documents::new(store);
        let err = documents.get::<FeedbackForm>(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
