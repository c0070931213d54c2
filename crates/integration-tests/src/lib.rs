//! Test doubles for the ShareApp functions.
//!
//! In-memory implementations of the three client ports. Each one records
//! every call it receives and can be told to fail, so tests can assert on
//! exactly which side effects a handler attempted.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shareapp-integration-tests
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use shareapp_core::{CustomerId, DocumentPath, PaymentSource};
use shareapp_functions::config::ProfileDefaults;
use shareapp_functions::firestore::{DocumentStore, Fields, FirestoreError, WriteMode};
use shareapp_functions::state::{AppState, Clients};
use shareapp_functions::storage::{BlobStore, DeleteOutcome, StorageError};
use shareapp_functions::stripe::{
    Customer, NewCustomer, PaymentApi, SourceList, StripeError, Token,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fingerprint the fake payment API assigns to the card behind `token`.
#[must_use]
pub fn fingerprint_for(token: &str) -> String {
    format!("fp_{token}")
}

// =============================================================================
// Document store
// =============================================================================

/// A call received by [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocCall {
    Get(String),
    Set { path: String, mode: WriteMode },
    Update(String),
    Delete(String),
}

impl DocCall {
    /// Path the call addressed.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Get(path) | Self::Update(path) | Self::Delete(path) => path,
            Self::Set { path, .. } => path,
        }
    }
}

/// Firestore stand-in keyed by document path.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, Fields>>,
    calls: Mutex<Vec<DocCall>>,
    failing: Mutex<BTreeSet<String>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document without recording a call.
    pub fn insert(&self, path: &DocumentPath, fields: serde_json::Value) {
        let serde_json::Value::Object(fields) = fields else {
            panic!("document fields must be a JSON object");
        };
        lock(&self.documents).insert(path.to_string(), fields);
    }

    /// Current contents of a document.
    #[must_use]
    pub fn document(&self, path: &DocumentPath) -> Option<Fields> {
        lock(&self.documents).get(path.as_str()).cloned()
    }

    /// Make every call addressing `path` fail.
    pub fn fail_on(&self, path: &DocumentPath) {
        lock(&self.failing).insert(path.to_string());
    }

    /// Stop failing calls injected with [`fail_on`](Self::fail_on).
    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<DocCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: DocCall) -> Result<(), FirestoreError> {
        let failing = lock(&self.failing).contains(call.path());
        lock(&self.calls).push(call);
        if failing {
            return Err(FirestoreError::Api {
                status: 503,
                message: "UNAVAILABLE: injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Merge `fields` into `stored` the way a leaf-masked Firestore write does:
/// non-empty maps merge key by key, everything else overwrites.
fn merge_fields(stored: &mut Fields, fields: Fields) {
    for (name, value) in fields {
        match value {
            serde_json::Value::Object(nested) if !nested.is_empty() => {
                if let Some(serde_json::Value::Object(existing)) = stored.get_mut(&name) {
                    merge_fields(existing, nested);
                } else {
                    stored.insert(name, serde_json::Value::Object(nested));
                }
            }
            value => {
                stored.insert(name, value);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Fields>, FirestoreError> {
        self.record(DocCall::Get(path.to_string()))?;
        Ok(self.document(path))
    }

    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), FirestoreError> {
        self.record(DocCall::Set {
            path: path.to_string(),
            mode,
        })?;

        let mut documents = lock(&self.documents);
        match mode {
            WriteMode::Replace => {
                documents.insert(path.to_string(), fields);
            }
            WriteMode::Merge => {
                merge_fields(documents.entry(path.to_string()).or_default(), fields);
            }
        }
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), FirestoreError> {
        self.record(DocCall::Update(path.to_string()))?;

        let mut documents = lock(&self.documents);
        let existing = documents
            .get_mut(path.as_str())
            .ok_or_else(|| FirestoreError::NotFound(path.to_string()))?;
        existing.extend(fields);
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), FirestoreError> {
        self.record(DocCall::Delete(path.to_string()))?;
        lock(&self.documents).remove(path.as_str());
        Ok(())
    }
}

// =============================================================================
// Blob store
// =============================================================================

/// A call received by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCall {
    Delete(String),
    DeletePrefix(String),
}

/// Cloud Storage stand-in holding object names only.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<BlobCall>>,
    failing: Mutex<BTreeSet<String>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object without recording a call.
    pub fn insert(&self, name: &str) {
        lock(&self.objects).insert(name.to_string());
    }

    /// Whether an object exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.objects).contains(name)
    }

    /// Names of all stored objects.
    #[must_use]
    pub fn objects(&self) -> Vec<String> {
        lock(&self.objects).iter().cloned().collect()
    }

    /// Make deletes of exactly `name` (object or prefix) fail.
    pub fn fail_on(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BlobCall> {
        lock(&self.calls).clone()
    }

    fn check(&self, name: &str) -> Result<(), StorageError> {
        if lock(&self.failing).contains(name) {
            return Err(StorageError::Api {
                status: 403,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError> {
        lock(&self.calls).push(BlobCall::Delete(name.to_string()));
        self.check(name)?;

        Ok(if lock(&self.objects).remove(name) {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::Missing
        })
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        lock(&self.calls).push(BlobCall::DeletePrefix(prefix.to_string()));
        self.check(prefix)?;

        let mut objects = lock(&self.objects);
        let before = objects.len();
        objects.retain(|name| !name.starts_with(prefix));
        Ok(before - objects.len())
    }
}

// =============================================================================
// Payment API
// =============================================================================

/// A call received by [`FakePaymentApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCall {
    CreateCustomer {
        email: Option<String>,
        source: String,
        idempotency_key: String,
    },
    RetrieveCustomer(String),
    RetrieveToken(String),
    ListSources {
        customer: String,
        starting_after: Option<String>,
    },
    AttachSource {
        customer: String,
        token: String,
        idempotency_key: String,
    },
}

impl PaymentCall {
    /// Token sent to Stripe as a funding source, if any.
    #[must_use]
    pub fn submitted_token(&self) -> Option<&str> {
        match self {
            Self::CreateCustomer { source, .. } => Some(source.as_str()),
            Self::AttachSource { token, .. } => Some(token.as_str()),
            _ => None,
        }
    }
}

/// Response stored under an idempotency key.
#[derive(Debug, Clone)]
enum Replay {
    Customer(Customer),
    Source(PaymentSource),
}

/// Stored state of one customer.
#[derive(Debug, Clone)]
struct StoredCustomer {
    deleted: bool,
    sources: Vec<PaymentSource>,
}

/// Stripe stand-in.
///
/// Every token maps to a card whose fingerprint is
/// [`fingerprint_for`]`(token)`. Tokens can fund one source only; reusing
/// one fails with `token_already_used` unless the request repeats an
/// idempotency key, in which case the first response is replayed.
#[derive(Debug)]
pub struct FakePaymentApi {
    customers: Mutex<HashMap<String, StoredCustomer>>,
    used_tokens: Mutex<BTreeSet<String>>,
    replays: Mutex<HashMap<String, Replay>>,
    calls: Mutex<Vec<PaymentCall>>,
    failure: Mutex<Option<u16>>,
    next_id: Mutex<u32>,
    page_size: Mutex<usize>,
}

impl Default for FakePaymentApi {
    fn default() -> Self {
        Self {
            customers: Mutex::default(),
            used_tokens: Mutex::default(),
            replays: Mutex::default(),
            calls: Mutex::default(),
            failure: Mutex::default(),
            next_id: Mutex::default(),
            page_size: Mutex::new(10),
        }
    }
}

impl FakePaymentApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing customer with one card per token. The tokens
    /// count as used.
    pub fn insert_customer(&self, id: &str, tokens: &[&str]) {
        let sources = tokens.iter().map(|token| self.card(token)).collect();
        lock(&self.used_tokens).extend(tokens.iter().map(|token| (*token).to_string()));
        lock(&self.customers).insert(
            id.to_string(),
            StoredCustomer {
                deleted: false,
                sources,
            },
        );
    }

    /// Mark a customer as deleted.
    pub fn delete_customer(&self, id: &str) {
        if let Some(customer) = lock(&self.customers).get_mut(id) {
            customer.deleted = true;
            customer.sources.clear();
        }
    }

    /// Number of customers, including deleted ones.
    #[must_use]
    pub fn customer_count(&self) -> usize {
        lock(&self.customers).len()
    }

    /// Fingerprints of a customer's sources, in attach order.
    #[must_use]
    pub fn source_fingerprints(&self, id: &str) -> Vec<String> {
        lock(&self.customers)
            .get(id)
            .map(|customer| {
                customer
                    .sources
                    .iter()
                    .filter_map(PaymentSource::fingerprint)
                    .map(|fp| fp.as_str().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of sources per page, embedded or listed. Defaults to 10.
    pub fn set_page_size(&self, size: usize) {
        *lock(&self.page_size) = size.max(1);
    }

    /// Make every following call fail with an API error of `status`.
    pub fn fail_with_status(&self, status: u16) {
        *lock(&self.failure) = Some(status);
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PaymentCall> {
        lock(&self.calls).clone()
    }

    /// How many calls sent `token` as a funding source.
    #[must_use]
    pub fn submissions_of(&self, token: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.submitted_token() == Some(token))
            .count()
    }

    fn record(&self, call: PaymentCall) -> Result<(), StripeError> {
        lock(&self.calls).push(call);
        match *lock(&self.failure) {
            Some(status) => Err(StripeError::Api {
                status,
                kind: "api_error".to_string(),
                code: None,
                message: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn replay(&self, idempotency_key: &str) -> Option<Replay> {
        lock(&self.replays).get(idempotency_key).cloned()
    }

    fn remember(&self, idempotency_key: String, reply: Replay) {
        lock(&self.replays).insert(idempotency_key, reply);
    }

    /// Mark `token` used, failing if it already was.
    fn consume(&self, token: &str) -> Result<(), StripeError> {
        if lock(&self.used_tokens).insert(token.to_string()) {
            return Ok(());
        }
        Err(StripeError::Api {
            status: 400,
            kind: "invalid_request_error".to_string(),
            code: Some("token_already_used".to_string()),
            message: format!("You cannot use a Stripe token more than once: {token}."),
        })
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = lock(&self.next_id);
        *next += 1;
        format!("{prefix}_{next}")
    }

    fn card(&self, token: &str) -> PaymentSource {
        let fields = json!({
            "id": self.next_id("src"),
            "object": "source",
            "type": "card",
            "card": {"brand": "Visa", "last4": "4242", "fingerprint": fingerprint_for(token)},
        });
        serde_json::from_value(fields).unwrap_or_default()
    }

    /// Page of `sources` following the source `starting_after`.
    fn page(&self, sources: &[PaymentSource], starting_after: Option<&str>) -> SourceList {
        let start = starting_after
            .and_then(|cursor| sources.iter().position(|s| s.id() == Some(cursor)))
            .map_or(0, |index| index + 1);
        let rest = sources.get(start..).unwrap_or_default();
        let size = *lock(&self.page_size);

        SourceList {
            data: rest.iter().take(size).cloned().collect(),
            has_more: rest.len() > size,
        }
    }

    fn snapshot(&self, id: &CustomerId, stored: &StoredCustomer) -> Customer {
        Customer {
            id: id.clone(),
            deleted: stored.deleted,
            sources: (!stored.deleted).then(|| self.page(&stored.sources, None)),
        }
    }
}

fn customer_id(id: &str) -> CustomerId {
    CustomerId::parse(id).unwrap_or_else(|e| panic!("invalid customer id {id}: {e}"))
}

fn missing_customer(id: &CustomerId) -> StripeError {
    StripeError::Api {
        status: 404,
        kind: "invalid_request_error".to_string(),
        code: Some("resource_missing".to_string()),
        message: format!("No such customer: '{id}'"),
    }
}

#[async_trait]
impl PaymentApi for FakePaymentApi {
    async fn create_customer(&self, params: NewCustomer<'_>) -> Result<Customer, StripeError> {
        self.record(PaymentCall::CreateCustomer {
            email: params.email.map(|e| e.as_str().to_string()),
            source: params.source.to_string(),
            idempotency_key: params.idempotency_key.clone(),
        })?;

        if let Some(Replay::Customer(customer)) = self.replay(&params.idempotency_key) {
            return Ok(customer);
        }
        self.consume(params.source)?;

        let id = customer_id(&self.next_id("cus"));
        let stored = StoredCustomer {
            deleted: false,
            sources: vec![self.card(params.source)],
        };
        let customer = self.snapshot(&id, &stored);
        lock(&self.customers).insert(id.to_string(), stored);
        self.remember(params.idempotency_key, Replay::Customer(customer.clone()));
        Ok(customer)
    }

    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer, StripeError> {
        self.record(PaymentCall::RetrieveCustomer(id.to_string()))?;
        let stored = lock(&self.customers)
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| missing_customer(id))?;
        Ok(self.snapshot(id, &stored))
    }

    async fn retrieve_token(&self, token: &str) -> Result<Token, StripeError> {
        self.record(PaymentCall::RetrieveToken(token.to_string()))?;
        let token = json!({
            "id": token,
            "object": "token",
            "type": "card",
            "card": {"brand": "Visa", "last4": "4242", "fingerprint": fingerprint_for(token)},
        });
        serde_json::from_value(token).map_err(|e| StripeError::Parse(e.to_string()))
    }

    async fn list_sources(
        &self,
        customer: &CustomerId,
        starting_after: Option<&str>,
    ) -> Result<SourceList, StripeError> {
        self.record(PaymentCall::ListSources {
            customer: customer.to_string(),
            starting_after: starting_after.map(String::from),
        })?;
        let stored = lock(&self.customers)
            .get(customer.as_str())
            .cloned()
            .ok_or_else(|| missing_customer(customer))?;
        Ok(self.page(&stored.sources, starting_after))
    }

    async fn attach_source(
        &self,
        customer: &CustomerId,
        token: &str,
        idempotency_key: String,
    ) -> Result<PaymentSource, StripeError> {
        self.record(PaymentCall::AttachSource {
            customer: customer.to_string(),
            token: token.to_string(),
            idempotency_key: idempotency_key.clone(),
        })?;

        if let Some(Replay::Source(source)) = self.replay(&idempotency_key) {
            return Ok(source);
        }
        if !lock(&self.customers).contains_key(customer.as_str()) {
            return Err(missing_customer(customer));
        }
        self.consume(token)?;

        let source = self.card(token);
        if let Some(stored) = lock(&self.customers).get_mut(customer.as_str()) {
            stored.sources.push(source.clone());
        }
        self.remember(idempotency_key, Replay::Source(source.clone()));
        Ok(source)
    }
}

// =============================================================================
// Harness
// =============================================================================

/// The three fakes, shared with the handlers under test.
#[derive(Debug, Clone, Default)]
pub struct TestHarness {
    pub documents: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub payments: Arc<FakePaymentApi>,
}

impl TestHarness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Port handles backed by the fakes.
    #[must_use]
    pub fn clients(&self) -> Clients {
        Clients {
            documents: self.documents.clone(),
            blobs: self.blobs.clone(),
            payments: self.payments.clone(),
        }
    }

    /// Application state with default profile values.
    #[must_use]
    pub fn state(&self, await_bulk_deletes: bool) -> AppState {
        AppState::new(self.clients(), ProfileDefaults::default(), await_bulk_deletes)
    }
}
