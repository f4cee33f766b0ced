//! Backend-synchronized collection.
//!
//! [`SyncedCollection`] ties an [`OptimisticReconciler`] to a [`Backend`]:
//! push events request a refetch, refetched snapshots are merged, and user
//! actions go through an optimistic override that is committed or rolled back
//! once the backend answers. Every change is published on a watch channel.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::entity::Entity;
use super::reconciler::{MutationTicket, OptimisticReconciler};
use crate::channel::{Envelope, EventRouter, Subscription};

/// Snapshot fetch and mutation endpoints for one collection.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Record type.
    type Entity: Entity;

    /// A state-changing request.
    type Action: fmt::Debug + Send + Sync + 'static;

    /// Query parameters for a snapshot fetch.
    type Filters: fmt::Debug + Send + Sync + 'static;

    /// Transport or server error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches every record matching `filters`.
    async fn fetch_collection(
        &self,
        filters: &Self::Filters,
    ) -> Result<Vec<Self::Entity>, Self::Error>;

    /// Applies `action` to the record `id`, returning the updated record.
    async fn mutate(
        &self,
        id: &<Self::Entity as Entity>::Id,
        action: &Self::Action,
    ) -> Result<Self::Entity, Self::Error>;
}

/// A user mutation that did not go through.
///
/// The optimistic change has already been rolled back when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum MutationError<E: std::error::Error + 'static> {
    /// The entity is not in the collection.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The backend rejected the request or could not be reached.
    #[error("mutation failed: {0}")]
    Backend(#[source] E),
}

type EntityId<B> = <<B as Backend>::Entity as Entity>::Id;

struct CollectionInner<B: Backend> {
    backend: B,
    filters: B::Filters,
    state: Mutex<OptimisticReconciler<B::Entity>>,
    view: watch::Sender<Vec<B::Entity>>,
    refresh_requested: Arc<Notify>,
}

impl<B: Backend> CollectionInner<B> {
    fn lock(&self) -> MutexGuard<'_, OptimisticReconciler<B::Entity>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut OptimisticReconciler<B::Entity>) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.view.send_replace(state.view());
        result
    }
}

/// A reconciled collection kept in sync with its backend.
pub struct SyncedCollection<B: Backend> {
    inner: Arc<CollectionInner<B>>,
}

impl<B: Backend> Clone for SyncedCollection<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> fmt::Debug for SyncedCollection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedCollection")
            .field("filters", &self.inner.filters)
            .field("state", &*self.inner.lock())
            .finish()
    }
}

impl<B: Backend> SyncedCollection<B> {
    /// Creates an empty collection. Call [`refresh`](Self::refresh) to load it.
    #[must_use]
    pub fn new(backend: B, filters: B::Filters) -> Self {
        let (view, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(CollectionInner {
                backend,
                filters,
                state: Mutex::new(OptimisticReconciler::new()),
                view,
                refresh_requested: Arc::new(Notify::new()),
            }),
        }
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Returns the snapshot filters.
    #[must_use]
    pub fn filters(&self) -> &B::Filters {
        &self.inner.filters
    }

    /// Fetches a fresh snapshot and merges it.
    ///
    /// Returns the number of records in the merged view.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the current view is left unchanged.
    pub async fn refresh(&self) -> Result<usize, B::Error> {
        let fresh = self
            .inner
            .backend
            .fetch_collection(&self.inner.filters)
            .await?;
        let fetched = fresh.len();

        let records = self.inner.update(|state| {
            state.merge_snapshot(fresh);
            state.len()
        });
        debug!(fetched, records, "collection refreshed");
        Ok(records)
    }

    /// Applies `patch` optimistically, then asks the backend to perform
    /// `action`.
    ///
    /// On success the override is committed and the returned record becomes
    /// authoritative. On failure the entity is restored to `rollback`.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Backend`] if the backend call fails.
    pub async fn mutate(
        &self,
        id: EntityId<B>,
        action: B::Action,
        patch: <B::Entity as Entity>::Patch,
        rollback: <B::Entity as Entity>::Patch,
    ) -> Result<B::Entity, MutationError<B::Error>> {
        let ticket = self
            .inner
            .update(|state| state.apply_optimistic(id.clone(), patch, rollback));
        self.settle(id, action, ticket).await
    }

    /// Like [`mutate`](Self::mutate), capturing rollback values from the
    /// current view.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::NotFound`] if `id` is not in the collection,
    /// or [`MutationError::Backend`] if the backend call fails.
    pub async fn apply(
        &self,
        id: EntityId<B>,
        action: B::Action,
        patch: <B::Entity as Entity>::Patch,
    ) -> Result<B::Entity, MutationError<B::Error>> {
        let ticket = self
            .inner
            .update(|state| state.apply_patch(id.clone(), patch))
            .ok_or_else(|| MutationError::NotFound(format!("{:?}", id)))?;
        self.settle(id, action, ticket).await
    }

    async fn settle(
        &self,
        id: EntityId<B>,
        action: B::Action,
        ticket: MutationTicket<EntityId<B>>,
    ) -> Result<B::Entity, MutationError<B::Error>> {
        debug!(?id, ?action, "mutation sent");

        match self.inner.backend.mutate(&id, &action).await {
            Ok(record) => {
                self.inner.update(|state| {
                    if state.commit(&ticket) {
                        state.upsert(record.clone());
                    }
                });
                info!(?id, ?action, "mutation confirmed");
                Ok(record)
            }
            Err(e) => {
                self.inner.update(|state| state.rollback(&ticket));
                warn!(?id, ?action, error = %e, "mutation failed, rolled back");
                Err(MutationError::Backend(e))
            }
        }
    }

    /// Replaces one record from a push payload and publishes the view.
    pub fn upsert(&self, record: B::Entity) -> bool {
        self.inner.update(|state| state.upsert(record))
    }

    /// Removes one record and publishes the view.
    pub fn remove(&self, id: &EntityId<B>) -> bool {
        self.inner.update(|state| state.remove(id))
    }

    /// Asks the refresher task to refetch.
    ///
    /// Requests made while a refresh is running collapse into one.
    pub fn request_refresh(&self) {
        self.inner.refresh_requested.notify_one();
    }

    /// Registers handlers on `router` that request a refresh for each of
    /// `kinds`.
    pub fn refresh_on<E: Envelope>(
        &self,
        router: &EventRouter<E>,
        kinds: &[E::Kind],
    ) -> Vec<Subscription> {
        kinds
            .iter()
            .map(|&kind| {
                let inner: Weak<CollectionInner<B>> = Arc::downgrade(&self.inner);
                router.on(kind, move |_| {
                    if let Some(inner) = inner.upgrade() {
                        inner.refresh_requested.notify_one();
                    }
                    Ok(())
                })
            })
            .collect()
    }

    /// Spawns the task that serves refresh requests.
    ///
    /// The task stops once every handle to the collection is dropped.
    pub fn spawn_refresher(&self) -> JoinHandle<()> {
        let collection = Arc::downgrade(&self.inner);
        let requested = Arc::clone(&self.inner.refresh_requested);
        let mut view = self.inner.view.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = requested.notified() => {}
                    changed = view.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                let Some(inner) = collection.upgrade() else {
                    break;
                };
                if let Err(e) = (Self { inner }).refresh().await {
                    warn!(error = %e, "refresh failed");
                }
            }
            debug!("refresher stopped");
        })
    }

    /// Returns the current reconciled view.
    #[must_use]
    pub fn view(&self) -> Vec<B::Entity> {
        self.inner.view.borrow().clone()
    }

    /// Subscribes to view changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<B::Entity>> {
        self.inner.view.subscribe()
    }

    /// Returns the reconciled view of one record.
    #[must_use]
    pub fn get(&self, id: &EntityId<B>) -> Option<B::Entity> {
        self.inner.lock().get(id)
    }

    /// Returns true while a mutation on `id` is unsettled.
    #[must_use]
    pub fn is_pending(&self, id: &EntityId<B>) -> bool {
        self.inner.lock().is_pending(id)
    }

    /// Returns the number of unsettled mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending_count()
    }
}
