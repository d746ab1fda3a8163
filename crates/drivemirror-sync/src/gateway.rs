//! Remote query gateway
//!
//! Every listing call made by the sync layer goes through
//! [`RemoteQueryGateway::list_children`], which retries any failure with
//! exponential backoff plus random jitter. When the attempts run out the
//! caller gets [`SyncError::QueryFailed`], which means "remote state
//! unknown". Callers must not read it as "entry absent".
//!
//! Path resolution is live: each lookup walks the path from the root with
//! one listing per component.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use drivemirror_core::config::RetryConfig;
use drivemirror_core::domain::{DrivePath, NodeKind, RemoteId, RemoteNode};
use drivemirror_core::ports::{IRemoteStore, StoreError};

use crate::SyncError;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Backoff schedule for listing calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform random delay added to each backoff
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            jitter: config.jitter(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (0-based):
    /// `base * 2^attempt` plus up to `jitter`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff.saturating_add(Duration::from_millis(extra))
    }
}

// ============================================================================
// RemoteQueryGateway
// ============================================================================

/// Retrying front end for remote listings and live path resolution
pub struct RemoteQueryGateway {
    store: Arc<dyn IRemoteStore>,
    policy: RetryPolicy,
}

impl RemoteQueryGateway {
    pub fn new(store: Arc<dyn IRemoteStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The underlying store, for calls that are not retried
    pub fn store(&self) -> &Arc<dyn IRemoteStore> {
        &self.store
    }

    /// List the non-trashed children of `parent_id`
    ///
    /// # Errors
    /// [`SyncError::QueryFailed`] after `max_attempts` failed calls. No sleep
    /// follows the last attempt.
    #[tracing::instrument(skip(self), fields(parent = %parent_id))]
    pub async fn list_children(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, SyncError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = StoreError::Other("no attempt made".to_string());

        for attempt in 0..max_attempts {
            match self.store.list(parent_id).await {
                Ok(records) => {
                    if attempt > 0 {
                        info!(attempt, "Listing succeeded after retry");
                    }
                    return Ok(records.into_iter().map(|r| r.into_node()).collect());
                }
                Err(err) => {
                    if attempt + 1 < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            rate_limited = err.is_rate_limited(),
                            error = %err,
                            "Listing failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(attempt, error = %err, "Listing failed, giving up");
                    }
                    last_error = err;
                }
            }
        }

        Err(SyncError::QueryFailed {
            parent: parent_id.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    /// Find the child of `parent_id` called `name`, optionally restricted to
    /// one kind. The first match in listing order wins.
    pub async fn find_child(
        &self,
        parent_id: &RemoteId,
        name: &str,
        kind: Option<NodeKind>,
    ) -> Result<Option<RemoteNode>, SyncError> {
        let children = self.list_children(parent_id).await?;
        Ok(children
            .into_iter()
            .find(|c| c.name == name && kind.map_or(true, |k| c.kind() == k)))
    }

    /// Resolve `path` to a remote entry of any kind
    ///
    /// Every intermediate component must be a folder; the last one may be a
    /// file or a folder. The empty path resolves to the root.
    ///
    /// # Errors
    /// [`SyncError::NotFound`] if a component is missing,
    /// [`SyncError::QueryFailed`] if a listing ran out of retries.
    #[tracing::instrument(skip(self), fields(path = %path))]
    pub async fn locate(&self, path: &DrivePath) -> Result<RemoteNode, SyncError> {
        self.resolve(path, None).await
    }

    /// Resolve `path` to a remote folder
    #[tracing::instrument(skip(self), fields(path = %path))]
    pub async fn locate_folder(&self, path: &DrivePath) -> Result<RemoteNode, SyncError> {
        self.resolve(path, Some(NodeKind::Folder)).await
    }

    async fn resolve(
        &self,
        path: &DrivePath,
        last_kind: Option<NodeKind>,
    ) -> Result<RemoteNode, SyncError> {
        let components: Vec<&str> = path.components().collect();
        let mut current = RemoteNode::root();

        for (index, name) in components.iter().enumerate() {
            let kind = if index + 1 == components.len() {
                last_kind
            } else {
                Some(NodeKind::Folder)
            };
            current = self
                .find_child(&current.id, name, kind)
                .await?
                .ok_or_else(|| SyncError::NotFound(path.to_string()))?;
        }

        debug!(id = %current.id, "Resolved path");
        Ok(current)
    }
}
