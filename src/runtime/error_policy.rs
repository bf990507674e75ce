//! # Error Policy
//!
//! Error handling and backoff for the controller watch loops.
//! Reconcile failures back off per resource; watch stream failures are
//! classified and decide whether the stream restarts.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::observability::metrics;
use crate::store::{kind_of, Object, ObjectStore};
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Key of a resource in the backoff table
#[must_use]
pub fn backoff_key<K: Object>(namespace: &str, name: &str) -> String {
    format!("{}/{namespace}/{name}", kind_of::<K>())
}

/// Handle a failed reconcile with exponential backoff
///
/// Backoff is tracked per resource so one failing object never slows down
/// the others. A successful pass clears it (see `watch_loop`).
pub fn handle_reconciliation_error<K, S>(
    obj: &K,
    error: &ReconcilerError,
    ctx: &Reconciler<S>,
) -> Action
where
    K: Object,
    S: ObjectStore,
{
    let kind = kind_of::<K>();
    let name = obj.meta().name.as_deref().unwrap_or("unknown");
    let namespace = obj.meta().namespace.as_deref().unwrap_or("default");
    let class = error.class();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.kind = %kind,
        resource.name = name,
        resource.namespace = namespace,
        error.class = class,
    );
    let _error_guard = error_span.enter();

    match error {
        ReconcilerError::DeletionBlocked(_) | ReconcilerError::Cancelled => {
            warn!("⚠️  {kind} {namespace}/{name}: {error}");
        }
        _ => error!("❌ Reconciliation error for {kind} {namespace}/{name}: {error:?}"),
    }
    metrics::increment_reconciliation_errors(&kind, class);

    let (delay, error_count) = ctx.next_backoff(&backoff_key::<K>(namespace, name));
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "🔄 Retrying with exponential backoff: {}ms (error count: {}, trigger source: error-backoff)",
        delay.as_millis(),
        error_count
    );
    info!(
        "📅 Next retry scheduled: {} (trigger source: error-backoff)",
        next_trigger_time.to_rfc3339()
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// How a watch stream error should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

impl WatchErrorClass {
    /// Classify from the rendered error text
    ///
    /// 404 is checked before 401 since a plain-text 404 body surfaces as a
    /// deserialization error that also mentions the failed watch.
    #[must_use]
    pub fn classify(error_string: &str) -> Self {
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        let is_401 = (error_string.contains("401") || error_string.contains("Unauthorized"))
            && !is_not_found;
        let is_410 = error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone");
        let is_429 = error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests");

        if is_401 {
            WatchErrorClass::Unauthorized
        } else if is_410 {
            WatchErrorClass::Expired
        } else if is_429 {
            WatchErrorClass::Throttled
        } else if is_not_found {
            WatchErrorClass::NotFound
        } else {
            WatchErrorClass::Other
        }
    }
}

/// Handle a watch stream error
///
/// Returns `None` to drop the item and let the stream restart, `Some(())`
/// to keep going.
pub async fn handle_watch_stream_error(
    kind: &str,
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorClass::classify(error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                "❌ Watch on {kind} failed with 401 Unauthorized - RBAC may have been revoked or the token expired"
            );
            error!("🔍 Check that the operator ServiceAccount can still list and watch {kind}");
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorClass::Expired => {
            warn!("Watch resource version for {kind} expired (410), watch will restart");
            None
        }
        WatchErrorClass::Throttled => {
            let current = backoff.load(Ordering::Relaxed);
            warn!(
                "API server throttling {kind} watch (429), backing off for {}ms before restart...",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            None
        }
        WatchErrorClass::NotFound => {
            warn!(
                "{kind} not found (404) - normal after deletion, or the CRD is not installed. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorClass::Other => {
            error!("Controller stream error for {kind}: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::ReferenceIndex;
    use crate::crd::{McpGroup, McpGroupSpec};
    use crate::store::MemoryStore;

    #[test]
    fn test_watch_error_classification() {
        assert_eq!(
            WatchErrorClass::classify("ApiError: Unauthorized (401)"),
            WatchErrorClass::Unauthorized
        );
        assert_eq!(
            WatchErrorClass::classify("WatchFailed: invalid type: integer `404`"),
            WatchErrorClass::NotFound
        );
        assert_eq!(
            WatchErrorClass::classify("too old resource version: 12 (34)"),
            WatchErrorClass::Expired
        );
        assert_eq!(
            WatchErrorClass::classify("storage is (re)initializing"),
            WatchErrorClass::Throttled
        );
        assert_eq!(WatchErrorClass::classify("connection reset"), WatchErrorClass::Other);
    }

    #[test]
    fn test_backoff_grows_per_resource() {
        let config = ControllerConfig {
            backoff_start_ms: 100,
            backoff_max_ms: 250,
            ..ControllerConfig::default()
        };
        let ctx = Reconciler::new(Arc::new(MemoryStore::new()), ReferenceIndex::new(), config);
        let mut group = McpGroup::new("eng", McpGroupSpec::default());
        group.metadata.namespace = Some("default".to_string());
        let error = ReconcilerError::ReconciliationFailed(anyhow::anyhow!("boom"));

        let first = handle_reconciliation_error(&group, &error, &ctx);
        let second = handle_reconciliation_error(&group, &error, &ctx);
        let third = handle_reconciliation_error(&group, &error, &ctx);
        assert_eq!(first, Action::requeue(Duration::from_millis(100)));
        assert_eq!(second, Action::requeue(Duration::from_millis(200)));
        assert_eq!(third, Action::requeue(Duration::from_millis(250)));

        assert!(ctx.reset_backoff(&backoff_key::<McpGroup>("default", "eng")));
        let after_reset = handle_reconciliation_error(&group, &error, &ctx);
        assert_eq!(after_reset, Action::requeue(Duration::from_millis(100)));
    }
}
