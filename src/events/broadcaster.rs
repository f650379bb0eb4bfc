//! # Event Broadcaster
//!
//! Fan-out of [`BroadcastEvent`]s to filtered subscriptions. Each delivery runs in its
//! own task under a timeout, so a failing or slow subscriber never affects the
//! publisher or the other subscribers. The broadcaster also keeps a bounded history
//! and a table of pollable progress operations, and forwards terminal milestones to
//! an optional [`SystemEventBus`].

use super::types::{BroadcastEvent, EventKind, EventQuery, EventSeverity, ProgressOperation, Subscription};
use crate::collaborators::{SystemEvent, SystemEventBus};
use crate::config::EventsConfig;
use crate::models::{FeatureId, FeatureStatus};
use crate::recovery::RecoverySession;
use crate::resources::CleanupReport;
use crate::state_machine::LifecycleStage;
use crate::utils::time::retention_cutoff;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

/// Receiver side of a subscription
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn on_event(&self, event: &BroadcastEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

struct SubscriptionEntry {
    subscription: Subscription,
    subscriber: Arc<dyn EventSubscriber>,
    counters: Arc<DeliveryCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    pub subscription_id: Uuid,
    pub subscriber_id: String,
    pub delivered: u64,
    pub failed: u64,
}

pub struct EventBroadcaster {
    config: EventsConfig,
    subscriptions: RwLock<HashMap<Uuid, SubscriptionEntry>>,
    history: Mutex<VecDeque<BroadcastEvent>>,
    progress: DashMap<String, ProgressOperation>,
    deliveries: Mutex<JoinSet<()>>,
    system_bus: Option<Arc<dyn SystemEventBus>>,
    published: AtomicU64,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriptions", &self.subscriptions.read().len())
            .field("history", &self.history.lock().len())
            .field("published", &self.published.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventBroadcaster {
    pub fn new(config: EventsConfig) -> Self {
        Self {
            config,
            subscriptions: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            progress: DashMap::new(),
            deliveries: Mutex::new(JoinSet::new()),
            system_bus: None,
            published: AtomicU64::new(0),
        }
    }

    pub fn with_system_bus(mut self, bus: Arc<dyn SystemEventBus>) -> Self {
        self.system_bus = Some(bus);
        self
    }

    pub fn subscribe(&self, subscription: Subscription, subscriber: Arc<dyn EventSubscriber>) -> Uuid {
        let id = subscription.id;
        debug!(
            subscription_id = %id,
            subscriber_id = %subscription.subscriber_id,
            "Subscription registered"
        );
        self.subscriptions.write().insert(
            id,
            SubscriptionEntry {
                subscription,
                subscriber,
                counters: Arc::default(),
            },
        );
        id
    }

    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.subscriptions.write().remove(&subscription_id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Record the event and dispatch it to every matching subscription.
    ///
    /// Returns how many subscriptions it was dispatched to. Delivery itself is
    /// asynchronous; [`flush`](Self::flush) waits for in-flight deliveries.
    pub async fn publish(&self, event: BroadcastEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock();
            history.push_back(event.clone());
            while history.len() > self.config.max_history {
                history.pop_front();
            }
        }

        let event = Arc::new(event);
        let timeout = self.config.delivery_timeout();
        let mut dispatched = 0;
        {
            let subscriptions = self.subscriptions.read();
            let mut deliveries = self.deliveries.lock();
            while deliveries.try_join_next().is_some() {}

            for entry in subscriptions.values().filter(|e| e.subscription.matches(&event)) {
                dispatched += 1;
                let subscriber = Arc::clone(&entry.subscriber);
                let counters = Arc::clone(&entry.counters);
                let subscription_id = entry.subscription.id;
                let event = Arc::clone(&event);
                deliveries.spawn(deliver(subscriber, counters, subscription_id, event, timeout));
            }
        }

        if event.kind.is_forwarded() && self.config.forward_to_system_bus {
            self.forward(&event).await;
        }
        dispatched
    }

    /// Wait until every delivery dispatched so far has finished
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.deliveries.lock());
        while pending.join_next().await.is_some() {}
    }

    async fn forward(&self, event: &BroadcastEvent) {
        let Some(bus) = &self.system_bus else {
            return;
        };
        let system_event = SystemEvent {
            topic: event.kind.system_topic(),
            payload: json!({
                "event_id": event.id,
                "feature_id": event.feature_id,
                "severity": event.severity,
                "correlation_id": event.correlation_id,
                "data": event.data,
            }),
            timestamp: event.timestamp,
        };
        match tokio::time::timeout(self.config.delivery_timeout(), bus.publish(system_event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(kind = %event.kind, error = %e, "System bus publish failed"),
            Err(_) => warn!(kind = %event.kind, "System bus publish timed out"),
        }
    }

    /// Events from history matching the query, oldest first
    pub fn history(&self, query: &EventQuery) -> Vec<BroadcastEvent> {
        let history = self.history.lock();
        let mut matched: Vec<BroadcastEvent> =
            history.iter().filter(|e| query.matches(e)).cloned().collect();
        if let Some(limit) = query.limit {
            let excess = matched.len().saturating_sub(limit);
            matched.drain(..excess);
        }
        matched
    }

    /// Drop history older than the cutoff and finished progress operations with it
    pub fn prune_history(&self, older_than: Duration) -> usize {
        let cutoff = retention_cutoff(older_than);
        let removed = {
            let mut history = self.history.lock();
            let before = history.len();
            history.retain(|event| event.timestamp >= cutoff);
            before - history.len()
        };
        self.progress
            .retain(|_, op| !(op.completed && op.updated_at < cutoff));
        removed
    }

    pub fn subscription_stats(&self) -> Vec<SubscriptionStats> {
        let mut stats: Vec<SubscriptionStats> = self
            .subscriptions
            .read()
            .values()
            .map(|entry| SubscriptionStats {
                subscription_id: entry.subscription.id,
                subscriber_id: entry.subscription.subscriber_id.clone(),
                delivered: entry.counters.delivered.load(Ordering::Relaxed),
                failed: entry.counters.failed.load(Ordering::Relaxed),
            })
            .collect();
        stats.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        stats
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    // Progress operations

    pub fn start_progress(
        &self,
        operation_id: impl Into<String>,
        feature_id: Option<FeatureId>,
        message: Option<String>,
    ) -> ProgressOperation {
        let operation = ProgressOperation::new(operation_id.into(), feature_id, message);
        self.progress
            .insert(operation.operation_id.clone(), operation.clone());
        operation
    }

    /// Returns false when the operation is unknown or already completed
    pub fn update_progress(
        &self,
        operation_id: &str,
        percentage: f32,
        stage: Option<String>,
        message: Option<String>,
    ) -> bool {
        match self.progress.get_mut(operation_id) {
            Some(mut op) if !op.completed => {
                op.percentage = percentage.clamp(0.0, 100.0);
                if stage.is_some() {
                    op.stage = stage;
                }
                if message.is_some() {
                    op.message = message;
                }
                op.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn complete_progress(&self, operation_id: &str, success: bool, message: Option<String>) -> bool {
        match self.progress.get_mut(operation_id) {
            Some(mut op) if !op.completed => {
                op.completed = true;
                op.success = Some(success);
                if success {
                    op.percentage = 100.0;
                }
                if message.is_some() {
                    op.message = message;
                }
                op.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn get_progress(&self, operation_id: &str) -> Option<ProgressOperation> {
        self.progress.get(operation_id).map(|op| op.clone())
    }

    pub fn active_progress(&self) -> Vec<ProgressOperation> {
        let mut active: Vec<ProgressOperation> = self
            .progress
            .iter()
            .filter(|op| !op.completed)
            .map(|op| op.clone())
            .collect();
        active.sort_by_key(|op| op.started_at);
        active
    }

    // Canonical milestones

    pub async fn emit_deactivation_started(&self, feature_id: &FeatureId, operation_id: Uuid) {
        self.emit(
            EventKind::DeactivationStarted,
            feature_id,
            EventSeverity::Info,
            operation_id,
            json!({}),
        )
        .await;
    }

    pub async fn emit_deactivation_progress(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        stage: LifecycleStage,
        percentage: f32,
    ) {
        self.emit(
            EventKind::DeactivationProgress,
            feature_id,
            EventSeverity::Debug,
            operation_id,
            json!({ "stage": stage, "percentage": percentage }),
        )
        .await;
    }

    pub async fn emit_deactivation_completed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        duration_ms: Option<i64>,
    ) {
        self.emit(
            EventKind::DeactivationCompleted,
            feature_id,
            EventSeverity::Info,
            operation_id,
            json!({ "duration_ms": duration_ms }),
        )
        .await;
    }

    pub async fn emit_deactivation_failed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        stage: LifecycleStage,
        error: &str,
    ) {
        self.emit(
            EventKind::DeactivationFailed,
            feature_id,
            EventSeverity::Error,
            operation_id,
            json!({ "stage": stage, "error": error }),
        )
        .await;
    }

    pub async fn emit_activation_started(&self, feature_id: &FeatureId, operation_id: Uuid) {
        self.emit(
            EventKind::ActivationStarted,
            feature_id,
            EventSeverity::Info,
            operation_id,
            json!({}),
        )
        .await;
    }

    pub async fn emit_activation_completed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        duration_ms: Option<i64>,
    ) {
        self.emit(
            EventKind::ActivationCompleted,
            feature_id,
            EventSeverity::Info,
            operation_id,
            json!({ "duration_ms": duration_ms }),
        )
        .await;
    }

    pub async fn emit_activation_failed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        stage: LifecycleStage,
        error: &str,
    ) {
        self.emit(
            EventKind::ActivationFailed,
            feature_id,
            EventSeverity::Error,
            operation_id,
            json!({ "stage": stage, "error": error }),
        )
        .await;
    }

    pub async fn emit_recovery_started(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        stage: LifecycleStage,
        error: &str,
    ) {
        self.emit(
            EventKind::RecoveryStarted,
            feature_id,
            EventSeverity::Warning,
            operation_id,
            json!({ "stage": stage, "error": error }),
        )
        .await;
    }

    pub async fn emit_recovery_completed(&self, session: &RecoverySession) {
        let severity = if session.is_recovered() {
            EventSeverity::Info
        } else {
            EventSeverity::Error
        };
        let mut event = BroadcastEvent::new(
            EventKind::RecoveryCompleted,
            Some(session.feature_id.clone()),
            severity,
        )
        .with_data(json!({
            "session_id": session.id,
            "status": session.status,
            "category": session.category,
            "severity": session.severity,
            "directive": session.directive,
            "attempts": session.attempts.len(),
        }));
        if let Some(operation_id) = session.operation_id {
            event = event.with_correlation_id(operation_id.to_string());
        }
        self.publish(event).await;
    }

    pub async fn emit_cleanup_started(&self, feature_id: &FeatureId, operation_id: Uuid) {
        self.emit(
            EventKind::CleanupStarted,
            feature_id,
            EventSeverity::Debug,
            operation_id,
            json!({}),
        )
        .await;
    }

    pub async fn emit_cleanup_completed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        report: &CleanupReport,
    ) {
        let severity = if report.success {
            EventSeverity::Info
        } else {
            EventSeverity::Warning
        };
        self.emit(
            EventKind::CleanupCompleted,
            feature_id,
            severity,
            operation_id,
            json!({
                "success": report.success,
                "items_cleaned": report.total_items_cleaned,
                "memory_freed_bytes": report.memory_freed_bytes,
                "errors": report.errors(),
            }),
        )
        .await;
    }

    pub async fn emit_rollback_completed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        success: bool,
        restarted: usize,
    ) {
        let severity = if success {
            EventSeverity::Warning
        } else {
            EventSeverity::Critical
        };
        self.emit(
            EventKind::RollbackCompleted,
            feature_id,
            severity,
            operation_id,
            json!({ "success": success, "restarted": restarted }),
        )
        .await;
    }

    pub async fn emit_feature_state_changed(
        &self,
        feature_id: &FeatureId,
        operation_id: Uuid,
        old_status: Option<FeatureStatus>,
        new_status: FeatureStatus,
    ) {
        self.emit(
            EventKind::FeatureStateChanged,
            feature_id,
            EventSeverity::Info,
            operation_id,
            json!({ "old_status": old_status, "new_status": new_status }),
        )
        .await;
    }

    async fn emit(
        &self,
        kind: EventKind,
        feature_id: &FeatureId,
        severity: EventSeverity,
        operation_id: Uuid,
        data: serde_json::Value,
    ) {
        let event = BroadcastEvent::new(kind, Some(feature_id.clone()), severity)
            .with_data(data)
            .with_correlation_id(operation_id.to_string());
        self.publish(event).await;
    }
}

async fn deliver(
    subscriber: Arc<dyn EventSubscriber>,
    counters: Arc<DeliveryCounters>,
    subscription_id: Uuid,
    event: Arc<BroadcastEvent>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, subscriber.on_event(&event)).await {
        Ok(Ok(())) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(%subscription_id, kind = %event.kind, error = %e, "Subscriber failed to handle event");
        }
        Err(_) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(%subscription_id, kind = %event.kind, "Subscriber timed out");
        }
    }
}
