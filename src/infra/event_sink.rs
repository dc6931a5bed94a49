use async_trait::async_trait;

use crate::application::ports::billing_events::{BillingEvent, BillingEventSink};

/// Emits billing events as structured log lines.
///
/// Events that need follow-up are logged at warn so they surface in alerting.
#[derive(Clone, Default)]
pub struct TracingEventSink;

#[async_trait]
impl BillingEventSink for TracingEventSink {
    async fn emit(&self, event: BillingEvent) {
        let name = event.name();
        if event.needs_attention() {
            tracing::warn!(event = name, details = ?event, "Billing event needs attention");
        } else {
            tracing::info!(event = name, details = ?event, "Billing event");
        }
    }
}
