//! Turns threshold crossings into directives on the right channel.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rampart_proto::Directive;
use rampart_reputation::{Crossing, CrossingEvent};

use crate::link::DeliveryOutcome;
use crate::registry::ConnectionRegistry;

/// Delivers crossing decisions to the owning tenant's live channel.
///
/// Idempotence lives here: a block is only sent when the channel's rule
/// state says the agent does not already have the rule, and an unblock only
/// when it does. A tenant without a channel drops the directive — there is
/// no queueing for offline agents, because the next observed event
/// re-derives the decision from current weight.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher resolves channels from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Handle one crossing. Resolves the channel, applies rule-state
    /// idempotence, and delivers.
    ///
    /// Callers that must not block on agent I/O (the engine and the
    /// sweeper's loop) spawn this onto the runtime.
    pub async fn on_crossing(&self, event: CrossingEvent) {
        let Some(link) = self.registry.lookup(event.tenant) else {
            debug!(
                tenant = %event.tenant,
                ip = %event.ip,
                crossing = ?event.crossing,
                "No connected agent; directive dropped"
            );
            return;
        };

        match event.crossing {
            Crossing::Block => {
                if link.rules().is_applied(event.ip) {
                    debug!(tenant = %event.tenant, ip = %event.ip, "Block already applied");
                    return;
                }

                let outcome = link.deliver(Directive::block(event.ip)).await;
                // Recorded after the attempt either way: the agent may have
                // applied the rule even if the acknowledgement was lost, and
                // re-sending a duplicate block is worse than trusting the
                // next unblock crossing to reconcile.
                link.rules().mark_applied(event.ip);

                log_outcome("block", &event, outcome);
            }
            Crossing::Unblock => {
                if !link.rules().is_applied(event.ip) {
                    debug!(tenant = %event.tenant, ip = %event.ip, "No block rule to release");
                    return;
                }

                let outcome = link.deliver(Directive::unblock(event.ip)).await;
                link.rules().clear(event.ip);

                log_outcome("unblock", &event, outcome);
            }
            Crossing::LowWeight => {
                let outcome = link
                    .deliver(Directive::low_weight(event.ip, event.weight))
                    .await;
                log_outcome("low-weight advisory", &event, outcome);
            }
        }
    }
}

fn log_outcome(kind: &str, event: &CrossingEvent, outcome: DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Acknowledged | DeliveryOutcome::Sent => {
            info!(
                tenant = %event.tenant,
                ip = %event.ip,
                weight = event.weight,
                "Delivered {kind} directive"
            );
        }
        DeliveryOutcome::Dropped => {
            warn!(
                tenant = %event.tenant,
                ip = %event.ip,
                "Dropped {kind} directive after exhausting retries"
            );
        }
        DeliveryOutcome::Closed => {
            warn!(
                tenant = %event.tenant,
                ip = %event.ip,
                "Channel closed while delivering {kind} directive"
            );
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
