//! The invariant auditor.

use parley_core::{Notifier, Violation, ViolationKind, WorldState};
use parley_store::WorldStore;
use std::sync::Arc;
use std::time::Duration;

/// Walk the whole state; for each prediction, sum creator-side stake on
/// each side independently and flag any sum above the declared maximum.
/// Never mutates anything.
pub fn find_invariant_violations(ws: &WorldState) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (id, prediction) in &ws.predictions {
        for versus_skeptics in [true, false] {
            if prediction.creator_exposure_cents(versus_skeptics)
                > prediction.maximum_stake_cents
            {
                violations.push(Violation {
                    kind: ViolationKind::ExposureExceeded,
                    prediction_id: *id,
                });
            }
        }
    }
    violations
}

/// Hourly scan; alerts `recipient` whenever the scan finds anything.
pub async fn audit_forever<S: WorldStore>(
    store: S,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn parley_core::Clock>,
    recipient: String,
) {
    let interval = Duration::from_secs(3600);
    loop {
        tokio::time::sleep(interval).await;
        tracing::info!("checking invariants");
        let violations = match store.read() {
            Ok(ws) => find_invariant_violations(&ws),
            Err(error) => {
                tracing::error!(%error, "invariant scan could not read the store");
                continue;
            }
        };
        if violations.is_empty() {
            continue;
        }
        tracing::error!(count = violations.len(), "invariant violations found");
        if let Err(error) = notifier
            .send_invariant_violations(recipient.clone(), clock.now_unixtime(), violations)
            .await
        {
            tracing::error!(%error, "failed to send invariant-violation alert");
        }
    }
}
