//! Daily world-state backups.

use parley_core::time::Clock;
use parley_core::Notifier;
use parley_store::WorldStore;
use std::sync::Arc;
use std::time::Duration;

/// Once a day, snapshot the state, serialize it, and hand the blob to the
/// notifier. The read is a plain snapshot; no lock is held while sending.
pub async fn backup_forever<S: WorldStore>(
    store: S,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    recipient: String,
) {
    let interval = Duration::from_secs(86_400);
    loop {
        tokio::time::sleep(interval).await;
        tracing::info!("emailing backup");
        let blob = match store.read().map(|ws| postcard::to_allocvec(&ws)) {
            Ok(Ok(blob)) => blob,
            Ok(Err(error)) => {
                tracing::error!(%error, "backup serialization failed");
                continue;
            }
            Err(error) => {
                tracing::error!(%error, "backup could not read the store");
                continue;
            }
        };
        if let Err(error) = notifier
            .send_backup(recipient.clone(), clock.now_unixtime(), blob)
            .await
        {
            tracing::error!(%error, "failed to send backup");
        }
    }
}
