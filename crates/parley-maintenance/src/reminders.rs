//! Resolution reminders.
//!
//! A prediction past its resolution date earns its creator an email nudge,
//! bounded by the prediction's reminder history: once any attempt succeeds
//! we stop, after three failed attempts we give up, and a creator with no
//! usable address is marked skipped so we never reconsider them.

use parley_core::time::Clock;
use parley_core::{
    MarketError, MarketResult, Notifier, Prediction, PredictionId, ReminderAttempt,
};
use parley_store::WorldStore;
use std::sync::Arc;
use std::time::Duration;

const MAX_FAILED_ATTEMPTS: usize = 3;

/// Does this prediction currently warrant a reminder?
pub fn prediction_needs_reminder(now: i64, prediction: &Prediction) -> bool {
    let history = &prediction.reminders;
    prediction.resolves_at_unixtime < now
        && !history.skipped
        && !history.attempts.iter().any(|a| a.succeeded)
        && history.attempts.len() < MAX_FAILED_ATTEMPTS
}

/// Check one prediction and, if due, send the reminder and record the
/// outcome. The send happens outside any transaction; only the history
/// append goes through `atomically`.
pub async fn send_reminder_if_due<S: WorldStore>(
    store: &S,
    notifier: &Arc<dyn Notifier>,
    now: i64,
    prediction_id: PredictionId,
) -> MarketResult<()> {
    let ws = store.read()?;
    let prediction = ws
        .predictions
        .get(&prediction_id)
        .ok_or_else(|| MarketError::not_found("no such prediction"))?;
    if !prediction_needs_reminder(now, prediction) {
        return Ok(());
    }

    let address = match ws.user(&prediction.creator) {
        Some(info) => info.reminder_address().map(str::to_owned),
        None => {
            tracing::error!(%prediction_id, creator = %prediction.creator,
                "prediction has nonexistent creator");
            return Ok(());
        }
    };

    match address {
        None => {
            // No usable address: never reconsider this prediction.
            store.atomically(|ws| {
                if let Some(p) = ws.predictions.get_mut(&prediction_id) {
                    p.reminders.skipped = true;
                }
                Ok(())
            })
        }
        Some(to) => {
            let succeeded = match notifier
                .send_resolution_reminder(to.clone(), prediction_id, prediction.clone())
                .await
            {
                Ok(()) => true,
                Err(error) => {
                    tracing::error!(%error, %to, %prediction_id,
                        "failed to send resolution reminder");
                    false
                }
            };
            store.atomically(|ws| {
                if let Some(p) = ws.predictions.get_mut(&prediction_id) {
                    p.reminders.attempts.push(ReminderAttempt {
                        unixtime: now,
                        succeeded,
                    });
                }
                Ok(())
            })
        }
    }
}

/// Hourly sweep over every prediction.
pub async fn remind_forever<S: WorldStore>(
    store: S,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) {
    loop {
        tracing::info!("waking up to send resolution reminders");
        let cycle_start = clock.now_unixtime();
        let ids: Vec<PredictionId> = match store.read() {
            Ok(ws) => ws.predictions.keys().copied().collect(),
            Err(error) => {
                tracing::error!(%error, "reminder sweep could not read the store");
                Vec::new()
            }
        };
        for id in ids {
            if let Err(error) =
                send_reminder_if_due(&store, &notifier, clock.now_unixtime(), id).await
            {
                tracing::error!(%error, prediction_id = %id, "reminder check failed");
            }
        }

        let elapsed = (clock.now_unixtime() - cycle_start).max(0) as u64;
        if elapsed > interval.as_secs() / 2 {
            tracing::warn!(elapsed, "resolution-reminder sweep took dangerously long");
        }
        tokio::time::sleep(interval.saturating_sub(Duration::from_secs(elapsed))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parley_core::{
        Certainty, EmailFlowState, PasswordHash, Prediction, ReminderHistory, UserRecord,
        Username, Violation, WorldState,
    };
    use parley_store::MemoryStore;

    fn prediction(resolves_at: i64) -> Prediction {
        Prediction {
            statement: "it rains".to_owned(),
            certainty: Certainty { low: 0.5, high: 0.5 },
            maximum_stake_cents: 1000,
            created_unixtime: 0,
            closes_unixtime: 10,
            resolves_at_unixtime: resolves_at,
            special_rules: String::new(),
            creator: Username::from("alice"),
            trades: vec![],
            resolutions: vec![],
            reminders: ReminderHistory::default(),
        }
    }

    #[test]
    fn not_due_before_resolution_date() {
        assert!(!prediction_needs_reminder(99, &prediction(100)));
        assert!(prediction_needs_reminder(101, &prediction(100)));
    }

    #[test]
    fn skipped_and_exhausted_histories_are_not_due() {
        let mut p = prediction(100);
        p.reminders.skipped = true;
        assert!(!prediction_needs_reminder(101, &p));

        let mut p = prediction(100);
        for _ in 0..3 {
            p.reminders.attempts.push(ReminderAttempt {
                unixtime: 101,
                succeeded: false,
            });
        }
        assert!(!prediction_needs_reminder(101, &p));
    }

    #[test]
    fn one_success_silences_future_reminders() {
        let mut p = prediction(100);
        p.reminders.attempts.push(ReminderAttempt {
            unixtime: 101,
            succeeded: true,
        });
        assert!(!prediction_needs_reminder(102, &p));
    }

    /// Records reminder recipients.
    #[derive(Default)]
    struct RecordingNotifier {
        reminders: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_resolution_notifications(
            &self,
            _bccs: Vec<String>,
            _prediction_id: PredictionId,
            _prediction: Prediction,
        ) -> MarketResult<()> {
            Ok(())
        }

        async fn send_email_verification(&self, _to: String, _code: String) -> MarketResult<()> {
            Ok(())
        }

        async fn send_resolution_reminder(
            &self,
            to: String,
            _prediction_id: PredictionId,
            _prediction: Prediction,
        ) -> MarketResult<()> {
            self.reminders.lock().push(to);
            Ok(())
        }

        async fn send_backup(
            &self,
            _to: String,
            _now_unixtime: i64,
            _blob: Vec<u8>,
        ) -> MarketResult<()> {
            Ok(())
        }

        async fn send_invariant_violations(
            &self,
            _to: String,
            _now_unixtime: i64,
            _violations: Vec<Violation>,
        ) -> MarketResult<()> {
            Ok(())
        }
    }

    fn store_with(verified_creator: bool) -> MemoryStore {
        let mut ws = WorldState::default();
        let mut alice = UserRecord::with_password(PasswordHash::default());
        if verified_creator {
            alice.email = EmailFlowState::Verified("alice@example.com".to_owned());
            alice.email_reminders_to_resolve = true;
        }
        ws.users.insert(Username::from("alice"), alice);
        ws.predictions.insert(PredictionId(1), prediction(100));
        MemoryStore::with_state(ws)
    }

    #[tokio::test]
    async fn due_reminder_is_sent_and_recorded() {
        let store = store_with(true);
        let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());
        send_reminder_if_due(&store, &notifier, 101, PredictionId(1))
            .await
            .unwrap();

        let ws = store.read().unwrap();
        let history = &ws.predictions[&PredictionId(1)].reminders;
        assert_eq!(history.attempts.len(), 1);
        assert!(history.attempts[0].succeeded);
        assert!(!history.skipped);

        // A second sweep is silenced by the successful attempt.
        send_reminder_if_due(&store, &notifier, 200, PredictionId(1))
            .await
            .unwrap();
        assert_eq!(
            store.read().unwrap().predictions[&PredictionId(1)]
                .reminders
                .attempts
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn creator_without_address_is_marked_skipped() {
        let store = store_with(false);
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn Notifier> = recorder.clone();
        send_reminder_if_due(&store, &notifier, 101, PredictionId(1))
            .await
            .unwrap();

        let ws = store.read().unwrap();
        assert!(ws.predictions[&PredictionId(1)].reminders.skipped);
        assert!(recorder.reminders.lock().is_empty());
    }
}
