//! Notification effect interface.
//!
//! The outbound-email boundary. Implementations live outside this
//! workspace; the ledger and maintenance loops only ever dispatch through
//! this trait, fire-and-forget, after their transaction has committed;
//! the write lock is never held across network I/O.

use crate::errors::MarketResult;
use crate::idents::PredictionId;
use crate::model::Prediction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One ledger inconsistency found by the invariant auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub prediction_id: PredictionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Creator-side exposure on one side exceeds the declared maximum.
    ExposureExceeded,
}

/// Async fire-and-forget notification sends.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Blind-copied fan-out to stakeholders after a resolution event.
    async fn send_resolution_notifications(
        &self,
        bccs: Vec<String>,
        prediction_id: PredictionId,
        prediction: Prediction,
    ) -> MarketResult<()>;

    /// The code a user must echo back to verify an address.
    async fn send_email_verification(&self, to: String, code: String) -> MarketResult<()>;

    /// Nudge a creator whose prediction is past its resolution date.
    async fn send_resolution_reminder(
        &self,
        to: String,
        prediction_id: PredictionId,
        prediction: Prediction,
    ) -> MarketResult<()>;

    /// Periodic serialized snapshot of the whole world-state.
    async fn send_backup(&self, to: String, now_unixtime: i64, blob: Vec<u8>) -> MarketResult<()>;

    /// Alert on auditor findings.
    async fn send_invariant_violations(
        &self,
        to: String,
        now_unixtime: i64,
        violations: Vec<Violation>,
    ) -> MarketResult<()>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_resolution_notifications(
        &self,
        bccs: Vec<String>,
        prediction_id: PredictionId,
        prediction: Prediction,
    ) -> MarketResult<()> {
        (**self)
            .send_resolution_notifications(bccs, prediction_id, prediction)
            .await
    }

    async fn send_email_verification(&self, to: String, code: String) -> MarketResult<()> {
        (**self).send_email_verification(to, code).await
    }

    async fn send_resolution_reminder(
        &self,
        to: String,
        prediction_id: PredictionId,
        prediction: Prediction,
    ) -> MarketResult<()> {
        (**self)
            .send_resolution_reminder(to, prediction_id, prediction)
            .await
    }

    async fn send_backup(&self, to: String, now_unixtime: i64, blob: Vec<u8>) -> MarketResult<()> {
        (**self).send_backup(to, now_unixtime, blob).await
    }

    async fn send_invariant_violations(
        &self,
        to: String,
        now_unixtime: i64,
        violations: Vec<Violation>,
    ) -> MarketResult<()> {
        (**self)
            .send_invariant_violations(to, now_unixtime, violations)
            .await
    }
}

/// Logs and drops every send. The default for tests and for deployments
/// without an email provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_resolution_notifications(
        &self,
        bccs: Vec<String>,
        prediction_id: PredictionId,
        _prediction: Prediction,
    ) -> MarketResult<()> {
        tracing::debug!(%prediction_id, recipients = bccs.len(), "dropping resolution notifications");
        Ok(())
    }

    async fn send_email_verification(&self, to: String, _code: String) -> MarketResult<()> {
        tracing::debug!(%to, "dropping email verification");
        Ok(())
    }

    async fn send_resolution_reminder(
        &self,
        to: String,
        prediction_id: PredictionId,
        _prediction: Prediction,
    ) -> MarketResult<()> {
        tracing::debug!(%to, %prediction_id, "dropping resolution reminder");
        Ok(())
    }

    async fn send_backup(&self, to: String, _now_unixtime: i64, blob: Vec<u8>) -> MarketResult<()> {
        tracing::debug!(%to, bytes = blob.len(), "dropping backup");
        Ok(())
    }

    async fn send_invariant_violations(
        &self,
        to: String,
        _now_unixtime: i64,
        violations: Vec<Violation>,
    ) -> MarketResult<()> {
        tracing::debug!(%to, count = violations.len(), "dropping invariant-violation alert");
        Ok(())
    }
}
