//! Primary/backup alarm delivery
//!
//! ```text
//! Idle -> Sending -> Delivered
//!                 -> PrimaryFailed -> BackupSending -> Delivered
//!                                                   -> BackupFailed
//! ```
//!
//! The primary attempt is never retried. A failed primary hands its request to
//! the fallback policy exactly once, and the backup is only sent after the
//! primary outcome is known.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmRequest, PushMessage};
use crate::error::{DispatchError, Result};
use crate::fallback::BackupFallbackPolicy;
use crate::signer::{Channel, RequestSigner};
use crate::transport::AlarmTransport;

/// Position of one alarm submission in the delivery state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Sending,
    Delivered,
    PrimaryFailed,
    BackupSending,
    BackupFailed,
}

/// Result of a single attempt on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Delivered { status: u16 },
    Failed { reason: String },
}

/// Final outcome of one alarm submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    DeliveredPrimary,
    DeliveredBackup { primary_failure: String },
    BothFailed { primary: String, backup: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::BothFailed { .. })
    }

    /// Both-failed becomes an error, anything delivered stays a value
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::BothFailed { primary, backup } => {
                Err(DispatchError::BothChannelsFailed { primary, backup })
            },
            delivered => Ok(delivered),
        }
    }
}

/// Sends alarms on the primary channel and falls back to the backup variant
pub struct AlarmDispatcher {
    signer: Arc<RequestSigner>,
    transport: Arc<dyn AlarmTransport>,
    policy: BackupFallbackPolicy,
}

impl AlarmDispatcher {
    pub fn new(
        signer: Arc<RequestSigner>,
        transport: Arc<dyn AlarmTransport>,
        policy: BackupFallbackPolicy,
    ) -> Self {
        Self {
            signer,
            transport,
            policy,
        }
    }

    fn advance(state: &mut DispatchState, next: DispatchState) {
        debug!("alarm dispatch: {:?} -> {:?}", state, next);
        *state = next;
    }

    /// Sign and send one request on the alarm channel
    async fn attempt(&self, request: &AlarmRequest) -> AttemptOutcome {
        let envelope = match self.signer.sign_json(Channel::TriggerAlarm, request) {
            Ok(envelope) => envelope,
            Err(e) => {
                return AttemptOutcome::Failed {
                    reason: e.to_string(),
                }
            },
        };

        match self.transport.deliver(&envelope).await {
            Ok(status) => AttemptOutcome::Delivered { status },
            Err(e) => AttemptOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Run the full primary/backup pipeline for one request
    pub async fn dispatch(&self, request: AlarmRequest) -> DispatchOutcome {
        let mut state = DispatchState::Idle;

        Self::advance(&mut state, DispatchState::Sending);
        let primary_failure = match self.attempt(&request).await {
            AttemptOutcome::Delivered { status } => {
                Self::advance(&mut state, DispatchState::Delivered);
                info!(
                    "Alarm delivered on primary channel ({}), keyword {}",
                    status, request.keyword
                );
                return DispatchOutcome::DeliveredPrimary;
            },
            AttemptOutcome::Failed { reason } => {
                Self::advance(&mut state, DispatchState::PrimaryFailed);
                warn!("Primary alarm failed: {}. Switching to backup", reason);
                reason
            },
        };

        let backup = self.policy.backup_variant(&request);
        Self::advance(&mut state, DispatchState::BackupSending);
        match self.attempt(&backup).await {
            AttemptOutcome::Delivered { status } => {
                Self::advance(&mut state, DispatchState::Delivered);
                info!(
                    "Alarm delivered on backup channel ({}), keyword {}",
                    status, backup.keyword
                );
                DispatchOutcome::DeliveredBackup { primary_failure }
            },
            AttemptOutcome::Failed { reason } => {
                Self::advance(&mut state, DispatchState::BackupFailed);
                error!(
                    "Backup alarm failed as well: primary: {}; backup: {}",
                    primary_failure, reason
                );
                DispatchOutcome::BothFailed {
                    primary: primary_failure,
                    backup: reason,
                }
            },
        }
    }

    /// Send a push message; this channel has no backup
    pub async fn send_push(&self, message: &PushMessage) -> Result<u16> {
        let envelope = self.signer.sign_json(Channel::PushMessage, message)?;
        let status = self.transport.deliver(&envelope).await?;
        info!("Push delivered to {} group(s)", message.groups.len());
        Ok(status)
    }
}
