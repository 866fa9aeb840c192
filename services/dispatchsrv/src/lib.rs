//! Incident alarm dispatch service
//!
//! Resolves free-text places, signs alarms for the dispatch web service and
//! falls back to a test alarm when the live one fails. A background poller
//! keeps the responder roster fresh while a consumer watches it.

pub mod alarm;
pub mod api;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod places;
pub mod poller;
pub mod roster;
pub mod service;
pub mod signer;
pub mod transport;

pub use alarm::{AlarmComposer, AlarmForm, AlarmRequest, PushMessage};
pub use auth::AuthGate;
pub use config::DispatchConfig;
pub use dispatcher::{AlarmDispatcher, DispatchOutcome};
pub use error::{DispatchError, Result};
pub use fallback::BackupFallbackPolicy;
pub use places::{Place, PlaceResolver};
pub use poller::{RosterPoller, RosterSnapshot};
pub use roster::{IncidentView, RosterAggregator, RosterMode, RosterView};
pub use service::{DispatchService, OperationStatus};
pub use signer::{RequestSigner, SignedEnvelope};
