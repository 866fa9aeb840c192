//! Caller-facing operations
//!
//! Every entry point that signs, sends or fetches checks the caller key first.
//! A rejected key returns before any upstream traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use common::{ComponentHealth, HealthStatus};
use serde::Serialize;
use tracing::{debug, info};

use crate::alarm::{AlarmComposer, AlarmForm, AlarmRequest, PushMessage};
use crate::auth::AuthGate;
use crate::config::{DispatchConfig, PushGroup};
use crate::dispatcher::{AlarmDispatcher, DispatchOutcome};
use crate::error::Result;
use crate::fallback::BackupFallbackPolicy;
use crate::places::{Place, PlaceResolver};
use crate::poller::{RosterPoller, RosterSnapshot};
use crate::roster::{HttpWidgetClient, IncidentView, RosterAggregator, RosterView, WidgetSource};
use crate::signer::{IdentityTokens, RequestSigner};
use crate::transport::{build_client, AlarmTransport, HttpTransport};

pub const ALARM_TRIGGERED: &str = "Alarm was successfully triggered!";
pub const ALARM_TRIGGERED_BACKUP: &str = "Alarm was triggered on the backup channel.";
pub const PUSH_SENT: &str = "Push was successfully sent!";

/// Answer to an alarm or push submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatus {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DispatchOutcome>,
}

/// Push targets and the leadership label shown next to the alarm form
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsView {
    pub groups: Vec<PushGroup>,
    pub leader_name: String,
}

pub struct DispatchService {
    service_name: String,
    auth: AuthGate,
    places: Arc<PlaceResolver>,
    composer: AlarmComposer,
    dispatcher: AlarmDispatcher,
    roster: Arc<RosterAggregator>,
    poller: RosterPoller,
    groups: Vec<PushGroup>,
    leader_name: String,
    started_at: Instant,
}

impl DispatchService {
    /// Wire up the production HTTP clients from a validated configuration
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        config.validate()?;

        let places = PlaceResolver::from_json_file(&config.places.path)?;
        let client = build_client(config.http.timeout(), config.http.identity_pem.as_deref())?;

        let transport: Arc<dyn AlarmTransport> =
            Arc::new(HttpTransport::new(client.clone(), &config.http.alarm_base_url));
        let widgets: Arc<dyn WidgetSource> = Arc::new(HttpWidgetClient::new(
            client,
            &config.http.widget_base_url,
            &config.credentials.display_token,
            &config.credentials.organisation_token,
        ));

        Ok(Self::with_components(config, places, transport, widgets))
    }

    /// Assemble the service around explicit upstream implementations
    pub fn with_components(
        config: &DispatchConfig,
        places: PlaceResolver,
        transport: Arc<dyn AlarmTransport>,
        widgets: Arc<dyn WidgetSource>,
    ) -> Self {
        let creds = &config.credentials;
        let signer = Arc::new(RequestSigner::new(
            &creds.signing_key,
            IdentityTokens {
                web_api_token: creds.web_api_token.clone(),
                selective_call_code: creds.selective_call_code.clone(),
                access_token: creds.access_token.clone(),
            },
        ));

        let settings = &config.dispatch;
        let composer = AlarmComposer {
            live_keyword: settings.live_keyword.clone(),
            backup_keyword: settings.backup_keyword.clone(),
            leader_suffix: settings.leader_suffix.clone(),
            debug: config.service.debug,
        };
        let dispatcher = AlarmDispatcher::new(
            signer,
            transport,
            BackupFallbackPolicy::new(&settings.backup_keyword),
        );

        let roster = Arc::new(RosterAggregator::new(widgets));
        let poller = RosterPoller::new(Arc::clone(&roster), config.roster.interval());

        info!(
            "Dispatch service ready: {} place(s), {} push group(s)",
            places.len(),
            config.groups.len()
        );

        Self {
            service_name: config.service.name.clone(),
            auth: AuthGate::new(&creds.caller_secret, &creds.web_password),
            places: Arc::new(places),
            composer,
            dispatcher,
            roster,
            poller,
            groups: config.groups.clone(),
            leader_name: settings.leader_name.clone(),
            started_at: Instant::now(),
        }
    }

    // ========================================================================
    // Gate
    // ========================================================================

    pub fn authorize(&self, caller_key: Option<&str>) -> bool {
        self.auth.authorize(caller_key)
    }

    pub fn require(&self, caller_key: Option<&str>) -> Result<()> {
        self.auth.require(caller_key)
    }

    pub fn check_password(&self, password: &str) -> Option<String> {
        self.auth.check_password(password)
    }

    // ========================================================================
    // Alarm and push
    // ========================================================================

    /// Send an already assembled alarm through primary and backup channels
    pub async fn authorize_and_trigger_alarm(
        &self,
        caller_key: Option<&str>,
        request: AlarmRequest,
    ) -> Result<OperationStatus> {
        self.auth.require(caller_key)?;

        let outcome = self.dispatcher.dispatch(request).await.into_result()?;
        let message = match outcome {
            DispatchOutcome::DeliveredPrimary => ALARM_TRIGGERED,
            _ => ALARM_TRIGGERED_BACKUP,
        };
        Ok(OperationStatus {
            status: 200,
            message: message.to_string(),
            outcome: Some(outcome),
        })
    }

    /// Compose an alarm from raw form fields, then send it
    pub async fn authorize_and_compose_alarm(
        &self,
        caller_key: Option<&str>,
        form: AlarmForm,
    ) -> Result<OperationStatus> {
        self.auth.require(caller_key)?;

        let request = self.composer.compose(&form, &self.places)?;
        debug!(
            "Composed alarm for '{}' with keyword {}",
            request.object, request.keyword
        );
        self.authorize_and_trigger_alarm(caller_key, request).await
    }

    pub async fn authorize_and_send_push(
        &self,
        caller_key: Option<&str>,
        message: PushMessage,
    ) -> Result<OperationStatus> {
        self.auth.require(caller_key)?;

        let status = self.dispatcher.send_push(&message).await?;
        Ok(OperationStatus {
            status,
            message: PUSH_SENT.to_string(),
            outcome: None,
        })
    }

    // ========================================================================
    // Places
    // ========================================================================

    pub fn resolve_place(&self, input: &str) -> Option<Place> {
        self.places.resolve(input).cloned()
    }

    pub fn search_places(&self, filter: &str) -> Vec<Place> {
        self.places.search(filter).into_iter().cloned().collect()
    }

    pub fn all_places(&self) -> &[Place] {
        self.places.all_places()
    }

    // ========================================================================
    // Roster and incident
    // ========================================================================

    pub async fn get_roster(&self) -> Result<RosterView> {
        self.roster.fetch_roster().await
    }

    pub async fn get_incident_state(&self) -> Result<IncidentView> {
        self.roster.fetch_incident().await
    }

    pub fn start_polling(&self) -> bool {
        self.poller.start()
    }

    pub fn stop_polling(&self) -> bool {
        self.poller.stop()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub async fn roster_snapshot(&self) -> RosterSnapshot {
        self.poller.snapshot().await
    }

    pub fn groups(&self) -> GroupsView {
        GroupsView {
            groups: self.groups.clone(),
            leader_name: self.leader_name.clone(),
        }
    }

    pub async fn health(&self) -> HealthStatus {
        let mut checks = HashMap::new();

        checks.insert(
            "places".to_string(),
            if self.places.is_empty() {
                ComponentHealth::degraded("no places loaded")
            } else {
                ComponentHealth::healthy()
            },
        );

        let roster = match self.poller.snapshot().await {
            RosterSnapshot::Unavailable { reason, .. } => ComponentHealth::degraded(reason),
            _ => ComponentHealth::healthy(),
        };
        checks.insert("roster".to_string(), roster);

        HealthStatus::new(
            &self.service_name,
            self.started_at.elapsed().as_secs(),
            checks,
        )
    }
}
