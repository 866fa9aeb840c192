//! Shared fixtures for integration tests
#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dispatchsrv::config::{Credentials, DispatchConfig, PushGroup};
use dispatchsrv::error::{DispatchError, Result};
use dispatchsrv::roster::{WidgetEndpoint, WidgetSource};
use dispatchsrv::signer::SignedEnvelope;
use dispatchsrv::transport::AlarmTransport;
use dispatchsrv::{DispatchService, PlaceResolver};
use serde_json::{json, Value};

pub const CALLER_KEY: &str = "s3cret";
pub const WEB_PASSWORD: &str = "hunter2";

pub const PLACES_JSON: &str = r#"[
    {"name": "Sekretariat", "aliases": ["Sek"], "lat": 48.1402, "lng": 11.5601, "description": "Raum 0.12"},
    {"name": "C5", "isPrefix": true, "lat": 48.141, "lng": 11.5622},
    {"name": "Mensa", "aliases": ["Kantine"], "lat": 48.1395, "lng": 11.5588}
]"#;

pub fn test_config() -> DispatchConfig {
    let mut config = DispatchConfig {
        credentials: Credentials {
            signing_key: "key".into(),
            web_api_token: "tok".into(),
            selective_call_code: "scc".into(),
            access_token: "acc".into(),
            caller_secret: CALLER_KEY.into(),
            web_password: WEB_PASSWORD.into(),
            display_token: "display".into(),
            organisation_token: "org".into(),
        },
        ..Default::default()
    };
    config.dispatch.leader_name = "Kommandant".into();
    config.groups = vec![PushGroup {
        guid: "g-1".into(),
        name: "Einsatzabteilung".into(),
    }];
    config
}

pub fn test_places() -> PlaceResolver {
    PlaceResolver::from_json_str(PLACES_JSON).unwrap()
}

/// Answers with scripted statuses (200 once the script runs out)
#[derive(Default)]
pub struct FakeTransport {
    answers: Mutex<VecDeque<u16>>,
    pub sent: Mutex<Vec<SignedEnvelope>>,
}

impl FakeTransport {
    pub fn with_answers(answers: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_bodies(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::from_str(&e.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl AlarmTransport for FakeTransport {
    async fn deliver(&self, envelope: &SignedEnvelope) -> Result<u16> {
        self.sent.lock().unwrap().push(envelope.clone());
        let status = self.answers.lock().unwrap().pop_front().unwrap_or(200);
        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(DispatchError::upstream(
                envelope.channel.endpoint(),
                format!("HTTP {}", status),
            ))
        }
    }
}

/// Widget API stand-in; `active` selects the incident answer
pub struct FakeWidget {
    pub active: bool,
    pub failing: bool,
    pub calls: AtomicUsize,
}

impl FakeWidget {
    pub fn new(active: bool) -> Arc<Self> {
        Arc::new(Self {
            active,
            failing: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            active: false,
            failing: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WidgetSource for FakeWidget {
    async fn fetch(&self, endpoint: WidgetEndpoint, _body: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(DispatchError::upstream(endpoint.as_str(), "HTTP 502"));
        }
        Ok(match endpoint {
            WidgetEndpoint::ActiveMissionInfo if self.active => json!({
                "mission": {
                    "detail": {
                        "alarmDate": "2024-05-01T14:07:00",
                        "object": "Mensa | Küche",
                        "type": "Brand"
                    },
                    "finishUrl": "https://example.invalid/finish"
                }
            }),
            WidgetEndpoint::ActiveMissionInfo => json!({"error": "no active mission"}),
            WidgetEndpoint::TeamStatus => json!({
                "persons": [
                    {"name": "Anna", "status": "ACCEPTED"},
                    {"name": "Ben", "status": "REJECTED"}
                ]
            }),
            WidgetEndpoint::PersonsAvailability => json!({
                "persons": {
                    "available": [{"name": "Anna"}],
                    "absent": [{"name": "Carl"}],
                    "unavailable": []
                }
            }),
        })
    }
}

pub fn test_service(transport: Arc<FakeTransport>, widget: Arc<FakeWidget>) -> Arc<DispatchService> {
    Arc::new(DispatchService::with_components(
        &test_config(),
        test_places(),
        transport,
        widget,
    ))
}
