//! Responder roster and incident state from the status-monitor widget API
//!
//! Every roster fetch first asks for the active mission. Without an `error`
//! in that answer an incident is running and the team status (who was
//! requested, who accepted) is queried; otherwise the general availability is
//! queried. Both shapes are normalized into one ordered person list.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

/// Default widget API base URL
pub const DEFAULT_WIDGET_BASE_URL: &str =
    "https://www.ff-agent.com/status-monitor-v2/WidgetViewApi/ajax_data";

const UNKNOWN: &str = "Unbekannt";

/// Widget API endpoints used by the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetEndpoint {
    ActiveMissionInfo,
    TeamStatus,
    PersonsAvailability,
}

impl WidgetEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveMissionInfo => "ACTIVE_MISSION_INFO",
            Self::TeamStatus => "TEAM_STATUS",
            Self::PersonsAvailability => "PERSONS_AVAILABILITY",
        }
    }

    /// Request body for this endpoint
    pub fn query_body(&self) -> Value {
        match self {
            Self::ActiveMissionInfo => json!({}),
            Self::TeamStatus => json!({
                "includeSkills": true,
                "showPersonsRequested": true,
                "showPersonsAccepted": true,
                "showPersonsRejected": true,
            }),
            Self::PersonsAvailability => json!({
                "individualPersons": true,
                "includeSummary": true,
            }),
        }
    }
}

impl std::fmt::Display for WidgetEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of raw widget API answers
#[async_trait]
pub trait WidgetSource: Send + Sync {
    async fn fetch(&self, endpoint: WidgetEndpoint, body: &Value) -> Result<Value>;
}

/// Widget API over HTTPS, authenticated by display and organisation token
pub struct HttpWidgetClient {
    client: Client,
    base_url: String,
    display_token: String,
    organisation_token: String,
}

impl HttpWidgetClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        display_token: impl Into<String>,
        organisation_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            display_token: display_token.into(),
            organisation_token: organisation_token.into(),
        }
    }
}

#[async_trait]
impl WidgetSource for HttpWidgetClient {
    async fn fetch(&self, endpoint: WidgetEndpoint, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.as_str());
        let response = self
            .client
            .post(&url)
            .query(&[("displayToken", self.display_token.as_str())])
            .header("accept", "application/json, text/plain, */*")
            .header("content-type", "application/json;charset=UTF-8")
            .header(
                "cookie",
                format!("organisationToken={}", self.organisation_token),
            )
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| DispatchError::from_reqwest(endpoint.as_str(), &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DispatchError::from_reqwest(endpoint.as_str(), &e))?;

        if !status.is_success() {
            warn!("[{}] widget API answered {}: {}", endpoint, status, text);
            return Err(DispatchError::upstream(
                endpoint.as_str(),
                format!("HTTP {}: {}", status.as_u16(), text),
            ));
        }

        serde_json::from_str(&text)
            .map_err(|e| DispatchError::malformed(endpoint.as_str(), e.to_string()))
    }
}

// ============================================================================
// Normalized views
// ============================================================================

/// Which roster query the incident state selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RosterMode {
    ActiveCall,
    NoCall,
}

impl RosterMode {
    pub fn endpoint(&self) -> WidgetEndpoint {
        match self {
            Self::ActiveCall => WidgetEndpoint::TeamStatus,
            Self::NoCall => WidgetEndpoint::PersonsAvailability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Requested,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub short_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub availability: Availability,
    /// Only set for an explicit answer to the current alarm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterView {
    pub mode: RosterMode,
    pub headline: String,
    pub empty: bool,
    pub persons: Vec<Person>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentView {
    pub active: bool,
    /// `HH:MM` of the alarm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_url: Option<String>,
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// `ACTIVE_CALL` unless the incident answer carries an error
pub fn select_mode(incident: &Value) -> RosterMode {
    if is_truthy(incident.get("error")) {
        RosterMode::NoCall
    } else {
        RosterMode::ActiveCall
    }
}

fn classify(person: &Map<String, Value>) -> (Availability, Option<&'static str>) {
    match person.get("status").and_then(Value::as_str) {
        Some("REQUESTED") => (Availability::Requested, Some("question_mark")),
        Some("ACCEPTED") => (Availability::Accepted, Some("check")),
        Some("REJECTED") => (Availability::Rejected, Some("close")),
        _ => match person.get("available") {
            Some(Value::Bool(false)) => (Availability::Rejected, None),
            // Only an explicit null date counts as plain availability
            Some(Value::Bool(true))
                if !matches!(person.get("unavailableOrAbsenceDate"), Some(Value::Null)) =>
            {
                (Availability::Requested, None)
            },
            _ => (Availability::Accepted, None),
        },
    }
}

fn parse_person(endpoint: WidgetEndpoint, value: &Value) -> Result<Person> {
    let person = value
        .as_object()
        .ok_or_else(|| DispatchError::malformed(endpoint.as_str(), "person is not an object"))?;

    let (availability, icon) = classify(person);
    let skills = person
        .get("skills")
        .and_then(Value::as_array)
        .map(|skills| {
            skills
                .iter()
                .filter_map(|s| {
                    Some(Skill {
                        short_title: s.get("shortTitle")?.as_str()?.to_string(),
                        color: s.get("color").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Person {
        name: person
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        availability,
        icon: icon.map(str::to_string),
        skills,
    })
}

/// Normalize a `TEAM_STATUS` or `PERSONS_AVAILABILITY` answer
pub fn normalize_roster(mode: RosterMode, data: &Value) -> Result<RosterView> {
    let endpoint = mode.endpoint();
    let root = data
        .as_object()
        .ok_or_else(|| DispatchError::malformed(endpoint.as_str(), "answer is not an object"))?;

    if root.is_empty() {
        return Ok(RosterView {
            mode,
            headline: "Liste leer".to_string(),
            empty: true,
            persons: Vec::new(),
        });
    }

    let persons = root
        .get("persons")
        .ok_or_else(|| DispatchError::malformed(endpoint.as_str(), "missing 'persons'"))?;

    let headline = if is_truthy(persons.get("absent")) {
        "Verfügbare Personen"
    } else {
        "Zusagen"
    };

    let raw: Vec<&Value> = match persons {
        Value::Object(groups) if groups.contains_key("absent") => {
            let mut list = Vec::new();
            for group in ["available", "absent", "unavailable"] {
                match groups.get(group) {
                    None | Some(Value::Null) => {},
                    Some(Value::Array(items)) => list.extend(items.iter()),
                    Some(_) => {
                        return Err(DispatchError::malformed(
                            endpoint.as_str(),
                            format!("'persons.{}' is not a list", group),
                        ))
                    },
                }
            }
            list
        },
        Value::Array(items) => items.iter().collect(),
        _ => {
            return Err(DispatchError::malformed(
                endpoint.as_str(),
                "'persons' is neither a list nor grouped",
            ))
        },
    };

    let persons = raw
        .into_iter()
        .map(|p| parse_person(endpoint, p))
        .collect::<Result<Vec<_>>>()?;

    Ok(RosterView {
        mode,
        headline: headline.to_string(),
        empty: persons.is_empty(),
        persons,
    })
}

/// `HH:MM` from an alarm date such as `12:34:56` or `2024-05-01T12:34:56`
fn start_time(alarm_date: &str) -> Option<String> {
    let mut parts = alarm_date.split(':');
    let hours = parts.next()?.rsplit(|c| c == 'T' || c == ' ').next()?;
    let minutes: String = parts.next()?.chars().take(2).collect();
    if hours.is_empty() || minutes.is_empty() {
        return None;
    }
    Some(format!("{}:{}", hours, minutes))
}

/// Normalize an `ACTIVE_MISSION_INFO` answer
pub fn normalize_incident(data: &Value) -> IncidentView {
    let Some(mission) = data.get("mission").filter(|m| is_truthy(Some(*m))) else {
        return IncidentView::default();
    };
    let detail = mission.get("detail");
    let field = |name: &str| detail.and_then(|d| d.get(name)).and_then(Value::as_str);

    let location = field("object")
        .and_then(|o| o.split(" |").next())
        .filter(|o| !o.is_empty())
        .unwrap_or(UNKNOWN);
    let keyword = field("type").filter(|t| !t.is_empty()).unwrap_or(UNKNOWN);

    IncidentView {
        active: true,
        start_time: field("alarmDate").and_then(start_time),
        location: Some(location.to_string()),
        keyword: Some(keyword.to_string()),
        finish_url: mission
            .get("finishUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Picks and runs the roster query matching the current incident state
pub struct RosterAggregator {
    source: Arc<dyn WidgetSource>,
}

impl RosterAggregator {
    pub fn new(source: Arc<dyn WidgetSource>) -> Self {
        Self { source }
    }

    async fn query(&self, endpoint: WidgetEndpoint) -> Result<Value> {
        debug!("Querying {}", endpoint);
        self.source.fetch(endpoint, &endpoint.query_body()).await
    }

    /// Raw incident state
    pub async fn fetch_incident_raw(&self) -> Result<Value> {
        self.query(WidgetEndpoint::ActiveMissionInfo).await
    }

    /// Roster query for an already fetched incident state
    pub async fn fetch_roster_for(&self, incident: &Value) -> Result<RosterView> {
        let mode = select_mode(incident);
        debug!("Roster mode {:?}", mode);
        let data = self.query(mode.endpoint()).await?;
        normalize_roster(mode, &data)
    }

    pub async fn fetch_roster(&self) -> Result<RosterView> {
        let incident = self.fetch_incident_raw().await?;
        self.fetch_roster_for(&incident).await
    }

    pub async fn fetch_incident(&self) -> Result<IncidentView> {
        Ok(normalize_incident(&self.fetch_incident_raw().await?))
    }

    /// Incident and roster from a single incident query
    pub async fn fetch_state(&self) -> Result<(IncidentView, RosterView)> {
        let incident = self.fetch_incident_raw().await?;
        let roster = self.fetch_roster_for(&incident).await?;
        Ok((normalize_incident(&incident), roster))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Canned answers per endpoint, recording each query
    struct FakeWidget {
        incident: Value,
        roster: Value,
        calls: Mutex<Vec<(WidgetEndpoint, Value)>>,
    }

    impl FakeWidget {
        fn new(incident: Value, roster: Value) -> Arc<Self> {
            Arc::new(Self {
                incident,
                roster,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn endpoints(&self) -> Vec<WidgetEndpoint> {
            self.calls.lock().unwrap().iter().map(|(e, _)| *e).collect()
        }
    }

    #[async_trait]
    impl WidgetSource for FakeWidget {
        async fn fetch(&self, endpoint: WidgetEndpoint, body: &Value) -> Result<Value> {
            self.calls.lock().unwrap().push((endpoint, body.clone()));
            Ok(match endpoint {
                WidgetEndpoint::ActiveMissionInfo => self.incident.clone(),
                _ => self.roster.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_active_call_queries_team_status() {
        let fake = FakeWidget::new(
            json!({"mission": {"detail": {"alarmDate": "12:34:56"}}}),
            json!({"persons": [{"name": "Anna", "status": "ACCEPTED"}]}),
        );
        let roster = RosterAggregator::new(fake.clone()).fetch_roster().await.unwrap();

        assert_eq!(roster.mode, RosterMode::ActiveCall);
        assert_eq!(roster.headline, "Zusagen");
        assert_eq!(
            fake.endpoints(),
            vec![WidgetEndpoint::ActiveMissionInfo, WidgetEndpoint::TeamStatus]
        );
        let calls = fake.calls.lock().unwrap();
        let body = &calls[1].1;
        assert_eq!(body["includeSkills"], true);
        assert_eq!(body["showPersonsRejected"], true);
    }

    #[tokio::test]
    async fn test_error_field_queries_availability() {
        let fake = FakeWidget::new(
            json!({"error": "NO_ACTIVE_MISSION"}),
            json!({"persons": {"available": [], "absent": [], "unavailable": []}}),
        );
        let roster = RosterAggregator::new(fake.clone()).fetch_roster().await.unwrap();

        assert_eq!(roster.mode, RosterMode::NoCall);
        assert_eq!(
            fake.endpoints(),
            vec![
                WidgetEndpoint::ActiveMissionInfo,
                WidgetEndpoint::PersonsAvailability
            ]
        );
        let calls = fake.calls.lock().unwrap();
        let body = &calls[1].1;
        assert_eq!(body, &json!({"individualPersons": true, "includeSummary": true}));
    }

    #[test]
    fn test_grouped_order_available_absent_unavailable() {
        let data = json!({"persons": {
            "unavailable": [{"name": "U1", "available": false}],
            "absent": [{"name": "A1", "available": true, "unavailableOrAbsenceDate": "2025-01-01"}],
            "available": [
                {"name": "V1", "available": true, "unavailableOrAbsenceDate": null},
                {"name": "V2", "available": true, "unavailableOrAbsenceDate": null}
            ]
        }});
        let view = normalize_roster(RosterMode::NoCall, &data).unwrap();
        let names: Vec<&str> = view.persons.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["V1", "V2", "A1", "U1"]);
        assert_eq!(view.headline, "Verfügbare Personen");
        assert_eq!(view.persons[0].availability, Availability::Accepted);
        assert_eq!(view.persons[2].availability, Availability::Requested);
        assert_eq!(view.persons[3].availability, Availability::Rejected);
        assert!(view.persons[3].icon.is_none());
    }

    #[test]
    fn test_status_icons_and_skills() {
        let data = json!({"persons": [
            {"name": "R", "status": "REQUESTED", "skills": [{"shortTitle": "AGT", "color": "#f00"}]},
            {"name": "N", "status": "REJECTED"}
        ]});
        let view = normalize_roster(RosterMode::ActiveCall, &data).unwrap();
        assert_eq!(view.persons[0].availability, Availability::Requested);
        assert_eq!(view.persons[0].icon.as_deref(), Some("question_mark"));
        assert_eq!(view.persons[0].skills[0].short_title, "AGT");
        assert_eq!(view.persons[0].skills[0].color.as_deref(), Some("#f00"));
        assert_eq!(view.persons[1].icon.as_deref(), Some("close"));
    }

    #[test]
    fn test_empty_answer_is_empty_roster() {
        let view = normalize_roster(RosterMode::ActiveCall, &json!({})).unwrap();
        assert!(view.empty);
        assert_eq!(view.headline, "Liste leer");
    }

    #[test]
    fn test_malformed_roster() {
        let err = normalize_roster(RosterMode::ActiveCall, &json!({"persons": 5})).unwrap_err();
        assert!(matches!(err, DispatchError::MalformedUpstreamResponse { .. }));
        let err = normalize_roster(RosterMode::ActiveCall, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, DispatchError::MalformedUpstreamResponse { .. }));
    }

    #[test]
    fn test_incident_view() {
        let view = normalize_incident(&json!({"mission": {
            "detail": {"alarmDate": "08:05:00", "object": "Mensa | Eingang Süd", "type": "B2"},
            "finishUrl": "https://example.test/finish/1"
        }}));
        assert!(view.active);
        assert_eq!(view.start_time.as_deref(), Some("08:05"));
        assert_eq!(view.location.as_deref(), Some("Mensa"));
        assert_eq!(view.keyword.as_deref(), Some("B2"));
        assert_eq!(view.finish_url.as_deref(), Some("https://example.test/finish/1"));
    }

    #[test]
    fn test_incident_defaults() {
        let view = normalize_incident(&json!({"mission": {"detail": {}}}));
        assert_eq!(view.location.as_deref(), Some("Unbekannt"));
        assert_eq!(view.keyword.as_deref(), Some("Unbekannt"));
        assert!(view.start_time.is_none());

        assert_eq!(normalize_incident(&json!({"error": "x"})), IncidentView::default());
    }

    #[test]
    fn test_start_time_formats() {
        assert_eq!(start_time("12:34:56").as_deref(), Some("12:34"));
        assert_eq!(start_time("2024-05-01T07:09:00Z").as_deref(), Some("07:09"));
        assert_eq!(start_time("01.05.2024 23:59").as_deref(), Some("23:59"));
        assert!(start_time("gestern").is_none());
    }

    #[test]
    fn test_select_mode_truthiness() {
        assert_eq!(select_mode(&json!({})), RosterMode::ActiveCall);
        assert_eq!(select_mode(&json!({"error": null})), RosterMode::ActiveCall);
        assert_eq!(select_mode(&json!({"error": ""})), RosterMode::ActiveCall);
        assert_eq!(select_mode(&json!({"error": "none"})), RosterMode::NoCall);
    }
}
