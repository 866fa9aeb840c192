//! Alarm and push payloads, and composition of an alarm from form input

use common::serde_helpers::{deserialize_bool_flexible, deserialize_optional_f64};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::places::PlaceResolver;

/// Payload of the `triggerAlarm` channel
///
/// Field order is the wire order and therefore part of the signed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRequest {
    /// Resolved place name or raw free text
    pub object: String,
    #[serde(rename = "type", default)]
    pub alarm_type: String,
    pub keyword: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lng: Option<f64>,
}

/// Payload of the `pushMessage` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Target group GUIDs
    pub groups: Vec<String>,
    pub message: String,
}

/// Raw alarm form fields as entered by the operator
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmForm {
    #[serde(default)]
    pub place: String,
    #[serde(rename = "type", default)]
    pub alarm_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub notify_leader: bool,
    /// Manual map pin, used when the place text does not resolve
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub lng: Option<f64>,
}

impl AlarmForm {
    /// Place text or a map pin is required
    pub fn is_complete(&self) -> bool {
        !self.place.trim().is_empty() || self.lat.is_some()
    }
}

/// Turns form input into an [`AlarmRequest`]
#[derive(Debug, Clone)]
pub struct AlarmComposer {
    pub live_keyword: String,
    pub backup_keyword: String,
    pub leader_suffix: String,
    /// Debug mode sends every alarm with the backup keyword
    pub debug: bool,
}

impl Default for AlarmComposer {
    fn default() -> Self {
        Self {
            live_keyword: "FR".to_string(),
            backup_keyword: "TEST".to_string(),
            leader_suffix: " + K".to_string(),
            debug: false,
        }
    }
}

impl AlarmComposer {
    /// Keyword for a new alarm; the leadership suffix never goes on a test alarm
    pub fn keyword(&self, notify_leader: bool) -> String {
        if self.debug {
            return self.backup_keyword.clone();
        }
        if notify_leader {
            format!("{}{}", self.live_keyword, self.leader_suffix)
        } else {
            self.live_keyword.clone()
        }
    }

    /// A prefix place sends the operator's raw text as `object` (e.g. "C5-123"), any other match sends the place name
    pub fn compose(&self, form: &AlarmForm, places: &PlaceResolver) -> Result<AlarmRequest> {
        if !form.is_complete() {
            return Err(DispatchError::Validation(
                "place must not be blank unless a map position is given".to_string(),
            ));
        }

        let place = places.resolve(&form.place);

        let object = match place {
            Some(p) if !p.is_prefix => p.name.clone(),
            _ => form.place.clone(),
        };

        let description = place.and_then(|p| p.description.as_deref()).unwrap_or("");
        let details = match (form.details.is_empty(), description.is_empty()) {
            (false, false) => format!("{} || {}", form.details, description),
            (false, true) => form.details.clone(),
            (true, _) => description.to_string(),
        };

        let (lat, lng) = match place {
            Some(p) if p.lat.is_some() || p.lng.is_some() => (p.lat, p.lng),
            _ => (form.lat, form.lng),
        };

        Ok(AlarmRequest {
            object,
            alarm_type: form.alarm_type.clone(),
            keyword: self.keyword(form.notify_leader),
            message: form.message.clone(),
            details,
            lat,
            lng,
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn places() -> PlaceResolver {
        PlaceResolver::from_json_str(
            r#"[
                {"name": "Sekretariat", "aliases": ["Seki"], "lat": 1, "lng": 1, "description": "Erdgeschoss"},
                {"name": "C5", "isPrefix": true, "lat": 2, "lng": 2},
                {"name": "Mensa", "lat": 3, "lng": 3}
            ]"#,
        )
        .unwrap()
    }

    fn form(place: &str) -> AlarmForm {
        AlarmForm {
            place: place.to_string(),
            alarm_type: "Brand".to_string(),
            message: "Rauchentwicklung".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_wire_field_order() {
        let req = AlarmRequest {
            object: "Mensa".into(),
            alarm_type: "Brand".into(),
            keyword: "FR".into(),
            message: String::new(),
            details: String::new(),
            lat: None,
            lng: None,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"object":"Mensa","type":"Brand","keyword":"FR","message":"","details":"","lat":null,"lng":null}"#
        );
    }

    #[test]
    fn test_compose_alias_uses_canonical_name_and_description() {
        let mut f = form("seki");
        f.details = "Zimmer 3".into();
        let req = AlarmComposer::default().compose(&f, &places()).unwrap();
        assert_eq!(req.object, "Sekretariat");
        assert_eq!(req.details, "Zimmer 3 || Erdgeschoss");
        assert_eq!(req.keyword, "FR");
        assert_eq!(req.lat, Some(1.0));
    }

    #[test]
    fn test_compose_description_only() {
        let req = AlarmComposer::default()
            .compose(&form("Sekretariat"), &places())
            .unwrap();
        assert_eq!(req.details, "Erdgeschoss");
    }

    #[test]
    fn test_compose_prefix_keeps_raw_text() {
        let req = AlarmComposer::default()
            .compose(&form("C5-123"), &places())
            .unwrap();
        assert_eq!(req.object, "C5-123");
        assert_eq!(req.lat, Some(2.0));
        assert_eq!(req.details, "");
    }

    #[test]
    fn test_compose_unresolved_uses_form_pin() {
        let mut f = form("Parkplatz Nord");
        f.lat = Some(48.5);
        f.lng = Some(11.2);
        let req = AlarmComposer::default().compose(&f, &places()).unwrap();
        assert_eq!(req.object, "Parkplatz Nord");
        assert_eq!((req.lat, req.lng), (Some(48.5), Some(11.2)));

        let req = AlarmComposer::default()
            .compose(&form("Parkplatz Nord"), &places())
            .unwrap();
        assert_eq!((req.lat, req.lng), (None, None));
    }

    #[test]
    fn test_keyword_rules() {
        let composer = AlarmComposer::default();
        assert_eq!(composer.keyword(false), "FR");
        assert_eq!(composer.keyword(true), "FR + K");

        let debug = AlarmComposer {
            debug: true,
            ..AlarmComposer::default()
        };
        assert_eq!(debug.keyword(true), "TEST");
    }

    #[test]
    fn test_incomplete_form_rejected() {
        let err = AlarmComposer::default()
            .compose(&form("   "), &places())
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let mut pinned = form("");
        pinned.lat = Some(48.0);
        assert!(AlarmComposer::default().compose(&pinned, &places()).is_ok());
    }

    #[test]
    fn test_form_accepts_string_flags() {
        let f: AlarmForm = serde_json::from_str(
            r#"{"place": "Mensa", "type": "THL", "notifyLeader": "true", "lat": ""}"#,
        )
        .unwrap();
        assert!(f.notify_leader);
        assert_eq!(f.lat, None);
        assert_eq!(f.alarm_type, "THL");
    }
}
