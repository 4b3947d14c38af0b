//! Event model and draft validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ImageRef;

/// A draft with one or more empty required fields.
///
/// Raised before any store or object-storage call is made; the message names
/// every offending field so forms can highlight them all at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    /// Names of the required fields that were empty.
    pub missing: Vec<&'static str>,
}

/// An event as stored in the `events` collection.
///
/// The wire field names match the documents the mobile clients already
/// write; `image` is null until an upload has resolved a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "eventName")]
    pub name: String,
    pub capacity: String,
    pub description: String,
    pub address: String,
    pub category: String,
    pub image: Option<String>,
}

/// User input for creating or editing an event.
///
/// All five text fields are required; the image is optional and may be a
/// local file (uploaded by the engine) or an already-remote URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    pub name: String,
    pub capacity: String,
    pub description: String,
    pub address: String,
    pub category: String,
    pub image: Option<ImageRef>,
}

impl EventDraft {
    /// Check that every required text field is non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        for (field, value) in [
            ("name", &self.name),
            ("capacity", &self.capacity),
            ("description", &self.description),
            ("address", &self.address),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                missing.push(field);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }

    /// Build the storable record, substituting the resolved image URL.
    #[must_use]
    pub fn into_event(self, image: Option<String>) -> Event {
        Event {
            name: self.name,
            capacity: self.capacity,
            description: self.description,
            address: self.address,
            category: self.category,
            image,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn draft() -> EventDraft {
        EventDraft {
            name: "Picnic".to_string(),
            capacity: "20".to_string(),
            description: "Outdoor".to_string(),
            address: "Park Ave".to_string(),
            category: "Social".to_string(),
            image: None,
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn validation_names_every_missing_field() {
        let mut incomplete = draft();
        incomplete.capacity = String::new();
        incomplete.address = "   ".to_string();

        let error = incomplete.validate().unwrap_err();
        assert_eq!(error.missing, vec!["capacity", "address"]);
        assert_eq!(
            error.to_string(),
            "Missing required fields: capacity, address"
        );
    }

    #[test]
    fn into_event_substitutes_image_url() {
        let event = draft().into_event(Some("https://cdn.example.com/e/1".to_string()));
        assert_eq!(event.name, "Picnic");
        assert_eq!(event.image.as_deref(), Some("https://cdn.example.com/e/1"));
    }

    #[test]
    fn event_round_trips_wire_field_names() {
        let event = draft().into_event(None);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("eventName").is_some());
        assert!(value.get("name").is_none());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
