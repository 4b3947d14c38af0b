//! Profile model, edit draft, and sign-up seed.

use serde::{Deserialize, Serialize};

use super::ImageRef;

/// A user's profile as stored in the `users` collection.
///
/// The document id equals the identity id, so the id is not part of the
/// record. Accounts created before the bio and photo features shipped lack
/// those fields entirely; reads default them instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: String,
    pub city: String,
    #[serde(default)]
    pub bio: String,
    #[serde(rename = "profileImage", default)]
    pub profile_image: Option<String>,
    pub email: String,
}

impl Profile {
    /// An empty profile for an identity with no document yet.
    ///
    /// Absence of the document is not an error; the edit screen starts from
    /// blank fields with the account email filled in.
    #[must_use]
    pub fn blank(email: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            age: String::new(),
            city: String::new(),
            bio: String::new(),
            profile_image: None,
            email: email.into(),
        }
    }
}

/// User input for editing a profile.
///
/// `email` is deliberately absent: it is set once at account creation and
/// the engine re-sends the stored value on every save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub age: String,
    pub city: String,
    pub bio: String,
    pub image: Option<ImageRef>,
}

impl ProfileDraft {
    /// Build the storable record with the immutable email and resolved image.
    #[must_use]
    pub fn into_profile(self, email: String, profile_image: Option<String>) -> Profile {
        Profile {
            name: self.name,
            age: self.age,
            city: self.city,
            bio: self.bio,
            profile_image,
            email,
        }
    }
}

/// Fields captured by the sign-up form, written into the initial profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSeed {
    pub name: String,
    pub age: String,
    pub city: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn blank_profile_keeps_account_email() {
        let profile = Profile::blank("sam@example.com");
        assert_eq!(profile.email, "sam@example.com");
        assert!(profile.name.is_empty());
        assert!(profile.profile_image.is_none());
    }

    #[test]
    fn reads_default_missing_bio_and_image() {
        // Shape written at account creation, before any profile edit.
        let raw = serde_json::json!({
            "name": "Sam",
            "age": "29",
            "city": "Aarhus",
            "email": "sam@example.com",
        });

        let profile: Profile = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.bio, "");
        assert_eq!(profile.profile_image, None);
    }

    #[test]
    fn profile_round_trips_wire_field_names() {
        let profile = Profile {
            name: "Sam".to_string(),
            age: "29".to_string(),
            city: "Aarhus".to_string(),
            bio: "Hi".to_string(),
            profile_image: Some("https://cdn.example.com/p/u1".to_string()),
            email: "sam@example.com".to_string(),
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert!(value.get("profileImage").is_some());

        let back: Profile = serde_json::from_value(value).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn draft_carries_email_through_unchanged() {
        let draft = ProfileDraft {
            name: "Sam".to_string(),
            age: "30".to_string(),
            city: "Odense".to_string(),
            bio: "Moved".to_string(),
            image: None,
        };

        let profile = draft.into_profile("sam@example.com".to_string(), None);
        assert_eq!(profile.email, "sam@example.com");
        assert_eq!(profile.age, "30");
    }
}
