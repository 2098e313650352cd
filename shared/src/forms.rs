//! Client-side validation run before any request is issued.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{Coordinate, NewLocation, UserPayload, Visibility};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationForm {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visibility: Visibility,
}

impl LocationForm {
    /// Blank form for a coordinate picked on the map; public by default.
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            latitude: coordinate.latitude(),
            longitude: coordinate.longitude(),
            visibility: Visibility::Public,
        }
    }

    pub fn with_text(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.name = name.into();
        self.description = description.into();
        self
    }

    pub fn set_public(&mut self, is_public: bool) {
        self.visibility = Visibility::from_toggle(is_public);
    }

    pub fn validate(&self) -> Result<NewLocation, ValidationError> {
        let mut errors = ValidationError::new();

        if self.name.trim().is_empty() {
            errors.push("name", "Name is required");
        }
        if self.description.trim().is_empty() {
            errors.push("description", "Description is required");
        }
        if let Err(e) = Coordinate::new(self.latitude, self.longitude) {
            errors.push("coordinate", e.to_string());
        }

        errors.into_result()?;

        Ok(NewLocation {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            visibility: self.visibility,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<UserPayload, ValidationError> {
        let mut errors = ValidationError::new();
        let username = self.username.trim();
        let email = self.email.trim();

        if username.is_empty() {
            errors.push("username", "Username is required");
        }

        if email.is_empty() {
            errors.push("email", "Email is required");
        } else if !email.contains('@') || !email.contains('.') {
            errors.push("email", "Email is invalid");
        }

        if self.password.is_empty() {
            errors.push("password", "Password is required");
        } else if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(
                "password",
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
            );
        }

        if self.confirm_password != self.password {
            errors.push("confirm_password", "Passwords do not match");
        }

        errors.into_result()?;

        Ok(UserPayload {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        if self.username.trim().is_empty() {
            errors.push("username", "Username is required");
        }
        if self.password.is_empty() {
            errors.push("password", "Password is required");
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falls() -> LocationForm {
        LocationForm::at(Coordinate::new(-17.9, 25.8).unwrap()).with_text("Falls", "Big falls")
    }

    #[test]
    fn test_valid_location_form() {
        let new = falls().validate().unwrap();
        assert_eq!(new.name, "Falls");
        assert_eq!(new.visibility, Visibility::Public);
        assert_eq!(new.latitude, -17.9);
    }

    #[test]
    fn test_blank_fields_rejected_together() {
        let form = falls().with_text("   ", "");
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.fields.len(), 2);
        assert_eq!(errors.message_for("name"), Some("Name is required"));
        assert_eq!(errors.message_for("description"), Some("Description is required"));
    }

    #[test]
    fn test_toggle_sets_visibility() {
        let mut form = falls();
        form.set_public(false);
        assert_eq!(form.validate().unwrap().visibility, Visibility::Private);
    }

    #[test]
    fn test_out_of_range_coordinate_rejected() {
        let mut form = falls();
        form.latitude = 95.0;
        assert!(form.validate().unwrap_err().message_for("coordinate").is_some());
    }

    #[test]
    fn test_registration_rules() {
        let form = RegistrationForm {
            username: "ana".into(),
            email: "ana-at-example".into(),
            password: "12345".into(),
            confirm_password: "123456".into(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.message_for("email"), Some("Email is invalid"));
        assert!(errors.message_for("password").is_some());
        assert_eq!(errors.message_for("confirm_password"), Some("Passwords do not match"));
        assert!(errors.message_for("username").is_none());
    }

    #[test]
    fn test_registration_payload_is_trimmed() {
        let form = RegistrationForm {
            username: " ana ".into(),
            email: "ana@example.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
        };
        let payload = form.validate().unwrap();
        assert_eq!(payload.username.as_deref(), Some("ana"));
        assert_eq!(payload.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_login_requires_both_fields() {
        assert!(LoginForm::new("ana", "pw").validate().is_ok());
        let errors = LoginForm::new(" ", "").validate().unwrap_err();
        assert_eq!(errors.fields.len(), 2);
    }
}
