// SPDX-License-Identifier: MPL-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signed-in account as reported by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Authentication lifecycle.
///
/// Visited records are only available in `FullyAuthenticated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    LoggedOut,
    /// Signed in but email not yet verified
    Authenticating,
    FullyAuthenticated { user_id: String },
}

impl AuthState {
    pub fn from_user(user: Option<&User>) -> Self {
        match user {
            None => Self::LoggedOut,
            Some(user) if user.is_verified() => Self::FullyAuthenticated {
                user_id: user.id.clone(),
            },
            Some(_) => Self::Authenticating,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::FullyAuthenticated { user_id } => Some(user_id),
            Self::LoggedOut | Self::Authenticating => None,
        }
    }

    pub fn is_fully_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(confirmed: bool) -> User {
        User {
            id: "user-1".to_string(),
            email: Some("runor@example.se".to_string()),
            email_confirmed_at: confirmed.then(Utc::now),
        }
    }

    #[test]
    fn maps_user_to_state() {
        assert_eq!(AuthState::from_user(None), AuthState::LoggedOut);
        assert_eq!(
            AuthState::from_user(Some(&user(false))),
            AuthState::Authenticating
        );
        assert_eq!(
            AuthState::from_user(Some(&user(true))),
            AuthState::FullyAuthenticated {
                user_id: "user-1".to_string()
            }
        );
    }

    #[test]
    fn only_verified_users_have_an_id() {
        assert_eq!(AuthState::LoggedOut.user_id(), None);
        assert_eq!(AuthState::Authenticating.user_id(), None);
        assert!(AuthState::from_user(Some(&user(true))).is_fully_authenticated());
    }

    #[test]
    fn user_deserializes_without_optional_fields() {
        let user: User = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert!(!user.is_verified());
        assert_eq!(user.email, None);
    }
}
