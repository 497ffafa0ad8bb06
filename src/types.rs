use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Backend user identifier (opaque string).
///
/// Created server-side; the client never mints one except for the
/// development fixture account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Portal role assigned to a user.
///
/// Unknown roles are preserved as [`Role::Other`] so a newer backend does
/// not break session restoration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Customer,
    Agent,
    Admin,
    SupportAgent,
    Owner,
    User,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::Admin => "admin",
            Self::SupportAgent => "support_agent",
            Self::Owner => "owner",
            Self::User => "user",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "customer" => Self::Customer,
            "agent" => Self::Agent,
            "admin" => Self::Admin,
            "support_agent" => Self::SupportAgent,
            "owner" => Self::Owner,
            "user" => Self::User,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_owned()
    }
}

/// The authenticated portal user, mirrored into the persisted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Opaque bearer tokens issued at login and rotated on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// Tokens stay out of logs and panic messages.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Tokens plus the user they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub tokens: TokenPair,
    pub user: User,
}

/// Canonical `/auth/login` and `/auth/register` response body.
///
/// `{ "accessToken": "...", "refreshToken": "...", "user": { ... } }`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

impl AuthResponse {
    /// Rejects bodies that deserialized but carry empty required values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolMismatch`] naming the offending field.
    pub fn validate(self) -> Result<Session, Error> {
        if self.tokens.access_token.is_empty() {
            return Err(Error::ProtocolMismatch("empty accessToken".into()));
        }
        if self.user.id.0.is_empty() {
            return Err(Error::ProtocolMismatch("empty user.id".into()));
        }
        Ok(Session {
            tokens: self.tokens,
            user: self.user,
        })
    }
}

/// Canonical `/auth/refresh` response body: a flat token pair.
pub type RefreshResponse = TokenPair;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub(crate) email: &'a str,
    pub(crate) password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub(crate) name: &'a str,
    pub(crate) email: &'a str,
    pub(crate) password: &'a str,
    pub(crate) role: &'a Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub(crate) refresh_token: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user() -> serde_json::Value {
        json!({ "id": "u-1", "name": "Ada", "email": "ada@example.com", "role": "support_agent" })
    }

    #[test]
    fn canonical_auth_response_parses() {
        let body = json!({ "accessToken": "a", "refreshToken": "r", "user": sample_user() });
        let session = serde_json::from_value::<AuthResponse>(body)
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(session.tokens.access_token, "a");
        assert_eq!(session.user.role, Role::SupportAgent);
        assert_eq!(session.user.id, UserId::from("u-1"));
    }

    #[test]
    fn nested_data_shape_is_rejected() {
        let body = json!({ "data": { "accessToken": "a", "refreshToken": "r", "user": sample_user() } });
        assert!(serde_json::from_value::<AuthResponse>(body).is_err());
    }

    #[test]
    fn tokens_wrapper_shape_is_rejected() {
        let body = json!({ "tokens": { "accessToken": "a", "refreshToken": "r" }, "user": sample_user() });
        assert!(serde_json::from_value::<AuthResponse>(body).is_err());
    }

    #[test]
    fn snake_case_token_shape_is_rejected() {
        let body = json!({ "access_token": "a", "user": sample_user() });
        assert!(serde_json::from_value::<AuthResponse>(body).is_err());
    }

    #[test]
    fn empty_access_token_fails_validation() {
        let body = json!({ "accessToken": "", "refreshToken": "r", "user": sample_user() });
        let err = serde_json::from_value::<AuthResponse>(body)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch(ref m) if m.contains("accessToken")));
    }

    #[test]
    fn unknown_role_is_preserved() {
        let role: Role = serde_json::from_value(json!("auditor")).unwrap();
        assert_eq!(role, Role::Other("auditor".into()));
        assert_eq!(serde_json::to_value(&role).unwrap(), json!("auditor"));
    }

    #[test]
    fn known_roles_serialize_snake_case() {
        assert_eq!(serde_json::to_value(Role::SupportAgent).unwrap(), json!("support_agent"));
        assert_eq!(Role::from("owner"), Role::Owner);
    }

    #[test]
    fn token_pair_debug_is_redacted() {
        let pair = TokenPair {
            access_token: "secret-a".into(),
            refresh_token: "secret-r".into(),
        };
        let dbg = format!("{pair:?}");
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn refresh_request_uses_camel_case() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r" }).unwrap();
        assert_eq!(body, json!({ "refreshToken": "r" }));
    }
}
