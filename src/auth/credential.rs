//! The OAuth credential unit: access/refresh token pair with expiry tracking

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicTokenResponse;
use oauth2::TokenResponse;
use serde::{Deserialize, Deserializer, Serialize};

/// Seconds before the vendor deadline at which a token is already treated as
/// expired, so a token cannot lapse mid-request.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 30;

/// The single live credential for the authenticated customer.
///
/// Exactly one of these exists at a time, owned by the token manager and
/// shadowed on disk by the token store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived bearer token for the vehicle data API.
    pub access_token: String,
    /// Long-lived token for the refresh grant. The vendor may rotate it on
    /// refresh; an omitted refresh_token in a response means "keep the old one".
    pub refresh_token: Option<String>,
    /// Absolute expiry of `access_token` as reported by the vendor.
    /// `None` means the vendor did not report a lifetime.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes granted at acquisition time.
    #[serde(default, deserialize_with = "scope_list_or_string")]
    pub scope: Vec<String>,
}

impl Credential {
    /// Build a credential from a token endpoint response, stamping the
    /// absolute expiry from the relative `expires_in`.
    pub fn from_token_response(response: &BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at: response
                .expires_in()
                .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_owned()).collect())
                .unwrap_or_default(),
        }
    }

    /// Whether the access token must no longer be used. Applies the safety
    /// margin, so this returns true slightly before the vendor's deadline.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS) >= at,
            None => false,
        }
    }
}

/// Accept `scope` both as a list and as the space-delimited string form used
/// by token endpoints.
fn scope_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScopeField {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match ScopeField::deserialize(deserializer)? {
        ScopeField::List(scopes) => scopes,
        ScopeField::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at,
            scope: vec!["offline_access".to_string()],
        }
    }

    #[test]
    fn test_expired_within_safety_margin() {
        let cred = make_credential(Some(Utc::now() + Duration::seconds(10)));
        assert!(cred.is_expired());
    }

    #[test]
    fn test_not_expired_outside_safety_margin() {
        let cred = make_credential(Some(Utc::now() + Duration::seconds(120)));
        assert!(!cred.is_expired());
    }

    #[test]
    fn test_past_deadline_is_expired() {
        let cred = make_credential(Some(Utc::now() - Duration::seconds(1)));
        assert!(cred.is_expired());
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let cred = make_credential(None);
        assert!(!cred.is_expired());
    }

    #[test]
    fn test_scope_accepts_list() {
        let cred: Credential = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_at":null,"scope":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(cred.scope, vec!["a", "b"]);
    }

    #[test]
    fn test_scope_accepts_space_delimited_string() {
        let cred: Credential = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":null,"expires_at":null,"scope":"a b c"}"#,
        )
        .unwrap();
        assert_eq!(cred.scope, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let cred = make_credential(Some(Utc::now() + Duration::seconds(3600)));
        let json = serde_json::to_string(&cred).unwrap();
        let restored: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(cred, restored);
    }
}
