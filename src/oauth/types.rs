//! Client registration and issued token types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Registered client application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Unique client identifier
    pub id: String,
    /// Shared secret
    pub secret: String,
    /// Domain the client is registered for
    pub domain: String,
    /// User that owns the client
    pub user_id: String,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        domain: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            secret: secret.into(),
            domain: domain.into(),
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One issued secret (code, access token, or refresh token) and its validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSecret {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    #[serde(with = "lifetime_seconds")]
    pub lifetime: Duration,
}

impl IssuedSecret {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            issued_at,
            lifetime,
        }
    }

    /// End of the validity window, `None` on timestamp overflow
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at.checked_add_signed(self.lifetime)
    }

    /// Whether the lifetime survives the whole-second payload encoding unchanged
    pub fn has_whole_second_lifetime(&self) -> bool {
        Duration::try_seconds(self.lifetime.num_seconds()) == Some(self.lifetime)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires_at| expires_at <= now)
    }
}

/// Full metadata of an issued token, stored as the record payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<IssuedSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<IssuedSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<IssuedSecret>,
}

impl TokenMetadata {
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: user_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            code: None,
            access: None,
            refresh: None,
        }
    }

    pub fn with_code(
        mut self,
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        self.code = Some(IssuedSecret::new(value, issued_at, lifetime));
        self
    }

    pub fn with_access(
        mut self,
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        self.access = Some(IssuedSecret::new(value, issued_at, lifetime));
        self
    }

    pub fn with_refresh(
        mut self,
        value: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        self.refresh = Some(IssuedSecret::new(value, issued_at, lifetime));
        self
    }

    pub fn code_value(&self) -> Option<&str> {
        non_empty(&self.code)
    }

    pub fn access_value(&self) -> Option<&str> {
        non_empty(&self.access)
    }

    pub fn refresh_value(&self) -> Option<&str> {
        non_empty(&self.refresh)
    }

    /// Secret whose window bounds the whole record: refresh, else access, else code
    pub fn governing_secret(&self) -> Option<&IssuedSecret> {
        [&self.refresh, &self.access, &self.code]
            .into_iter()
            .flatten()
            .find(|secret| !secret.value.is_empty())
    }

    /// When the record as a whole stops being valid
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.governing_secret().and_then(IssuedSecret::expires_at)
    }
}

fn non_empty(secret: &Option<IssuedSecret>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.value.as_str())
        .filter(|v| !v.is_empty())
}

/// Serialize a lifetime as whole seconds
mod lifetime_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| D::Error::custom(format!("lifetime out of range: {seconds}s")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_only_expiry() {
        let issued_at = Utc::now();
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile").with_code(
            "code_123",
            issued_at,
            Duration::minutes(5),
        );
        assert_eq!(token.expires_at(), Some(issued_at + Duration::minutes(5)));
    }

    #[test]
    fn test_refresh_window_overrides_code_and_access() {
        let issued_at = Utc::now();
        let refresh_issued_at = issued_at + Duration::seconds(30);
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile")
            .with_code("code_123", issued_at, Duration::minutes(5))
            .with_access("access_123", issued_at, Duration::hours(1))
            .with_refresh("refresh_123", refresh_issued_at, Duration::days(30));
        assert_eq!(
            token.expires_at(),
            Some(refresh_issued_at + Duration::days(30))
        );
    }

    #[test]
    fn test_access_window_overrides_code() {
        let issued_at = Utc::now();
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile")
            .with_code("code_123", issued_at, Duration::days(1))
            .with_access("access_123", issued_at, Duration::minutes(10));
        assert_eq!(token.expires_at(), Some(issued_at + Duration::minutes(10)));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let issued_at = Utc::now();
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile")
            .with_code("code_123", issued_at, Duration::minutes(5))
            .with_refresh("", issued_at, Duration::days(30));
        assert_eq!(token.refresh_value(), None);
        assert_eq!(token.expires_at(), Some(issued_at + Duration::minutes(5)));

        let empty = TokenMetadata::new("abc", "me", "http://localhost", "profile");
        assert!(empty.governing_secret().is_none());
        assert!(empty.expires_at().is_none());
    }

    #[test]
    fn test_payload_shape() {
        let issued_at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile").with_access(
            "access_123",
            issued_at,
            Duration::minutes(5),
        );
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["access"]["lifetime"], 300);
        assert!(value.get("code").is_none());

        let decoded: TokenMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn test_whole_second_lifetime() {
        let now = Utc::now();
        assert!(IssuedSecret::new("x", now, Duration::minutes(5)).has_whole_second_lifetime());
        assert!(IssuedSecret::new("x", now, Duration::zero()).has_whole_second_lifetime());
        assert!(
            !IssuedSecret::new("x", now, Duration::milliseconds(1500)).has_whole_second_lifetime()
        );
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let secret = IssuedSecret::new("x", now - Duration::minutes(10), Duration::minutes(5));
        assert!(secret.is_expired(now));
        let secret = IssuedSecret::new("x", now, Duration::minutes(5));
        assert!(!secret.is_expired(now));
    }
}
