use serde::{Deserialize, Serialize};

/// The mapping packed into every envelope.
///
/// `csrf_driver` names the strategy that produced the token and
/// `persistence_driver` the channel it is meant for; `id` and `uid` are
/// strategy-specific. Field names on the wire are camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    #[serde(
        rename = "csrfDriver",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub csrf_driver: Option<String>,
    #[serde(
        rename = "persistenceDriver",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub persistence_driver: Option<String>,
    /// Random id, double-submit family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The caller's identity at generation time, authenticated family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl TokenPayload {
    /// Whether the channel delivered nothing. Absent channels unpack to the
    /// empty payload, never to a null.
    pub fn is_empty(&self) -> bool {
        self.csrf_driver.is_none()
            && self.persistence_driver.is_none()
            && self.id.is_none()
            && self.uid.is_none()
    }
}

/// Unpacked tokens for every channel the active strategy persists to, built
/// fresh per inbound request and discarded after verification.
#[derive(Debug, Clone, Default)]
pub struct ChannelTokens {
    pub header: TokenPayload,
    pub cookie: TokenPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(TokenPayload::default().is_empty());
    }

    #[test]
    fn any_field_makes_it_non_empty() {
        let payload = TokenPayload {
            uid: Some("user-1".into()),
            ..Default::default()
        };

        assert!(!payload.is_empty());
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let payload = TokenPayload {
            csrf_driver: Some("DOUBLE_SUBMIT".into()),
            persistence_driver: Some("header".into()),
            id: Some("abc".into()),
            uid: None,
        };

        let json = serde_json::to_string(&payload).unwrap();

        assert_eq!(
            json,
            r#"{"csrfDriver":"DOUBLE_SUBMIT","persistenceDriver":"header","id":"abc"}"#
        );
    }

    #[test]
    fn ignores_unknown_fields() {
        let payload: TokenPayload =
            serde_json::from_str(r#"{"uid":"user-1","legacy":true}"#).unwrap();

        assert_eq!(payload.uid.as_deref(), Some("user-1"));
    }
}
