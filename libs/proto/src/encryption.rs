//! Encryption method labels for reply encoding negotiation.

use serde::{Deserialize, Serialize};

/// Cipher label attached to an action and negotiated for a whole reply.
///
/// The derived `Ord` defines the negotiation total order
/// `none < hmacsha256 < aes256gcm`: the reply-wide method is the strongest
/// method observed across the delivered candidates. The cipher
/// implementations themselves live with the encryption collaborator; this
/// crate only threads the labels through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMethod {
    /// Plaintext reply.
    #[default]
    None,
    /// HMAC-SHA256 authenticated reply.
    #[serde(rename = "hmacsha256")]
    HmacSha256,
    /// AES-256-GCM encrypted reply.
    #[serde(rename = "aes256gcm")]
    Aes256Gcm,
}

impl EncryptionMethod {
    /// The wire label for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionMethod::None => "none",
            EncryptionMethod::HmacSha256 => "hmacsha256",
            EncryptionMethod::Aes256Gcm => "aes256gcm",
        }
    }

    /// Fold another observed method into a negotiation accumulator.
    pub fn negotiate(self, observed: EncryptionMethod) -> EncryptionMethod {
        self.max(observed)
    }
}

impl std::fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EncryptionMethod {
    type Err = UnknownEncryptionMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EncryptionMethod::None),
            "hmacsha256" => Ok(EncryptionMethod::HmacSha256),
            "aes256gcm" => Ok(EncryptionMethod::Aes256Gcm),
            other => Err(UnknownEncryptionMethod(other.to_string())),
        }
    }
}

/// A cipher label outside the negotiable set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encryption method: {0}")]
pub struct UnknownEncryptionMethod(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn wire_labels_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&EncryptionMethod::HmacSha256).unwrap(),
            "\"hmacsha256\""
        );
        assert_eq!(
            serde_json::to_string(&EncryptionMethod::Aes256Gcm).unwrap(),
            "\"aes256gcm\""
        );
        assert_eq!(
            serde_json::from_str::<EncryptionMethod>("\"none\"").unwrap(),
            EncryptionMethod::None
        );
    }

    #[test]
    fn negotiation_never_downgrades() {
        let m = EncryptionMethod::Aes256Gcm;
        assert_eq!(m.negotiate(EncryptionMethod::None), EncryptionMethod::Aes256Gcm);
        assert_eq!(
            m.negotiate(EncryptionMethod::HmacSha256),
            EncryptionMethod::Aes256Gcm
        );
    }

    fn any_method() -> impl Strategy<Value = EncryptionMethod> {
        prop_oneof![
            Just(EncryptionMethod::None),
            Just(EncryptionMethod::HmacSha256),
            Just(EncryptionMethod::Aes256Gcm),
        ]
    }

    proptest! {
        // The negotiated method is the maximum of the observed set, so the
        // order candidates arrive in cannot change the outcome.
        #[test]
        fn negotiation_is_order_insensitive(mut methods in proptest::collection::vec(any_method(), 1..8)) {
            let forward = methods
                .iter()
                .fold(EncryptionMethod::None, |acc, m| acc.negotiate(*m));
            methods.reverse();
            let backward = methods
                .iter()
                .fold(EncryptionMethod::None, |acc, m| acc.negotiate(*m));
            prop_assert_eq!(forward, backward);
            prop_assert_eq!(forward, methods.iter().copied().max().unwrap());
        }
    }
}
