//! Newtype identifiers.
//!
//! A [`ConnectionId`] names one transport connection and is only used for
//! log and error correlation. An [`Identity`] is what token verification
//! yields; it is both the authenticated principal and the pub/sub channel
//! key for that principal.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_newtype! {
    /// Identifier assigned to a connection when the transport accepts it.
    ConnectionId
}

string_newtype! {
    /// Verified principal returned by a [`TokenVerifier`](crate::TokenVerifier).
    Identity
}

impl ConnectionId {
    /// Create a fresh, time-ordered connection id (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Identity {
    /// Pub/sub channel carrying messages for this identity.
    ///
    /// Channels are keyed by the identity itself, one per principal.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_is_a_uuid() {
        let id = ConnectionId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn identity_channel_is_identity() {
        let identity = Identity::from("userId");
        assert_eq!(identity.channel(), "userId");
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let identity = Identity::from("userId");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json, serde_json::json!("userId"));
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("conn-id");
        assert_eq!(id.to_string(), "conn-id");
        assert_eq!(String::from(id), "conn-id");
    }
}
