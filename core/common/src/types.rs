//! Identifiers and time selectors used throughout the gregor client.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

macro_rules! byte_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Wrap raw identifier bytes.
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            /// Raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Whether the identifier carries no bytes.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(&self.0))
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }
    };
}

byte_id!(
    /// Opaque identifier of a user. Used as the persistence key.
    UserId
);

byte_id!(
    /// Opaque identifier of one of a user's devices.
    DeviceId
);

byte_id!(
    /// Identifier of a message, unique within a user's state.
    MsgId
);

impl MsgId {
    /// Generate a fresh random message id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_bytes().to_vec())
    }
}

/// The (user, device) pair a client acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user: UserId,
    pub device: DeviceId,
}

impl Identity {
    pub fn new(user: UserId, device: DeviceId) -> Self {
        Self { user, device }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.device)
    }
}

/// Point in time at which state is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrOffset {
    /// The current time.
    #[default]
    Now,
    /// An absolute instant.
    Time(DateTime<Utc>),
    /// An offset from the current time (negative looks into the past).
    Offset(Duration),
}

impl TimeOrOffset {
    /// Resolve the selector against `now`.
    ///
    /// # Errors
    /// - `InvalidInput` if the offset moves past the representable range
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self {
            TimeOrOffset::Now => Ok(now),
            TimeOrOffset::Time(t) => Ok(*t),
            TimeOrOffset::Offset(d) => now.checked_add_signed(*d).ok_or_else(|| {
                Error::InvalidInput(format!("time offset {} out of range", d))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_is_hex() {
        let id = MsgId::new(vec![0x01, 0xab, 0xff]);
        assert_eq!(id.to_string(), "01abff");
        assert_eq!(id.as_bytes(), &[0x01, 0xab, 0xff]);
    }

    #[test]
    fn test_random_msg_ids_differ() {
        let a = MsgId::random();
        let b = MsgId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_bytes().len(), 16);
    }

    #[test]
    fn test_id_serialization() {
        let user = UserId::new(b"alice".to_vec());
        let json = serde_json::to_string(&user).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn test_time_or_offset_resolve() {
        let now = Utc::now();
        let earlier = now - Duration::seconds(30);

        assert_eq!(TimeOrOffset::Now.resolve(now).unwrap(), now);
        assert_eq!(TimeOrOffset::Time(earlier).resolve(now).unwrap(), earlier);
        assert_eq!(
            TimeOrOffset::Offset(Duration::seconds(-30))
                .resolve(now)
                .unwrap(),
            earlier
        );
    }

    #[test]
    fn test_offset_overflow_is_an_error() {
        let now = Utc::now();
        let far = TimeOrOffset::Offset(Duration::days(365 * 300_000));
        assert!(matches!(far.resolve(now), Err(Error::InvalidInput(_))));

        let before = TimeOrOffset::Offset(-Duration::days(365 * 300_000));
        assert!(matches!(before.resolve(now), Err(Error::InvalidInput(_))));
    }
}
