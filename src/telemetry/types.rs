//! Shared telemetry helpers: timestamps and identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Wall-clock timestamp used on events and spans.
pub type Timestamp = DateTime<Utc>;

/// Current wall-clock time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Nanoseconds since the Unix epoch, saturating at zero for pre-epoch times.
pub fn unix_nanos(ts: &Timestamp) -> u64 {
    ts.timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

/// Session identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Event identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 128-bit trace identifier, rendered as 32 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// One trace per session: the trace id is the session's UUID bytes, so every
    /// process contributing to the session produces the same trace id.
    pub fn for_session(session_id: &SessionId) -> Self {
        Self(*session_id.as_uuid().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

/// 64-bit span identifier, rendered as 16 lowercase hex chars. Never all zeros.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub fn random() -> Self {
        loop {
            let uuid = Uuid::new_v4();
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&uuid.as_bytes()[..8]);
            if bytes != [0u8; 8] {
                return Self(bytes);
            }
        }
    }

    /// Deterministic span id derived from `seed`; used for spans every process
    /// attached to the same session must agree on (the session root).
    pub fn derive(seed: &[u8]) -> Self {
        let hash = blake3::hash(seed);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        if bytes == [0u8; 8] {
            bytes[7] = 1;
        }
        Self(bytes)
    }

    /// Root span id of a session.
    pub fn session_root(session_id: &SessionId) -> Self {
        let mut seed = b"agentspan.session.root:".to_vec();
        seed.extend_from_slice(session_id.as_uuid().as_bytes());
        Self::derive(&seed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

macro_rules! hex_id_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.to_hex())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $ty::from_hex(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid {}: {}", stringify!($ty), s))
                })
            }
        }
    };
}

hex_id_impls!(TraceId);
hex_id_impls!(SpanId);
