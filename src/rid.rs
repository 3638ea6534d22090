//! Typed resource identifiers
//! --------------------------
//! Public-facing keys for every resource are RIDs: a short kind tag, an
//! underscore, and a base62-encoded version-7 UUID (e.g. `u_AZhjuMmhePWkHFALenFEfg`).
//! The tag makes ids collision-proof across resource kinds, and the UUIDv7
//! payload keeps them time-ordered. Decoding is pure parsing plus the version
//! check; it never consults storage.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

pub const USER_PREFIX: &str = "u";
pub const GAME_PREFIX: &str = "g";
pub const GAME_TOKEN_PREFIX: &str = "gt";
pub const GAME_SESSION_PREFIX: &str = "gs";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RidError {
    #[error("RID format is incorrect")]
    Format,
    #[error("RID UUID is not valid base62")]
    Encoding,
    #[error("the base62 UUID part of the RID string is not a valid UUIDv7")]
    Version,
}

/// A type-safe UUID. The prefix indicates the resource kind, the suffix is a
/// base62 encoded UUIDv7. Two RIDs are equal iff both fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rid {
    pub prefix: String,
    pub id: Uuid,
}

impl Rid {
    pub fn new(prefix: impl Into<String>, id: Uuid) -> Self {
        Self { prefix: prefix.into(), id }
    }

    pub fn user(id: Uuid) -> Self { Self::new(USER_PREFIX, id) }
    pub fn game(id: Uuid) -> Self { Self::new(GAME_PREFIX, id) }
    pub fn game_token(id: Uuid) -> Self { Self::new(GAME_TOKEN_PREFIX, id) }
    pub fn game_session(id: Uuid) -> Self { Self::new(GAME_SESSION_PREFIX, id) }
}

impl Display for Rid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // encode_alternative uses the 0-9a-zA-Z alphabet and emits no padding
        write!(f, "{}_{}", self.prefix, base62::encode_alternative(self.id.as_u128()))
    }
}

impl FromStr for Rid {
    type Err = RidError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let Some((prefix, payload)) = text.split_once('_') else {
            return Err(RidError::Format);
        };
        if prefix.is_empty() || payload.is_empty() {
            return Err(RidError::Format);
        }
        let raw = base62::decode_alternative(payload).map_err(|_| RidError::Encoding)?;
        let id = Uuid::from_u128(raw);
        if id.get_version_num() != 7 {
            return Err(RidError::Version);
        }
        Ok(Rid { prefix: prefix.to_string(), id })
    }
}

impl Serialize for Rid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_kinds() {
        let id = Uuid::now_v7();
        for prefix in [USER_PREFIX, GAME_PREFIX, GAME_TOKEN_PREFIX, GAME_SESSION_PREFIX] {
            let rid = Rid::new(prefix, id);
            let parsed: Rid = rid.to_string().parse().expect("round trip");
            assert_eq!(parsed, rid);
        }
    }

    #[test]
    fn round_trip_fixed_uuid() {
        let id = Uuid::parse_str("01903f6e-5d5c-7b3a-8f00-7a0fb1bfa2a1").unwrap();
        let rid = Rid::user(id);
        let parsed: Rid = rid.to_string().parse().unwrap();
        assert_eq!(parsed.prefix, "u");
        assert_eq!(parsed.id, id);
    }

    #[test]
    fn kind_tag_is_part_of_identity() {
        // same UUID under a different tag decodes fine but is a different RID
        let id = Uuid::now_v7();
        let session = Rid::game_session(id);
        let parsed: Rid = session.to_string().parse().unwrap();
        assert_eq!(parsed.id, id);
        assert_ne!(parsed.prefix, USER_PREFIX);
        assert_ne!(parsed, Rid::user(id));
    }

    #[test]
    fn rejects_missing_separator_and_empty_sides() {
        assert_eq!("noseparator".parse::<Rid>().unwrap_err(), RidError::Format);
        assert_eq!("_AZhjuMmhePWkHFALenFEfg".parse::<Rid>().unwrap_err(), RidError::Format);
        assert_eq!("u_".parse::<Rid>().unwrap_err(), RidError::Format);
        assert_eq!("".parse::<Rid>().unwrap_err(), RidError::Format);
    }

    #[test]
    fn rejects_non_base62_payload() {
        assert_eq!("u_not-base62!".parse::<Rid>().unwrap_err(), RidError::Encoding);
    }

    #[test]
    fn rejects_non_v7_uuid() {
        let v4 = Rid::user(Uuid::new_v4());
        assert_eq!(v4.to_string().parse::<Rid>().unwrap_err(), RidError::Version);
    }

    #[test]
    fn serde_as_text_form() {
        let rid = Rid::game(Uuid::now_v7());
        let json = serde_json::to_string(&rid).unwrap();
        assert_eq!(json, format!("\"{}\"", rid));
        let back: Rid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rid);
    }
}
