use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(ToolCallId, "call");

/// Identifier for one end-to-end run: timestamp plus an 8-hex random suffix,
/// e.g. `run_20250422_212715_4bd7549d`. The timestamp part keeps run
/// directories sortable by name; the suffix disambiguates same-second runs.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self::generate(Utc::now())
    }

    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("run_{}_{suffix:08x}", at.format("%Y%m%d_%H%M%S")))
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tool_call_id_has_prefix() {
        let id = ToolCallId::new();
        assert!(id.as_str().starts_with("call_"), "got: {id}");
    }

    #[test]
    fn run_id_has_prefix() {
        let id = RunId::new();
        assert!(id.as_str().starts_with("run_"), "got: {id}");
    }

    #[test]
    fn run_id_embeds_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 4, 22, 21, 27, 15).unwrap();
        let id = RunId::generate(at);
        assert!(id.as_str().starts_with("run_20250422_212715_"), "got: {id}");
        let suffix = id.as_str().rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_roundtrip() {
        let id = ToolCallId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ToolCallId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = ToolCallId::from_raw("toolu_abc123");
        assert_eq!(id.as_str(), "toolu_abc123");
    }

    #[test]
    fn tool_call_ids_monotonic() {
        let ids: Vec<ToolCallId> = (0..100).map(|_| ToolCallId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str(), "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}
