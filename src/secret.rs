use std::fmt;

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::EngineError;

/// Marker key used when a secret is written to a serialized snapshot.
pub const SECRET_MARKER: &str = "$secret";

const REDACTED: &str = "[REDACTED]";

/// Wraps a sensitive value so it never reaches persisted state or logs in
/// plaintext.
///
/// A `Secret<T>` serializes to the marker object `{"$secret": "[REDACTED]"}`
/// on every serialization path — there is no opt-out — and deserializes to a
/// redacted placeholder. The plaintext is only reachable through
/// [`Secret::reveal`], which fails on a placeholder, so a value restored
/// from a state snapshot can never be mistaken for the original. Handlers
/// that need the plaintext during delete must obtain it from the original
/// source, not from the stored input.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T> {
    value: Option<T>,
}

impl<T> Secret<T> {
    /// Wrap a sensitive value.
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// A placeholder with no recoverable value, as produced when a snapshot
    /// is read back from state.
    pub fn redacted() -> Self {
        Self { value: None }
    }

    /// Explicit access to the plaintext. Fails with
    /// [`EngineError::SecretRedacted`] if this secret came out of a
    /// serialized snapshot.
    pub fn reveal(&self) -> Result<&T, EngineError> {
        self.value.as_ref().ok_or(EngineError::SecretRedacted)
    }

    /// Whether the plaintext has been lost to redaction.
    pub fn is_redacted(&self) -> bool {
        self.value.is_none()
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", REDACTED)
    }
}

impl<T> Serialize for Secret<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(SECRET_MARKER, REDACTED)?;
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MarkerVisitor;

        impl<'de> Visitor<'de> for MarkerVisitor {
            type Value = ();

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a {{\"{}\": ...}} marker object", SECRET_MARKER)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
                let mut seen = false;
                while let Some(key) = map.next_key::<String>()? {
                    map.next_value::<IgnoredAny>()?;
                    if key == SECRET_MARKER {
                        seen = true;
                    }
                }
                if seen {
                    Ok(())
                } else {
                    Err(serde::de::Error::custom("missing secret marker"))
                }
            }
        }

        deserializer.deserialize_map(MarkerVisitor)?;
        Ok(Self::redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_never_show_plaintext() {
        let s = Secret::new("hunter2".to_string());
        assert_eq!(format!("{:?}", s), "Secret([REDACTED])");
        assert_eq!(format!("{}", s), "[REDACTED]");
    }

    #[test]
    fn serializes_to_marker_only() {
        let s = Secret::new("hunter2".to_string());
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("hunter2"));
        assert_eq!(json, r#"{"$secret":"[REDACTED]"}"#);
    }

    #[test]
    fn deserializes_to_redacted_placeholder() {
        let s: Secret<String> = serde_json::from_str(r#"{"$secret":"[REDACTED]"}"#).unwrap();
        assert!(s.is_redacted());
        assert!(s.reveal().is_err());
    }

    #[test]
    fn reveal_returns_live_value() {
        let s = Secret::new(42u32);
        assert_eq!(*s.reveal().unwrap(), 42);
        assert!(!s.is_redacted());
    }

    #[test]
    fn nested_in_struct_round_trips_as_marker() {
        #[derive(Serialize, Deserialize)]
        struct Input {
            name: String,
            token: Secret<String>,
        }

        let input = Input {
            name: "db".into(),
            token: Secret::new("tok-123".into()),
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(!json.contains("tok-123"));

        let back: Input = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "db");
        assert!(back.token.is_redacted());
    }
}
