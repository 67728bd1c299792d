//! Versioned engine payload carried in the opaque `flags` field of placed
//! objects.
//!
//! The store persists `flags` verbatim; the engine owns the namespaced
//! payload inside it (shadow settings plus the local-space scatter instance
//! list). The payload is version-tagged: a mismatch ignores the payload
//! entirely rather than partially applying it.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::shadow::ShadowSettings;

/// Namespace key inside the flags object.
pub const FLAGS_NAMESPACE: &str = "spriteScatter";
/// Payload schema version written by this engine.
pub const PAYLOAD_VERSION: u32 = 1;

/// One scatter instance in object-local space (relative to the placed
/// object's top-left corner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagInstance {
    pub src: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub rotation: f32,
    #[serde(default)]
    pub flip_h: bool,
    #[serde(default)]
    pub flip_v: bool,
}

/// The complete namespaced payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPayload {
    pub version: u32,
    pub shadow: ShadowSettings,
    #[serde(default)]
    pub instances: Vec<FlagInstance>,
    /// Flip state of a plain single placement (scatter instances carry their
    /// own flips).
    #[serde(default)]
    pub flip_h: bool,
    #[serde(default)]
    pub flip_v: bool,
}

impl ScatterPayload {
    pub fn new(shadow: ShadowSettings, instances: Vec<FlagInstance>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            shadow,
            instances,
            flip_h: false,
            flip_v: false,
        }
    }

    /// Payload for a plain single placement (no scatter instances).
    pub fn shadow_only(shadow: ShadowSettings) -> Self {
        Self::new(shadow, Vec::new())
    }

    pub fn with_flips(mut self, flip_h: bool, flip_v: bool) -> Self {
        self.flip_h = flip_h;
        self.flip_v = flip_v;
        self
    }

    /// Serializes into a fresh flags object.
    pub fn encode(&self) -> Value {
        let mut flags = Value::Object(serde_json::Map::new());
        self.write_into(&mut flags);
        flags
    }

    /// Writes the payload into an existing flags value, preserving foreign
    /// namespaces. Non-object flags are replaced by an object.
    pub fn write_into(&self, flags: &mut Value) {
        if !flags.is_object() {
            *flags = Value::Object(serde_json::Map::new());
        }
        let payload = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(map) = flags.as_object_mut() {
            map.insert(FLAGS_NAMESPACE.to_owned(), payload);
        }
    }

    /// Reads the payload back from a flags value.
    ///
    /// Returns `None` when the namespace is absent, malformed, or carries a
    /// different version — never a partially-applied payload.
    pub fn decode(flags: &Value) -> Option<Self> {
        let raw = flags.get(FLAGS_NAMESPACE)?;
        let version = raw.get("version").and_then(Value::as_u64);
        if version != Some(PAYLOAD_VERSION as u64) {
            warn!(
                "Ignoring scatter payload with version {:?} (expected {}).",
                version, PAYLOAD_VERSION
            );
            return None;
        }
        match serde_json::from_value::<ScatterPayload>(raw.clone()) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Ignoring malformed scatter payload: {}.", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload() -> ScatterPayload {
        ScatterPayload::new(
            ShadowSettings::default(),
            vec![FlagInstance {
                src: "trees/oak.png".into(),
                x: 12.5,
                y: 30.0,
                w: 64.0,
                h: 64.0,
                rotation: 135.0,
                flip_h: true,
                flip_v: false,
            }],
        )
    }

    #[test]
    fn payload_round_trips_losslessly() {
        let original = payload();
        let flags = original.encode();
        let decoded = ScatterPayload::decode(&flags).expect("decodes");
        assert_eq!(decoded, original);
    }

    #[test]
    fn version_mismatch_ignores_payload_entirely() {
        let mut flags = payload().encode();
        flags[FLAGS_NAMESPACE]["version"] = json!(PAYLOAD_VERSION + 1);
        assert!(ScatterPayload::decode(&flags).is_none());
    }

    #[test]
    fn absent_or_foreign_flags_decode_to_none() {
        assert!(ScatterPayload::decode(&Value::Null).is_none());
        assert!(ScatterPayload::decode(&json!({ "otherModule": { "a": 1 } })).is_none());
    }

    #[test]
    fn write_into_preserves_foreign_namespaces() {
        let mut flags = json!({ "otherModule": { "kept": true } });
        payload().write_into(&mut flags);
        assert_eq!(flags["otherModule"]["kept"], json!(true));
        assert!(ScatterPayload::decode(&flags).is_some());

        // Non-object flags are replaced rather than erroring.
        let mut scalar = json!(42);
        payload().write_into(&mut scalar);
        assert!(ScatterPayload::decode(&scalar).is_some());
    }
}
