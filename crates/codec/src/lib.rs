//! Satchel codec: reversible gzip transform for the payload of ConfigMap
//! and Secret objects referenced by a ResourceSet.
//!
//! Values stay base64 text on the wire in both states; when compressed,
//! the text decodes to a gzip stream. An annotation records the state so
//! repeated application is a no-op. Inputs are never mutated.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use kube::core::DynamicObject;
use serde_json::{Map, Value};
use tracing::debug;

use satchel_core::{PayloadKind, COMPRESSED_ANNOTATION};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("resource kind is {0:?}, must be ConfigMap or Secret")]
    UnknownKind(String),
    #[error("field {0:?} not found")]
    MissingField(&'static str),
    #[error("field {0:?} is not a map")]
    MalformedField(&'static str),
    #[error("field {field:?} value for key {key:?} is not a string")]
    NotAString { field: &'static str, key: String },
    #[error("compressing key {key:?} value: {reason}")]
    Compress { key: String, reason: String },
    #[error("decompressing key {key:?} value: {reason}")]
    Decompress { key: String, reason: String },
}

/// Read the compression marker off an object; an absent annotation means
/// not compressed.
pub fn is_compressed(obj: &DynamicObject) -> bool {
    obj.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(COMPRESSED_ANNOTATION))
        .is_some_and(|v| v == "true")
}

/// Compress the payload of a ConfigMap or Secret and mark it as such.
/// Returns a fresh object; an already-compressed input comes back as an
/// unchanged deep copy.
pub fn compress(src: &DynamicObject) -> Result<DynamicObject, CodecError> {
    let kind = payload_kind(src)?;
    if is_compressed(src) {
        return Ok(src.clone());
    }
    let payload = ResourcePayload::from_object(src, kind)?;
    debug!(kind = kind.as_str(), keys = payload.fields.len(), "compressing payload");
    Ok(payload.compress()?.apply_to(src))
}

/// Inverse of [`compress`]: restore the original payload values and clear
/// the marker. A not-compressed input comes back as an unchanged copy.
pub fn decompress(src: &DynamicObject) -> Result<DynamicObject, CodecError> {
    let kind = payload_kind(src)?;
    if !is_compressed(src) {
        return Ok(src.clone());
    }
    let payload = ResourcePayload::from_object(src, kind)?;
    debug!(kind = kind.as_str(), keys = payload.fields.len(), "decompressing payload");
    Ok(payload.decompress()?.apply_to(src))
}

fn payload_kind(obj: &DynamicObject) -> Result<PayloadKind, CodecError> {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("");
    PayloadKind::from_kind(kind).ok_or_else(|| CodecError::UnknownKind(kind.to_string()))
}

/// Typed view of a resource's payload map plus its compression state.
///
/// The `"true"`/`"false"` annotation form exists only at the object
/// boundary; in here the marker is a plain bool, and the invariant holds
/// that it is true iff every field value is gzip-compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePayload {
    pub kind: PayloadKind,
    pub fields: BTreeMap<String, String>,
    pub compressed: bool,
}

impl ResourcePayload {
    /// Read the payload map out of an object already resolved to `kind`.
    pub fn from_object(obj: &DynamicObject, kind: PayloadKind) -> Result<Self, CodecError> {
        let field = kind.data_field();
        let map = match obj.data.get(field) {
            None | Some(Value::Null) => return Err(CodecError::MissingField(field)),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(CodecError::MalformedField(field)),
        };
        let mut fields = BTreeMap::new();
        for (key, value) in map {
            match value {
                Value::String(s) => {
                    fields.insert(key.clone(), s.clone());
                }
                _ => return Err(CodecError::NotAString { field, key: key.clone() }),
            }
        }
        Ok(Self { kind, fields, compressed: is_compressed(obj) })
    }

    /// Write the payload onto a deep copy of `src`, recording the marker
    /// in its wire form.
    pub fn apply_to(&self, src: &DynamicObject) -> DynamicObject {
        let mut dst = src.clone();
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if !dst.data.is_object() {
            dst.data = Value::Object(Map::new());
        }
        if let Value::Object(data) = &mut dst.data {
            data.insert(self.kind.data_field().to_string(), Value::Object(map));
        }
        dst.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(
                COMPRESSED_ANNOTATION.to_string(),
                if self.compressed { "true" } else { "false" }.to_string(),
            );
        dst
    }

    /// Gzip every field value (base64 text in, base64 text out). No-op
    /// when already compressed.
    pub fn compress(&self) -> Result<Self, CodecError> {
        if self.compressed {
            return Ok(self.clone());
        }
        let mut out = self.clone();
        for (key, value) in &self.fields {
            let packed = compress_value(value)
                .map_err(|reason| CodecError::Compress { key: key.clone(), reason })?;
            out.fields.insert(key.clone(), packed);
        }
        out.compressed = true;
        Ok(out)
    }

    /// Gunzip every field value. No-op when not compressed.
    pub fn decompress(&self) -> Result<Self, CodecError> {
        if !self.compressed {
            return Ok(self.clone());
        }
        let mut out = self.clone();
        for (key, value) in &self.fields {
            let plain = decompress_value(value)
                .map_err(|reason| CodecError::Decompress { key: key.clone(), reason })?;
            out.fields.insert(key.clone(), plain);
        }
        out.compressed = false;
        Ok(out)
    }
}

/// Base64-decode `v`, gzip the raw bytes, and return them as base64 text
/// again.
fn compress_value(v: &str) -> Result<String, String> {
    let raw = BASE64.decode(v).map_err(|e| e.to_string())?;
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).map_err(|e| e.to_string())?;
    let packed = enc.finish().map_err(|e| e.to_string())?;
    Ok(BASE64.encode(packed))
}

/// Base64-decode `v`, gunzip it, and re-encode the recovered bytes as
/// base64 text.
fn decompress_value(v: &str) -> Result<String, String> {
    let raw = BASE64.decode(v).map_err(|e| e.to_string())?;
    let mut dec = GzDecoder::new(raw.as_slice());
    let mut plain = Vec::new();
    dec.read_to_end(&mut plain).map_err(|e| e.to_string())?;
    Ok(BASE64.encode(plain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::TypeMeta;
    use serde_json::json;

    // base64 of the literal bytes `value`
    const PLAIN: &str = "dmFsdWU=";
    // gzip+base64 of the same bytes as produced by the original Go codec
    const GO_COMPRESSED: &str = "H4sIAAAAAAAA/ypLzClNBQQAAP//NFh3HQUAAAA=";

    fn obj(kind: &str, data: Value) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta { api_version: "v1".to_string(), kind: kind.to_string() }),
            metadata: Default::default(),
            data,
        }
    }

    fn mark_compressed(mut o: DynamicObject) -> DynamicObject {
        o.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(COMPRESSED_ANNOTATION.to_string(), "true".to_string());
        o
    }

    fn payload_value(o: &DynamicObject, field: &str, key: &str) -> String {
        o.data[field][key].as_str().expect("payload value").to_string()
    }

    #[test]
    fn compress_config_map_uses_binary_data_field() {
        let src = obj("ConfigMap", json!({ "binaryData": { "key": PLAIN } }));
        let got = compress(&src).unwrap();

        assert!(is_compressed(&got));
        let packed = payload_value(&got, "binaryData", "key");
        // gzip magic + deflate method, zero mtime
        assert!(packed.starts_with("H4sI"), "{packed}");
        assert_ne!(packed, PLAIN);
        // the input object is untouched
        assert_eq!(payload_value(&src, "binaryData", "key"), PLAIN);
        assert!(!is_compressed(&src));

        let back = decompress(&got).unwrap();
        assert_eq!(payload_value(&back, "binaryData", "key"), PLAIN);
        assert!(!is_compressed(&back));
    }

    #[test]
    fn compress_secret_uses_data_field() {
        let src = obj("Secret", json!({ "data": { "key": PLAIN } }));
        let got = compress(&src).unwrap();
        assert!(is_compressed(&got));
        assert!(payload_value(&got, "data", "key").starts_with("H4sI"));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let src = obj("Foobar", json!({ "data": { "key": PLAIN } }));
        assert!(matches!(compress(&src), Err(CodecError::UnknownKind(k)) if k == "Foobar"));
        assert!(matches!(decompress(&src), Err(CodecError::UnknownKind(k)) if k == "Foobar"));

        let untyped = DynamicObject { types: None, metadata: Default::default(), data: json!({}) };
        assert!(matches!(compress(&untyped), Err(CodecError::UnknownKind(k)) if k.is_empty()));
    }

    #[test]
    fn compress_is_idempotent() {
        let src = obj("ConfigMap", json!({ "binaryData": { "key": PLAIN } }));
        let once = compress(&src).unwrap();
        let twice = compress(&once).unwrap();
        assert_eq!(
            serde_json::to_value(&once).unwrap(),
            serde_json::to_value(&twice).unwrap()
        );
    }

    #[test]
    fn decompress_without_marker_is_a_copy() {
        let src = obj("ConfigMap", json!({ "binaryData": { "key": PLAIN } }));
        let got = decompress(&src).unwrap();
        assert_eq!(
            serde_json::to_value(&src).unwrap(),
            serde_json::to_value(&got).unwrap()
        );
    }

    #[test]
    fn marked_object_compresses_as_a_copy_even_without_payload() {
        // The original may have been persisted with no payload field at
        // all; the marker alone decides the no-op path.
        let src = mark_compressed(obj("ConfigMap", json!({})));
        let got = compress(&src).unwrap();
        assert_eq!(
            serde_json::to_value(&src).unwrap(),
            serde_json::to_value(&got).unwrap()
        );
    }

    #[test]
    fn missing_payload_field_is_an_error() {
        let src = obj("ConfigMap", json!({}));
        assert!(matches!(compress(&src), Err(CodecError::MissingField("binaryData"))));

        let wrong_field = obj("Secret", json!({ "binaryData": { "key": PLAIN } }));
        assert!(matches!(compress(&wrong_field), Err(CodecError::MissingField("data"))));
    }

    #[test]
    fn malformed_payload_field_is_an_error() {
        let src = obj("ConfigMap", json!({ "binaryData": ["not", "a", "map"] }));
        assert!(matches!(compress(&src), Err(CodecError::MalformedField("binaryData"))));

        let non_string = obj("ConfigMap", json!({ "binaryData": { "key": 42 } }));
        assert!(matches!(
            compress(&non_string),
            Err(CodecError::NotAString { field: "binaryData", key }) if key == "key"
        ));
    }

    #[test]
    fn bad_base64_aborts_and_names_the_key() {
        let src = obj(
            "ConfigMap",
            json!({ "binaryData": { "good": PLAIN, "bad": "!!not base64!!" } }),
        );
        assert!(matches!(compress(&src), Err(CodecError::Compress { key, .. }) if key == "bad"));
    }

    #[test]
    fn bad_gzip_aborts_and_names_the_key() {
        // Valid base64, but the bytes are not a gzip stream.
        let src = mark_compressed(obj("Secret", json!({ "data": { "key": "bm9wZQ==" } })));
        assert!(matches!(decompress(&src), Err(CodecError::Decompress { key, .. }) if key == "key"));
    }

    #[test]
    fn decompresses_payloads_written_by_the_go_codec() {
        let src = mark_compressed(obj("ConfigMap", json!({ "binaryData": { "key": GO_COMPRESSED } })));
        let got = decompress(&src).unwrap();
        assert_eq!(payload_value(&got, "binaryData", "key"), PLAIN);
        assert!(!is_compressed(&got));
    }

    #[test]
    fn payload_model_round_trip() {
        let payload = ResourcePayload {
            kind: PayloadKind::Secret,
            fields: [("a".to_string(), PLAIN.to_string())].into(),
            compressed: false,
        };
        let packed = payload.compress().unwrap();
        assert!(packed.compressed);
        assert_eq!(packed.compress().unwrap(), packed);
        assert_eq!(packed.decompress().unwrap(), payload);
    }
}
