//! TensorFlow Lite flatbuffer header validation
//!
//! A `.tflite` file is a flatbuffer whose root table is `tflite.Model`.
//! Before a model is handed to an interpreter we check the file identifier
//! and that field 0 of the root table (`version`) matches the schema the
//! runtime was built against.
//!
//! ```text
//! [0..4)  u32  offset of root table
//! [4..8)  "TFL3" file identifier
//! root:   i32  signed offset back to the vtable
//! vtable: u16 vtable_len, u16 table_len, u16 field offsets...
//! ```

use crate::error::{Result, WakeWordError};

/// Schema version the runtime understands
pub const TFLITE_SCHEMA_VERSION: u32 = 3;

/// Flatbuffer file identifier of TFLite models
pub const TFLITE_FILE_IDENTIFIER: &[u8; 4] = b"TFL3";

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_i32(bytes: &[u8], at: usize) -> Option<i32> {
    read_u32(bytes, at).map(|v| v as i32)
}

fn malformed(what: &str) -> WakeWordError {
    WakeWordError::InvalidModel(format!("malformed flatbuffer: {}", what))
}

/// Read the `version` field of a TFLite model without validating it
pub fn model_version(model: &[u8]) -> Result<u32> {
    if model.len() < 8 {
        return Err(WakeWordError::InvalidModel(format!(
            "{} bytes is too short for a flatbuffer header",
            model.len()
        )));
    }
    if &model[4..8] != TFLITE_FILE_IDENTIFIER {
        return Err(WakeWordError::InvalidModel(
            "missing TFL3 file identifier".to_string(),
        ));
    }

    let root = read_u32(model, 0).ok_or_else(|| malformed("root offset"))? as usize;
    let soffset = read_i32(model, root).ok_or_else(|| malformed("root table out of bounds"))?;
    let vtable = root as i64 - soffset as i64;
    if vtable < 0 {
        return Err(malformed("vtable before start of buffer"));
    }
    let vtable = vtable as usize;

    let vtable_len = read_u16(model, vtable).ok_or_else(|| malformed("vtable out of bounds"))?;
    if vtable_len < 4 || vtable + vtable_len as usize > model.len() {
        return Err(malformed("vtable length"));
    }

    // Field 0 absent from the vtable means the default value, 0
    if vtable_len < 6 {
        return Ok(0);
    }
    let field = read_u16(model, vtable + 4).ok_or_else(|| malformed("vtable entry"))?;
    if field == 0 {
        return Ok(0);
    }
    read_u32(model, root + field as usize).ok_or_else(|| malformed("version field out of bounds"))
}

/// Validate a TFLite model header and return its schema version
///
/// # Errors
/// `InvalidModel` if the buffer is not a TFLite flatbuffer or its schema
/// version differs from [`TFLITE_SCHEMA_VERSION`].
pub fn validate(model: &[u8]) -> Result<u32> {
    let version = model_version(model)?;
    if version != TFLITE_SCHEMA_VERSION {
        return Err(WakeWordError::InvalidModel(format!(
            "model schema version {} != {}",
            version, TFLITE_SCHEMA_VERSION
        )));
    }
    Ok(version)
}

/// Smallest buffer that carries a TFLite header with the given version
///
/// Holds no subgraphs, so only backends that do not parse the graph
/// (test doubles) can build an interpreter from it.
pub fn header_only_model(version: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&16u32.to_le_bytes()); // root table at 16
    bytes.extend_from_slice(TFLITE_FILE_IDENTIFIER);
    bytes.extend_from_slice(&6u16.to_le_bytes()); // vtable_len
    bytes.extend_from_slice(&8u16.to_le_bytes()); // table_len
    bytes.extend_from_slice(&4u16.to_le_bytes()); // version at table + 4
    bytes.extend_from_slice(&0u16.to_le_bytes()); // padding
    bytes.extend_from_slice(&8i32.to_le_bytes()); // root - vtable
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes
}
