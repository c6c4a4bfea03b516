//! Wire codec for worker headers
//!
//! A header is a single UTF-8 frame whose top-level fields are joined with `|`.
//! Lists are comma-joined and metadata is a `;`-joined list of `key:value`
//! pairs in insertion order. Headers that announce a payload (`array`) are
//! followed by exactly one binary frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use crate::error::IpcError;

/// Separator between top-level header fields
pub const FIELD_DELIMITER: char = '|';

/// Separator between list items
pub const LIST_DELIMITER: char = ',';

/// Separator between metadata entries
pub const ENTRY_DELIMITER: char = ';';

/// Separator between a metadata key and its value
pub const KEY_VALUE_DELIMITER: char = ':';

/// Header sent to ask the worker to exit
pub const QUIT_HEADER: &str = "quit|0";

/// String metadata attached to requests and arrays, iterated in insertion order
pub type Metadata = IndexMap<String, String>;

/// Messages the host sends to the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Invoke `operation` on previously submitted inputs
    Task {
        operation: String,
        inputs: Vec<String>,
        metadata: Metadata,
    },

    /// Announce an array; the raw payload follows as a second frame
    Array(ArrayHeader),

    /// Shutdown signal, no reply expected
    Quit,
}

impl Request {
    /// Create a task request
    pub fn task<S: AsRef<str>>(operation: impl Into<String>, inputs: &[S], metadata: Metadata) -> Self {
        Request::Task {
            operation: operation.into(),
            inputs: inputs.iter().map(|s| s.as_ref().to_string()).collect(),
            metadata,
        }
    }

    /// First header field for this request
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Task { .. } => "task",
            Request::Array(_) => "array",
            Request::Quit => "quit",
        }
    }

    /// Whether a binary frame follows the header
    pub fn has_payload(&self) -> bool {
        matches!(self, Request::Array(_))
    }

    /// Encode into the header sent on the outbound channel
    pub fn encode(&self) -> Result<String, IpcError> {
        match self {
            Request::Task {
                operation,
                inputs,
                metadata,
            } => {
                check_field("operation", operation)?;
                Ok(join_fields(&[
                    "task",
                    operation,
                    &encode_strings("inputs", inputs)?,
                    &encode_metadata(metadata)?,
                ]))
            }
            Request::Array(header) => header.encode(),
            Request::Quit => Ok(QUIT_HEADER.to_string()),
        }
    }
}

/// Descriptor of an array exchanged in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayHeader {
    pub id: String,
    pub origin: Vec<i64>,
    pub shape: Vec<i64>,
    pub metadata: Metadata,
}

impl ArrayHeader {
    pub fn new(id: impl Into<String>, origin: Vec<i64>, shape: Vec<i64>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            origin,
            shape,
            metadata,
        }
    }

    /// Encode as `array|<id>|<origin>|<shape>|<metadata>`
    pub fn encode(&self) -> Result<String, IpcError> {
        check_field("id", &self.id)?;
        Ok(join_fields(&[
            "array",
            &self.id,
            &encode_ints(&self.origin),
            &encode_ints(&self.shape),
            &encode_metadata(&self.metadata)?,
        ]))
    }

    /// Parse an `array` header received from the worker
    pub fn parse(raw: &str) -> Result<Self, IpcError> {
        let parts: Vec<&str> = raw.trim().splitn(5, FIELD_DELIMITER).collect();
        if parts.len() != 5 || parts[0] != "array" {
            return Err(IpcError::InvalidHeader(format!(
                "expected array|id|origin|shape|metadata, got {:?}",
                raw
            )));
        }

        Ok(Self {
            id: parts[1].to_string(),
            origin: decode_ints(parts[2])?,
            shape: decode_ints(parts[3])?,
            metadata: decode_metadata(parts[4])?,
        })
    }

    /// Number of elements described by the shape
    pub fn element_count(&self) -> Result<i64, IpcError> {
        element_count(&self.shape)
    }
}

/// Classification of a header read from the inbound channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundHeader {
    /// Result data; the payload follows as a second frame
    Array,
    /// Worker-side failure with its message
    Error(String),
    /// Anything else, carrying the unrecognised first field
    Unknown(String),
}

impl InboundHeader {
    /// Dispatch on the first `|`-separated field
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(2, FIELD_DELIMITER);
        let kind = parts.next().unwrap_or_default();
        match kind {
            "array" => InboundHeader::Array,
            "error" => InboundHeader::Error(parts.next().unwrap_or_default().to_string()),
            other => InboundHeader::Unknown(other.to_string()),
        }
    }
}

fn join_fields(fields: &[&str]) -> String {
    fields.join(&FIELD_DELIMITER.to_string())
}

fn check_field(field: &'static str, value: &str) -> Result<(), IpcError> {
    if value.contains(FIELD_DELIMITER) {
        return Err(IpcError::ReservedDelimiter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Product of a shape's dimensions
///
/// Shapes can come from the worker, so negative dimensions and products that
/// overflow `i64` are reported as `InvalidHeader`.
pub fn element_count(shape: &[i64]) -> Result<i64, IpcError> {
    shape.iter().try_fold(1i64, |count, &dim| {
        if dim < 0 {
            return Err(IpcError::InvalidHeader(format!(
                "negative dimension {} in shape {:?}",
                dim, shape
            )));
        }
        count.checked_mul(dim).ok_or_else(|| {
            IpcError::InvalidHeader(format!("shape {:?} overflows the element count", shape))
        })
    })
}

/// Comma-join integers: `[0, 5]` becomes `"0,5"`
pub fn encode_ints(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&LIST_DELIMITER.to_string())
}

/// Parse a comma-joined integer list; the empty string is the empty list
pub fn decode_ints(field: &str) -> Result<Vec<i64>, IpcError> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field
        .split(LIST_DELIMITER)
        .map(|item| {
            item.trim()
                .parse::<i64>()
                .map_err(|e| IpcError::InvalidHeader(format!("bad integer {:?}: {}", item, e)))
        })
        .collect()
}

/// Comma-join strings, rejecting items that would split or break the header
pub fn encode_strings<S: AsRef<str>>(field: &'static str, values: &[S]) -> Result<String, IpcError> {
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        let value = value.as_ref();
        if value.contains(LIST_DELIMITER) || value.contains(FIELD_DELIMITER) {
            return Err(IpcError::ReservedDelimiter {
                field,
                value: value.to_string(),
            });
        }
        items.push(value);
    }
    Ok(items.join(&LIST_DELIMITER.to_string()))
}

/// Split a comma-joined string list; the empty string is the empty list
pub fn decode_strings(field: &str) -> Vec<String> {
    if field.is_empty() {
        return Vec::new();
    }
    field.split(LIST_DELIMITER).map(str::to_string).collect()
}

/// Encode metadata as `k1:v1;k2:v2`
pub fn encode_metadata(metadata: &Metadata) -> Result<String, IpcError> {
    let reserved = [KEY_VALUE_DELIMITER, ENTRY_DELIMITER, FIELD_DELIMITER];
    let mut entries = Vec::with_capacity(metadata.len());
    for (key, value) in metadata {
        if key.contains(&reserved[..]) {
            return Err(IpcError::ReservedDelimiter {
                field: "metadata key",
                value: key.clone(),
            });
        }
        if value.contains(&reserved[..]) {
            return Err(IpcError::ReservedDelimiter {
                field: "metadata value",
                value: value.clone(),
            });
        }
        entries.push(format!("{}{}{}", key, KEY_VALUE_DELIMITER, value));
    }
    Ok(entries.join(&ENTRY_DELIMITER.to_string()))
}

/// Decode `k1:v1;k2:v2` preserving entry order
pub fn decode_metadata(field: &str) -> Result<Metadata, IpcError> {
    let mut metadata = Metadata::new();
    for entry in field.split(ENTRY_DELIMITER).filter(|e| !e.is_empty()) {
        let (key, value) = entry.split_once(KEY_VALUE_DELIMITER).ok_or_else(|| {
            IpcError::InvalidHeader(format!("metadata entry without ':': {:?}", entry))
        })?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

/// Serialize floats in the worker's array byte order (big-endian f32)
pub fn encode_f32_be(values: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 4);
    for value in values {
        buf.put_f32(*value);
    }
    buf.freeze()
}

/// Decode a big-endian f32 payload
pub fn decode_f32_be(mut payload: &[u8]) -> Result<Vec<f32>, IpcError> {
    if payload.len() % 4 != 0 {
        return Err(IpcError::InvalidHeader(format!(
            "payload of {} bytes is not a whole number of f32 values",
            payload.len()
        )));
    }
    let mut values = Vec::with_capacity(payload.len() / 4);
    while payload.has_remaining() {
        values.push(payload.get_f32());
    }
    Ok(values)
}
