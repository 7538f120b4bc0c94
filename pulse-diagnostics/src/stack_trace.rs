//! The stack-trace document a crash beacon carries: ordered header fields,
//! deduplicated binary images, and per-thread frames referencing images by
//! index. Serialized as compact JSON with abbreviated keys to keep beacons
//! small.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackHeader {
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "v")]
    pub value: String,
}

impl StackHeader {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Index into `StackTrace::binary_images`, -1 when the image is unknown.
    #[serde(rename = "i")]
    pub image_index: i32,
    #[serde(rename = "n")]
    pub binary_name: String,
    /// Raw payload address, hex-formatted.
    #[serde(rename = "a")]
    pub address: String,
    /// Raw payload offset into the binary text segment, decimal.
    #[serde(rename = "o")]
    pub text_segment_offset: String,
    /// Only set for cpu-exception samples with a count other than 1.
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u32>,
    #[serde(rename = "f", skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "o2", skip_serializing_if = "Option::is_none")]
    pub symbol_offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackThread {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "st")]
    pub frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackBinaryImage {
    #[serde(rename = "a1")]
    pub start_addr: String,
    #[serde(rename = "a2", skip_serializing_if = "Option::is_none")]
    pub end_addr: Option<String>,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Lowercase image uuid with dashes stripped.
    #[serde(rename = "id")]
    pub uuid: String,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub header: Vec<StackHeader>,
    pub threads: Vec<StackThread>,
    pub binary_images: Vec<StackBinaryImage>,
}

impl StackTrace {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
