//! OCR response model: what the cache stores and what the build stage reads.
//!
//! The shape mirrors Textract's `DetectDocumentText` JSON (PascalCase keys),
//! so a cache directory written by any Textract client (the AWS CLI, boto3's
//! `json.dump` of a response) is readable here and vice versa. Keys this model
//! does not know about are kept in `extra` and written back unchanged: the
//! cache preserves the full response, and only [`OcrResponse::lines`] decides
//! what the outputs consume.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Full structured response for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_metadata: Option<DocumentMetadata>,

    #[serde(default)]
    pub blocks: Vec<Block>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_document_text_model_version: Option<String>,

    /// Any other top-level keys (e.g. `ResponseMetadata` from boto3).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrResponse {
    /// Build a response from blocks only.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            document_metadata: Some(DocumentMetadata { pages: Some(1) }),
            blocks,
            ..Default::default()
        }
    }

    /// Text of every LINE block, in the order the provider returned them.
    ///
    /// Blocks of any other type are ignored regardless of their content, and
    /// a LINE block without text yields an empty line rather than being
    /// dropped, so line counts always match the provider's.
    pub fn lines(&self) -> Vec<RecognizedLine> {
        self.blocks
            .iter()
            .filter(|b| b.block_type.is_line())
            .map(|b| RecognizedLine {
                text: b.text.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Number of LINE blocks.
    pub fn line_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.block_type.is_line()).count()
    }
}

/// One recognised line of text, in provider reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<i32>,
}

/// One typed item of an OCR response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: BlockType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Block {
    /// A bare block with a type and text, as used by tests and mocks.
    pub fn new(block_type: BlockType, text: impl Into<String>) -> Self {
        Self {
            block_type,
            id: None,
            text: Some(text.into()),
            confidence: None,
            text_type: None,
            geometry: None,
            relationships: Vec::new(),
            page: None,
            extra: Map::new(),
        }
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self::new(BlockType::Line, text)
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::new(BlockType::Word, text)
    }
}

/// Block-type discriminator. Unknown types round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Page,
    Line,
    Word,
    Other(String),
}

impl BlockType {
    pub fn is_line(&self) -> bool {
        matches!(self, BlockType::Line)
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Page => "PAGE",
            BlockType::Line => "LINE",
            BlockType::Word => "WORD",
            BlockType::Other(s) => s,
        }
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PAGE" => BlockType::Page,
            "LINE" => BlockType::Line,
            "WORD" => BlockType::Word,
            _ => BlockType::Other(s),
        }
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        BlockType::from(s.to_string())
    }
}

impl From<BlockType> for String {
    fn from(t: BlockType) -> Self {
        match t {
            BlockType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised (0–1) position of a block on the page image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<Point>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub ids: Vec<String>,
}
