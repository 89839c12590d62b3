use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{InsightsError, Result};

pub const PDF_MIME_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF";

/// A statement that passed boundary validation: named, non-empty, and a PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl StatementFile {
    /// Accepts a file if its declared content type, its extension, or its
    /// leading bytes identify it as a PDF.
    pub fn from_upload(
        file_name: impl Into<String>,
        declared_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let file_name = file_name.into();

        if file_name.trim().is_empty() {
            return Err(InsightsError::InvalidUpload(
                "Uploaded file has no name".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(InsightsError::InvalidUpload(format!(
                "'{}' is empty",
                file_name
            )));
        }

        let declared_pdf = declared_type
            .map(|t| t.split(';').next().unwrap_or(t).trim().eq_ignore_ascii_case(PDF_MIME_TYPE))
            .unwrap_or(false);
        let guessed_pdf = mime_guess::from_path(&file_name)
            .first()
            .is_some_and(|m| m.essence_str() == PDF_MIME_TYPE);
        let magic_pdf = bytes.starts_with(PDF_MAGIC);

        if !(declared_pdf || guessed_pdf || magic_pdf) {
            return Err(InsightsError::InvalidUpload(format!(
                "'{}' is not a PDF (content type: {})",
                file_name,
                declared_type.unwrap_or("unknown")
            )));
        }

        Ok(Self {
            file_name,
            mime_type: PDF_MIME_TYPE.to_string(),
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A file living in the Gemini Files API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub uri: String,
    pub name: String,
    pub display_name: String,
    pub mime_type: String,
    pub state: String,
}

impl RemoteDocument {
    pub fn is_active(&self) -> bool {
        self.state == "ACTIVE"
    }
}

/// How a statement reaches the model.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementSource {
    Inline {
        display_name: String,
        mime_type: String,
        data: String,
    },
    Uploaded(RemoteDocument),
}

impl StatementSource {
    pub fn inline(file: &StatementFile) -> Self {
        Self::Inline {
            display_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            data: BASE64.encode(&file.bytes),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Inline { display_name, .. } => display_name,
            Self::Uploaded(doc) => &doc.display_name,
        }
    }

    pub fn remote(&self) -> Option<&RemoteDocument> {
        match self {
            Self::Uploaded(doc) => Some(doc),
            Self::Inline { .. } => None,
        }
    }

    fn to_part(&self) -> Part {
        match self {
            Self::Inline {
                mime_type, data, ..
            } => Part::InlineData {
                inline_data: Blob {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
            Self::Uploaded(doc) => Part::FileData {
                file_data: FileData {
                    mime_type: doc.mime_type.clone(),
                    file_uri: doc.uri.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// A user turn carrying the instructions followed by every statement, in order.
    pub fn user_with_statements(text: impl Into<String>, sources: &[StatementSource]) -> Self {
        let mut parts = vec![Part::Text { text: text.into() }];
        parts.extend(sources.iter().map(StatementSource::to_part));
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// File resource as returned by the Files API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileResource {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}
