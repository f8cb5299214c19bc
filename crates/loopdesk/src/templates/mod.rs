//! Document templates: uploaded source documents plus their field mappings.

pub mod mapping;
pub mod service;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use mapping::{FieldMapping, FieldMappingInput, FieldType, LoopField};
pub use service::TemplateService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    Contract,
    Listing,
    Disclosure,
    Addendum,
    Notice,
    Other,
}

impl TemplateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateCategory::Contract => "contract",
            TemplateCategory::Listing => "listing",
            TemplateCategory::Disclosure => "disclosure",
            TemplateCategory::Addendum => "addendum",
            TemplateCategory::Notice => "notice",
            TemplateCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contract" => Some(TemplateCategory::Contract),
            "listing" => Some(TemplateCategory::Listing),
            "disclosure" => Some(TemplateCategory::Disclosure),
            "addendum" => Some(TemplateCategory::Addendum),
            "notice" => Some(TemplateCategory::Notice),
            "other" => Some(TemplateCategory::Other),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage format of a template, which decides how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFileType {
    Pdf,
    Doc,
    Docx,
    Txt,
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

impl TemplateFileType {
    /// Maps an accepted upload mimetype to a file type.
    pub fn from_mime(mimetype: &str) -> Option<Self> {
        let base = mimetype.split(';').next().unwrap_or("").trim();
        match base {
            MIME_PDF => Some(TemplateFileType::Pdf),
            MIME_DOC => Some(TemplateFileType::Doc),
            MIME_DOCX => Some(TemplateFileType::Docx),
            MIME_TEXT => Some(TemplateFileType::Txt),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(TemplateFileType::Pdf),
            "doc" => Some(TemplateFileType::Doc),
            "docx" => Some(TemplateFileType::Docx),
            "txt" => Some(TemplateFileType::Txt),
            _ => None,
        }
    }

    /// Extension used for stored and generated files.
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateFileType::Pdf => "pdf",
            TemplateFileType::Doc => "doc",
            TemplateFileType::Docx => "docx",
            TemplateFileType::Txt => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TemplateFileType::Pdf => MIME_PDF,
            TemplateFileType::Doc => MIME_DOC,
            TemplateFileType::Docx => MIME_DOCX,
            TemplateFileType::Txt => MIME_TEXT,
        }
    }
}

impl fmt::Display for TemplateFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category: TemplateCategory,
    /// Blob name in the template store.
    #[serde(skip_serializing)]
    pub stored_file: String,
    pub file_name: String,
    pub file_type: TemplateFileType,
    pub file_size: u64,
    pub fields_mapped: bool,
    pub field_mappings: Vec<FieldMapping>,
    pub created_by: Option<i64>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A template file received from a client.
#[derive(Debug, Clone)]
pub struct TemplateUpload {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub file_name: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

/// Editable template metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateStats {
    pub total: u64,
    pub mapped: u64,
    pub contracts: u64,
    pub listings: u64,
}

/// Raw bytes of a stored template for preview/streaming.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_mime() {
        assert_eq!(
            TemplateFileType::from_mime("application/pdf"),
            Some(TemplateFileType::Pdf)
        );
        assert_eq!(
            TemplateFileType::from_mime("application/msword"),
            Some(TemplateFileType::Doc)
        );
        assert_eq!(
            TemplateFileType::from_mime(MIME_DOCX),
            Some(TemplateFileType::Docx)
        );
        assert_eq!(
            TemplateFileType::from_mime("text/plain; charset=utf-8"),
            Some(TemplateFileType::Txt)
        );
        assert_eq!(TemplateFileType::from_mime("image/png"), None);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(
            TemplateCategory::parse("Contract"),
            Some(TemplateCategory::Contract)
        );
        assert_eq!(TemplateCategory::parse("misc"), None);
        assert_eq!(
            serde_json::to_string(&TemplateCategory::Disclosure).unwrap(),
            "\"disclosure\""
        );
    }

    #[test]
    fn test_file_type_round_trips_through_extension() {
        for ft in [
            TemplateFileType::Pdf,
            TemplateFileType::Doc,
            TemplateFileType::Docx,
            TemplateFileType::Txt,
        ] {
            assert_eq!(TemplateFileType::parse(ft.extension()), Some(ft));
        }
    }
}
