//! Field mapping engine.
//!
//! A mapping binds a literal placeholder name in a template body
//! (`{{client_name}}`) to a loop attribute plus a formatting type.
//! A submitted set is validated as a whole before anything is stored and
//! then replaces the previous set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Loop attributes a placeholder may pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopField {
    PropertyAddress,
    ClientName,
    ClientEmail,
    ClientPhone,
    Sale,
    Status,
    Type,
    StartDate,
    EndDate,
    Tags,
    Notes,
    CreatorName,
}

impl LoopField {
    pub const ALL: [LoopField; 12] = [
        LoopField::PropertyAddress,
        LoopField::ClientName,
        LoopField::ClientEmail,
        LoopField::ClientPhone,
        LoopField::Sale,
        LoopField::Status,
        LoopField::Type,
        LoopField::StartDate,
        LoopField::EndDate,
        LoopField::Tags,
        LoopField::Notes,
        LoopField::CreatorName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopField::PropertyAddress => "property_address",
            LoopField::ClientName => "client_name",
            LoopField::ClientEmail => "client_email",
            LoopField::ClientPhone => "client_phone",
            LoopField::Sale => "sale",
            LoopField::Status => "status",
            LoopField::Type => "type",
            LoopField::StartDate => "start_date",
            LoopField::EndDate => "end_date",
            LoopField::Tags => "tags",
            LoopField::Notes => "notes",
            LoopField::CreatorName => "creator_name",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

/// How a resolved value is rendered into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    Currency,
}

impl FieldType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(FieldType::Text),
            "number" => Some(FieldType::Number),
            "date" => Some(FieldType::Date),
            "currency" => Some(FieldType::Currency),
            _ => None,
        }
    }
}

/// A validated placeholder binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub name: String,
    pub loop_field: LoopField,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

impl FieldMapping {
    /// The literal token replaced in text bodies.
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.name)
    }
}

/// A mapping as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub loop_field: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
}

impl FieldMappingInput {
    pub fn new(name: &str, loop_field: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            loop_field: loop_field.to_string(),
            field_type: Some(field_type.to_string()),
        }
    }
}

/// Validates a whole submitted set. The first problem rejects the set.
///
/// A missing type defaults to `text`.
pub fn validate_mappings(
    inputs: &[FieldMappingInput],
) -> Result<Vec<FieldMapping>, ValidationError> {
    let mut seen = HashSet::new();
    let mut mappings = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidMapping {
                index,
                reason: "name must not be empty".to_string(),
            });
        }
        if name.contains(['{', '}']) {
            return Err(ValidationError::InvalidMapping {
                index,
                reason: format!("name '{}' must not contain braces", name),
            });
        }
        if !seen.insert(name.to_string()) {
            return Err(ValidationError::InvalidMapping {
                index,
                reason: format!("duplicate name '{}'", name),
            });
        }

        let loop_field =
            LoopField::parse(input.loop_field.trim()).ok_or_else(|| {
                ValidationError::InvalidMapping {
                    index,
                    reason: format!("unknown loop field '{}'", input.loop_field),
                }
            })?;

        let field_type = match input.field_type.as_deref().map(str::trim) {
            None | Some("") => FieldType::default(),
            Some(t) => FieldType::parse(t).ok_or_else(|| ValidationError::InvalidMapping {
                index,
                reason: format!("unknown field type '{}'", t),
            })?,
        };

        mappings.push(FieldMapping {
            name: name.to_string(),
            loop_field,
            field_type,
        });
    }

    Ok(mappings)
}
