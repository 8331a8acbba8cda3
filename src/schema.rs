//! Stage input/output contracts.
//!
//! Every type here mirrors the JSON object exchanged with the model at one
//! pipeline stage, so field names are camelCase on the wire. Output types
//! hold `Option`s where the model may leave a field out; the orchestrator,
//! not serde, decides whether an absent field is a stage failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Input of the text extraction stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionInput {
    /// `data:<mimetype>;base64,<payload>`
    pub document_data_uri: String,
}

/// Output of the text extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    #[serde(default)]
    pub extracted_text: Option<String>,
}

/// Input of the text normalization stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationInput {
    pub extracted_text: String,
}

/// Output of the text normalization stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationOutput {
    #[serde(default)]
    pub preprocessed_text: Option<String>,
}

/// A labeled span found in the document text.
///
/// Labels are free text chosen by the model ("Patta Holder Name",
/// "Village", "GPS Coordinates", …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub value: String,
}

impl Entity {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Output of the entity recognition stage.
///
/// `entities: None` means the model left the field out, which fails the
/// stage. `Some(vec![])` is a valid "nothing found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOutput {
    #[serde(default)]
    pub entities: Option<Vec<Entity>>,
}

/// Partially resolved record handed to the structuring stage.
///
/// Fields with no matching entity are structurally absent: they are
/// omitted from the JSON, never written as `null` or `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResolutionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patta_holder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_information: Option<String>,
}

impl FieldResolutionInput {
    /// True when no entity matched any field.
    pub fn is_empty(&self) -> bool {
        self.patta_holder_name.is_none()
            && self.village_name.is_none()
            && self.coordinates.is_none()
            && self.claim_status.is_none()
            && self.other_information.is_none()
    }
}

/// The terminal record: what the reviewer edits and what gets exported.
///
/// All five keys are always serialized; `None` becomes `null`. When
/// deserializing model output a missing key is read as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRecord {
    #[serde(default)]
    pub patta_holder_name: Option<String>,
    #[serde(default)]
    pub village_name: Option<String>,
    #[serde(default)]
    pub coordinates: Option<String>,
    #[serde(default)]
    pub claim_status: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

impl StructuredRecord {
    /// Read a single field.
    pub fn get(&self, field: RecordField) -> Option<&str> {
        match field {
            RecordField::PattaHolderName => self.patta_holder_name.as_deref(),
            RecordField::VillageName => self.village_name.as_deref(),
            RecordField::Coordinates => self.coordinates.as_deref(),
            RecordField::ClaimStatus => self.claim_status.as_deref(),
            RecordField::AdditionalNotes => self.additional_notes.as_deref(),
        }
    }

    /// Overwrite a single field, as a reviewer would before export.
    ///
    /// Blank values clear the field to `null`.
    pub fn set(&mut self, field: RecordField, value: Option<String>) {
        let value = value.filter(|v| !v.trim().is_empty());
        let slot = match field {
            RecordField::PattaHolderName => &mut self.patta_holder_name,
            RecordField::VillageName => &mut self.village_name,
            RecordField::Coordinates => &mut self.coordinates,
            RecordField::ClaimStatus => &mut self.claim_status,
            RecordField::AdditionalNotes => &mut self.additional_notes,
        };
        *slot = value;
    }

    /// Number of fields carrying a value.
    pub fn filled_count(&self) -> usize {
        RecordField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }
}

/// The five keys of a [`StructuredRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    PattaHolderName,
    VillageName,
    Coordinates,
    ClaimStatus,
    AdditionalNotes,
}

impl RecordField {
    pub const ALL: [RecordField; 5] = [
        RecordField::PattaHolderName,
        RecordField::VillageName,
        RecordField::Coordinates,
        RecordField::ClaimStatus,
        RecordField::AdditionalNotes,
    ];

    /// The JSON key of this field.
    pub fn key(&self) -> &'static str {
        match self {
            RecordField::PattaHolderName => "pattaHolderName",
            RecordField::VillageName => "villageName",
            RecordField::Coordinates => "coordinates",
            RecordField::ClaimStatus => "claimStatus",
            RecordField::AdditionalNotes => "additionalNotes",
        }
    }

    /// Human label used by the CLI review summary.
    pub fn title(&self) -> &'static str {
        match self {
            RecordField::PattaHolderName => "Patta Holder Name",
            RecordField::VillageName => "Village Name",
            RecordField::Coordinates => "Coordinates",
            RecordField::ClaimStatus => "Claim Status",
            RecordField::AdditionalNotes => "Additional Notes",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RecordField {
    type Err = String;

    /// Accepts the JSON key in any case, with or without `_`/`-` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        RecordField::ALL
            .iter()
            .copied()
            .find(|f| f.key().to_lowercase() == folded)
            .ok_or_else(|| {
                format!(
                    "unknown field '{s}' (expected one of: {})",
                    RecordField::ALL.map(|f| f.key()).join(", ")
                )
            })
    }
}
