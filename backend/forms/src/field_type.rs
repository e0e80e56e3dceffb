use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());

/// Input kinds a feedback form can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Checkbox,
    Radio,
    ShortText,
    LongText,
    BigText,
    ImageUpload,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::Checkbox,
        FieldType::Radio,
        FieldType::ShortText,
        FieldType::LongText,
        FieldType::BigText,
        FieldType::ImageUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::ShortText => "short_text",
            FieldType::LongText => "long_text",
            FieldType::BigText => "big_text",
            FieldType::ImageUpload => "image_upload",
        }
    }

    /// Whether the field is answered by picking from `options`.
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Checkbox | FieldType::Radio)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ValidationError;

    /// Canonical tokens only. Run [`normalize_field_type`] first for user input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::new(format!("Field type `{s}` is not supported")))
    }
}

/// Folds free-text type names into the canonical token shape:
/// `"Short Text"`, `"short-text"` and `" short  text "` all become `short_text`.
pub fn normalize_field_type(raw: &str) -> String {
    let lowered = raw.to_lowercase();

    SEPARATORS.replace_all(lowered.trim(), "_").into_owned()
}

/// Normalizes then parses, so the error names the normalized value.
pub fn parse_field_type(raw: &str) -> Result<FieldType, ValidationError> {
    normalize_field_type(raw).parse()
}
