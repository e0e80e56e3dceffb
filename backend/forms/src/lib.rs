//! # Forms
//!
//! Documents shared by the server and the tester: users, business profiles,
//! feedback forms and their responses, plus the validation that turns client
//! drafts into storable documents.
//!
//! ## Field types
//!
//! Businesses type field kinds by hand on older clients, so the server accepts
//! loose spellings and stores canonical tokens:
//!
//! | input | stored |
//! |---|---|
//! | `checkbox` | `checkbox` |
//! | `radio` | `radio` |
//! | `short text`, `Short-Text` | `short_text` |
//! | `long text`, `long-text` | `long_text` |
//! | `big text` | `big_text` |
//! | `image upload` | `image_upload` |
use thiserror::Error;

pub mod field_type;
pub mod models;
pub mod validation;

pub use field_type::{FieldType, normalize_field_type, parse_field_type};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .0.join(", "))]
pub struct ValidationError(Vec<String>);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }

    pub fn from_messages(messages: Vec<String>) -> Self {
        Self(messages)
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}
