//! Stored documents.
//!
//! Every document is kept as one JSON blob keyed by its `_id`. The same
//! serde shape is what clients see, except for [`User`], whose password hash
//! never leaves the server (see [`UserProfile`]).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::field_type::FieldType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Business,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Client-facing view of a [`User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
}

/// Business details collected at signup, before an owner id exists.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessProfile {
    pub businessname: String,
    pub location: String,
    pub pancard_number: u64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub owner: Uuid,
    pub businessname: String,
    pub location: String,
    pub pancard_number: u64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    pub fn new(owner: Uuid, profile: BusinessProfile) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            owner,
            businessname: profile.businessname,
            location: profile.location,
            pancard_number: profile.pancard_number,
            description: profile.description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Row shape of the public business directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessListItem {
    pub id: String,
    pub owner: String,
    pub businessname: String,
    pub location: String,
    pub pancard_number: u64,
    pub description: String,
}

impl From<&Business> for BusinessListItem {
    fn from(business: &Business) -> Self {
        Self {
            id: business.id.to_string(),
            owner: business.owner.to_string(),
            businessname: business.businessname.clone(),
            location: business.location.clone(),
            pancard_number: business.pancard_number,
            description: business.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackForm {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub business_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FormField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub field_name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub form_id: Uuid,
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
