//! # Input Validation
//!
//! Client payloads arrive as drafts with every property optional, so a missing
//! key surfaces as a readable message instead of a serde error.
//!
//! Feedback forms collect every problem and report them together, joined by
//! `", "`. Registration and login stop at the first problem, in a fixed order,
//! since the signup page shows one message at a time.
use std::{collections::HashSet, sync::LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    ValidationError,
    field_type::parse_field_type,
    models::{Answer, BusinessProfile, FeedbackForm, FormField, FormResponse, Role},
};

pub const TITLE_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 1000;
pub const PLACEHOLDER_MAX: usize = 300;
pub const PASSWORD_MIN: usize = 6;

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());

const FIELD_NAME_RULE: &str =
    "Field name must start with a letter and contain only letters, numbers, and underscores";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDraft {
    pub name: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub required: Option<bool>,
    pub placeholder: Option<String>,
    pub options: Option<Vec<String>>,
}

/// Body of form create and update requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Vec<FieldDraft>>,
}

#[derive(Default)]
struct Messages(Vec<String>);

impl Messages {
    fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::from_messages(self.0))
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn check_title(raw: Option<&str>, messages: &mut Messages) -> String {
    let Some(title) = trimmed(raw) else {
        messages.push("Form title is required");
        return String::new();
    };

    if title.chars().count() > TITLE_MAX {
        messages.push(format!("Form title must be at most {TITLE_MAX} characters"));
    }

    title
}

fn check_description(raw: Option<&str>, messages: &mut Messages) -> Option<String> {
    let description = trimmed(raw)?;

    if description.chars().count() > DESCRIPTION_MAX {
        messages.push(format!(
            "Form description must be at most {DESCRIPTION_MAX} characters"
        ));
    }

    Some(description)
}

fn check_options(raw: Option<&[String]>, messages: &mut Messages) -> Option<Vec<String>> {
    let raw = raw?;
    let options: Vec<String> = raw.iter().map(|o| o.trim().to_string()).collect();

    if options.iter().any(String::is_empty) {
        messages.push("Field options must not be empty");
    }

    let distinct: HashSet<&String> = options.iter().collect();
    if distinct.len() != options.len() {
        messages.push("Field options must be unique");
    }

    (!options.is_empty()).then_some(options)
}

fn check_field(draft: &FieldDraft, messages: &mut Messages) -> Option<FormField> {
    let before = messages.0.len();

    let name = trimmed(draft.name.as_deref());
    match &name {
        None => messages.push("Field name is required"),
        Some(name) if !FIELD_NAME.is_match(name) => messages.push(FIELD_NAME_RULE),
        Some(_) => {}
    }

    let label = trimmed(draft.label.as_deref());
    if label.is_none() {
        messages.push("Field label is required");
    }

    let kind = match draft.kind.as_deref() {
        None => {
            messages.push("Field type is required");
            None
        }
        Some(raw) => parse_field_type(raw)
            .map_err(|e| messages.0.extend(e.into_messages()))
            .ok(),
    };

    let placeholder = trimmed(draft.placeholder.as_deref());
    if placeholder
        .as_ref()
        .is_some_and(|p| p.chars().count() > PLACEHOLDER_MAX)
    {
        messages.push(format!(
            "Field placeholder must be at most {PLACEHOLDER_MAX} characters"
        ));
    }

    let options = check_options(draft.options.as_deref(), messages);

    if messages.0.len() != before {
        return None;
    }

    Some(FormField {
        name: name?,
        label: label?,
        kind: kind?,
        required: draft.required.unwrap_or(false),
        placeholder,
        options,
    })
}

fn check_fields(raw: Option<&[FieldDraft]>, messages: &mut Messages) -> Vec<FormField> {
    let raw = raw.unwrap_or_default();

    if raw.is_empty() {
        messages.push("Form must include at least one field");
        return Vec::new();
    }

    let fields: Vec<FormField> = raw
        .iter()
        .filter_map(|draft| check_field(draft, messages))
        .collect();

    let mut seen = HashSet::new();
    let duplicated = raw
        .iter()
        .filter_map(|draft| trimmed(draft.name.as_deref()))
        .any(|name| !seen.insert(name.to_lowercase()));
    if duplicated {
        messages.push("Field names must be unique within the form");
    }

    fields
}

impl FormDraft {
    /// True when none of `title`, `description`, `fields` were sent.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.fields.is_none()
    }

    /// An update has to carry at least one of the form keys.
    pub fn ensure_not_empty(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new(
                "At least one field is required to update",
            ));
        }

        Ok(())
    }

    /// Builds a new form owned by `business_id`.
    pub fn into_form(self, business_id: Uuid) -> Result<FeedbackForm, ValidationError> {
        let mut messages = Messages::default();

        let title = check_title(self.title.as_deref(), &mut messages);
        let description = check_description(self.description.as_deref(), &mut messages);
        let fields = check_fields(self.fields.as_deref(), &mut messages);

        let now = Utc::now();
        messages.finish(FeedbackForm {
            id: Uuid::new_v4(),
            business_id,
            title,
            description,
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies the keys that were sent on top of `form`. The stored parts were
    /// validated on write, so only the incoming ones are checked.
    pub fn apply_to(self, form: &FeedbackForm) -> Result<FeedbackForm, ValidationError> {
        self.ensure_not_empty()?;

        let mut messages = Messages::default();
        let mut updated = form.clone();

        if let Some(title) = self.title.as_deref() {
            updated.title = check_title(Some(title), &mut messages);
        }
        if let Some(description) = self.description.as_deref() {
            updated.description = check_description(Some(description), &mut messages);
        }
        if let Some(fields) = self.fields.as_deref() {
            updated.fields = check_fields(Some(fields), &mut messages);
        }

        updated.updated_at = Utc::now();
        messages.finish(updated)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDraft {
    pub field_name: Option<String>,
    pub value: Option<Value>,
}

/// Body of a public form submission.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDraft {
    pub form_id: Option<String>,
    pub answers: Option<Vec<AnswerDraft>>,
}

impl ResponseDraft {
    /// `form_id` must already be resolved to an existing form.
    pub fn into_response(self, form_id: Uuid) -> Result<FormResponse, ValidationError> {
        let drafts = self.answers.unwrap_or_default();
        if drafts.is_empty() {
            return Err(ValidationError::new("At least one answer is required"));
        }

        let mut messages = Messages::default();
        let mut answers = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let name = trimmed(draft.field_name.as_deref());
            match &name {
                None => messages.push("Field name is required"),
                Some(name) if !FIELD_NAME.is_match(name) => messages.push(FIELD_NAME_RULE),
                Some(_) => {}
            }

            if draft.value.is_none() {
                messages.push("Answer must be written");
            }

            if let (Some(field_name), Some(value)) = (name, draft.value) {
                answers.push(Answer { field_name, value });
            }
        }

        let now = Utc::now();
        messages.finish(FormResponse {
            id: Uuid::new_v4(),
            form_id,
            answers,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Body of a signup request. The business keys only matter for business
/// accounts.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub businessname: Option<String>,
    pub location: Option<String>,
    /// Kept raw so a negative or non-numeric value reads as missing.
    pub pancard_number: Option<Value>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub business: Option<BusinessProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginDraft {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_credentials(
    email: Option<String>,
    password: Option<String>,
    min_password: usize,
) -> Result<Credentials, ValidationError> {
    let email = email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ValidationError::new("Email is required"))?;
    let password = password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ValidationError::new("Password is required"))?;

    if password.chars().count() < min_password {
        return Err(ValidationError::new(format!(
            "Password must be at least {min_password} characters"
        )));
    }
    if !EMAIL.is_match(&email) {
        return Err(ValidationError::new("Invalid email format"));
    }

    Ok(Credentials {
        email: normalize_email(&email),
        password,
    })
}

fn parse_role(raw: Option<&str>) -> Result<Role, ValidationError> {
    match raw.map(|r| r.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("user") => Ok(Role::User),
        Some("business") => Ok(Role::Business),
        Some(other) => Err(ValidationError::new(format!("Role `{other}` is not supported"))),
    }
}

impl RegisterDraft {
    pub fn into_registration(self) -> Result<Registration, ValidationError> {
        let Credentials { email, password } =
            check_credentials(self.email, self.password, PASSWORD_MIN)?;
        let role = parse_role(self.role.as_deref())?;

        let business = match role {
            Role::User => None,
            Role::Business => {
                let mut missing = Vec::new();
                let businessname = trimmed(self.businessname.as_deref());
                let location = trimmed(self.location.as_deref());
                let description = trimmed(self.description.as_deref());
                let pancard_number = self.pancard_number.as_ref().and_then(Value::as_u64);

                if businessname.is_none() {
                    missing.push("businessname");
                }
                if location.is_none() {
                    missing.push("location");
                }
                if pancard_number.is_none() {
                    missing.push("pancardNumber");
                }
                if description.is_none() {
                    missing.push("description");
                }

                match (businessname, location, pancard_number, description) {
                    (Some(businessname), Some(location), Some(pancard_number), Some(description)) => {
                        Some(BusinessProfile {
                            businessname,
                            location,
                            pancard_number,
                            description,
                        })
                    }
                    _ => {
                        return Err(ValidationError::new(format!(
                            "Business profile requires {}",
                            missing.join(", ")
                        )));
                    }
                }
            }
        };

        Ok(Registration {
            name: trimmed(self.name.as_deref()),
            email,
            password,
            role,
            business,
        })
    }
}

impl LoginDraft {
    /// Length is not checked here; a short password simply fails to match.
    pub fn into_credentials(self) -> Result<Credentials, ValidationError> {
        check_credentials(self.email, self.password, 0)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::field_type::FieldType;

    fn draft(value: Value) -> FormDraft {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_form_normalizes_types() {
        let form = draft(json!({
            "title": "  Customer feedback ",
            "description": "Collect customer feedback",
            "fields": [
                { "name": "wouldRecommend", "label": "Would you recommend us?", "type": "checkbox" },
                { "name": "serviceChannel", "label": "Service Channel", "type": "radio", "options": ["Web", " Phone "] },
                { "name": "headline", "label": "Headline", "type": "short text" },
                { "name": "details", "label": "Details", "type": "long-text" },
                { "name": "story", "label": "Story", "type": "big text" },
                { "name": "screenshot", "label": "Upload screenshot", "type": "image upload", "required": true },
            ],
        }))
        .into_form(Uuid::new_v4())
        .unwrap();

        assert_eq!(form.title, "Customer feedback");
        let kinds: Vec<FieldType> = form.fields.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FieldType::Checkbox,
                FieldType::Radio,
                FieldType::ShortText,
                FieldType::LongText,
                FieldType::BigText,
                FieldType::ImageUpload,
            ]
        );
        assert_eq!(
            form.fields[1].options,
            Some(vec!["Web".to_string(), "Phone".to_string()])
        );
        assert!(form.fields[5].required);
        assert!(!form.fields[0].required);
    }

    #[test]
    fn test_form_unsupported_type() {
        let err = draft(json!({
            "title": "Customer feedback",
            "fields": [{ "name": "rating", "label": "Rating", "type": "stars" }],
        }))
        .into_form(Uuid::new_v4())
        .unwrap_err();

        assert_eq!(err.to_string(), "Field type `stars` is not supported");
    }

    #[test]
    fn test_form_collects_messages() {
        let err = draft(json!({
            "fields": [
                { "name": "1st", "label": "First" },
                { "name": "Comment", "label": "", "type": "short_text" },
                { "name": "comment", "label": "Again", "type": "short_text" },
            ],
        }))
        .into_form(Uuid::new_v4())
        .unwrap_err();

        assert_eq!(
            err.messages(),
            [
                "Form title is required",
                FIELD_NAME_RULE,
                "Field type is required",
                "Field label is required",
                "Field names must be unique within the form",
            ]
        );
    }

    #[test]
    fn test_form_requires_fields() {
        let err = draft(json!({ "title": "Empty", "fields": [] }))
            .into_form(Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.to_string(), "Form must include at least one field");

        let err = draft(json!({ "title": "Missing" }))
            .into_form(Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.to_string(), "Form must include at least one field");
    }

    #[test]
    fn test_form_lengths() {
        let err = draft(json!({
            "title": "t".repeat(TITLE_MAX + 1),
            "description": "d".repeat(DESCRIPTION_MAX + 1),
            "fields": [{
                "name": "comment",
                "label": "Comment",
                "type": "short_text",
                "placeholder": "p".repeat(PLACEHOLDER_MAX + 1),
            }],
        }))
        .into_form(Uuid::new_v4())
        .unwrap_err();

        assert_eq!(err.messages().len(), 3);

        let form = draft(json!({
            "title": "t".repeat(TITLE_MAX),
            "description": "   ",
            "fields": [{ "name": "comment", "label": "Comment", "type": "short_text" }],
        }))
        .into_form(Uuid::new_v4())
        .unwrap();
        assert_eq!(form.description, None);
    }

    #[test]
    fn test_duplicate_options() {
        let err = draft(json!({
            "title": "Options",
            "fields": [{ "name": "pick", "label": "Pick", "type": "radio", "options": ["a", "a "] }],
        }))
        .into_form(Uuid::new_v4())
        .unwrap_err();

        assert_eq!(err.to_string(), "Field options must be unique");
    }

    #[test]
    fn test_patch() {
        let form = draft(json!({
            "title": "Old form name",
            "fields": [{ "name": "comment", "label": "Comment", "type": "short_text" }],
        }))
        .into_form(Uuid::new_v4())
        .unwrap();

        let updated = draft(json!({
            "title": "Updated form name",
            "fields": [{ "name": "comment", "label": "Comment", "type": "long text" }],
        }))
        .apply_to(&form)
        .unwrap();

        assert_eq!(updated.id, form.id);
        assert_eq!(updated.created_at, form.created_at);
        assert_eq!(updated.title, "Updated form name");
        assert_eq!(updated.fields[0].kind, FieldType::LongText);

        let err = FormDraft::default().apply_to(&form).unwrap_err();
        assert_eq!(err.to_string(), "At least one field is required to update");

        let err = draft(json!({ "title": "  " })).apply_to(&form).unwrap_err();
        assert_eq!(err.to_string(), "Form title is required");
    }

    #[test]
    fn test_response() {
        let form_id = Uuid::new_v4();
        let response: ResponseDraft = serde_json::from_value(json!({
            "answers": [
                { "fieldName": "comment", "value": "Great service" },
                { "fieldName": "wouldRecommend", "value": true },
            ],
        }))
        .unwrap();

        let response = response.into_response(form_id).unwrap();
        assert_eq!(response.form_id, form_id);
        assert_eq!(response.answers[1].value, json!(true));

        let empty: ResponseDraft = serde_json::from_value(json!({ "answers": [] })).unwrap();
        assert_eq!(
            empty.into_response(form_id).unwrap_err().to_string(),
            "At least one answer is required"
        );

        let bad: ResponseDraft = serde_json::from_value(json!({
            "answers": [{ "fieldName": "_hidden", "value": null }],
        }))
        .unwrap();
        assert_eq!(
            bad.into_response(form_id).unwrap_err().messages(),
            [FIELD_NAME_RULE, "Answer must be written"]
        );
    }

    fn register(value: Value) -> Result<Registration, ValidationError> {
        serde_json::from_value::<RegisterDraft>(value)
            .unwrap()
            .into_registration()
    }

    #[test]
    fn test_register_order() {
        let cases = [
            (json!({ "password": "secret123" }), "Email is required"),
            (json!({ "email": "test@example.com" }), "Password is required"),
            (
                json!({ "email": "not-an-email", "password": "12345" }),
                "Password must be at least 6 characters",
            ),
            (
                json!({ "email": "not-an-email", "password": "secret123" }),
                "Invalid email format",
            ),
        ];

        for (body, message) in cases {
            assert_eq!(register(body).unwrap_err().to_string(), message);
        }
    }

    #[test]
    fn test_register_user() {
        let registration =
            register(json!({ "email": "Test@Example.com ", "password": "secret123" }));
        // the raw value carries a trailing space, which the email pattern rejects
        assert!(registration.is_err());

        let registration =
            register(json!({ "email": "Test@Example.com", "password": "secret123" })).unwrap();
        assert_eq!(registration.email, "test@example.com");
        assert_eq!(registration.role, Role::User);
        assert!(registration.business.is_none());
    }

    #[test]
    fn test_register_business() {
        let registration = register(json!({
            "name": "Business Owner",
            "email": "biz@example.com",
            "password": "Password123!",
            "role": "business",
            "location": "City Center",
            "pancardNumber": 1234567,
            "description": "Business profile",
            "businessname": "Acme Business",
        }))
        .unwrap();

        assert_eq!(registration.role, Role::Business);
        assert_eq!(registration.name.as_deref(), Some("Business Owner"));
        let business = registration.business.unwrap();
        assert_eq!(business.businessname, "Acme Business");
        assert_eq!(business.pancard_number, 1234567);

        let err = register(json!({
            "email": "biz@example.com",
            "password": "Password123!",
            "role": "business",
            "businessname": "Acme Business",
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Business profile requires location, pancardNumber, description"
        );

        for pancard in [json!(-5), json!("ABC123"), json!(12.5)] {
            let err = register(json!({
                "email": "biz@example.com",
                "password": "Password123!",
                "role": "business",
                "businessname": "Acme Business",
                "location": "City Center",
                "pancardNumber": pancard,
                "description": "Business profile",
            }))
            .unwrap_err();
            assert_eq!(err.to_string(), "Business profile requires pancardNumber");
        }

        let err = register(json!({
            "email": "biz@example.com",
            "password": "Password123!",
            "role": "admin",
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "Role `admin` is not supported");
    }

    #[test]
    fn test_login() {
        let login: LoginDraft =
            serde_json::from_value(json!({ "email": "123456@gmail.com", "password": "x" })).unwrap();
        let credentials = login.into_credentials().unwrap();
        assert_eq!(credentials.email, "123456@gmail.com");

        let login: LoginDraft = serde_json::from_value(json!({ "password": "secret123" })).unwrap();
        assert_eq!(
            login.into_credentials().unwrap_err().to_string(),
            "Email is required"
        );
    }
}
