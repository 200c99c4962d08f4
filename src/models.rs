use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attachment type as sent by Kommo in `attachment[type]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    Picture,
    Voice,
    /// Anything else (documents, stickers, ...). Left untouched.
    Other(String),
}

impl AttachmentKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "picture" => AttachmentKind::Picture,
            "voice" => AttachmentKind::Voice,
            other => AttachmentKind::Other(other.to_string()),
        }
    }
}

/// File attached to an incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub kind: AttachmentKind,
    pub link: Option<String>,
    pub file_name: Option<String>,
}

/// First `message[add]` entry of a Kommo chat webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Lead the message belongs to.
    pub entity_id: i64,
    pub text: String,
    pub attachment: Option<AttachmentDescriptor>,
}

/// Text ready to be appended to the lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedMessage {
    pub lead_id: i64,
    pub text: String,
}

/// Lead as returned by `GET /api/v4/leads/{id}`. Only the fields we read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KommoLead {
    pub status_id: Option<i64>,
    pub pipeline_id: Option<i64>,
    /// `null` when the lead has no custom field set at all.
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValues>>,
}

/// One custom field on a lead.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomFieldValues {
    pub field_id: i64,
    #[serde(default)]
    pub values: Vec<CustomFieldEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomFieldEntry {
    #[serde(default)]
    pub value: Value,
}

impl CustomFieldValues {
    /// Single-entry field holding `text`.
    pub fn text(field_id: i64, text: impl Into<String>) -> Self {
        Self {
            field_id,
            values: vec![CustomFieldEntry {
                value: Value::String(text.into()),
            }],
        }
    }

    /// String form of the first value slot, empty when absent.
    pub fn first_value_text(&self) -> String {
        match self.values.first().map(|entry| &entry.value) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Body of `PATCH /api/v4/leads/{id}` for custom fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadFieldsPatch {
    pub custom_fields_values: Vec<CustomFieldValues>,
}
