//! Appends processed messages to the lead's message custom field.

use crate::errors::AppError;
use crate::kommo_client::KommoClient;
use crate::models::{CustomFieldValues, LeadFieldsPatch};

/// Computes the new value of `field_id` after appending `text`.
///
/// - no custom fields on the lead: the field is created with `text`;
/// - field missing: same;
/// - field present: the first match's first value gets `"\n" + text`
///   appended, or is replaced when it is empty.
pub fn merge_message_field(
    existing: Option<&[CustomFieldValues]>,
    field_id: i64,
    text: &str,
) -> CustomFieldValues {
    let Some(fields) = existing else {
        tracing::debug!("Lead has no custom fields, creating field {}", field_id);
        return CustomFieldValues::text(field_id, text);
    };

    match fields.iter().find(|field| field.field_id == field_id) {
        Some(field) => {
            let current = field.first_value_text();
            tracing::debug!("Field {} found, appending to existing value", field_id);
            if current.is_empty() {
                CustomFieldValues::text(field_id, text)
            } else {
                CustomFieldValues::text(field_id, format!("{}\n{}", current, text))
            }
        }
        None => {
            tracing::debug!("Field {} not set on lead, creating it", field_id);
            CustomFieldValues::text(field_id, text)
        }
    }
}

/// Reads the lead, merges `text` into `field_id` and writes it back.
///
/// The read and the write are not atomic; two messages for the same lead
/// arriving together can lose one of them.
pub async fn append_to_lead_field(
    kommo: &KommoClient,
    lead_id: i64,
    field_id: i64,
    text: &str,
) -> Result<(), AppError> {
    let lead = kommo.get_lead(lead_id).await?;
    let merged = merge_message_field(lead.custom_fields_values.as_deref(), field_id, text);
    let patch = LeadFieldsPatch {
        custom_fields_values: vec![merged],
    };
    kommo.update_lead_fields(lead_id, &patch).await
}
