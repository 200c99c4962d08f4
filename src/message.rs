//! Extracts the chat message from a decoded webhook and builds the text
//! that ends up on the lead.

use crate::attachments::AttachmentProcessor;
use crate::errors::AppError;
use crate::models::{AttachmentDescriptor, AttachmentKind, MessageEvent, ProcessedMessage};
use crate::nested_form::Node;

fn missing(what: &str) -> AppError {
    AppError::BadRequest(format!("missing {} in webhook payload", what))
}

fn leaf(node: &Node, key: &str) -> Option<String> {
    node.get(key).and_then(Node::as_str).map(str::to_string)
}

impl MessageEvent {
    /// Reads `message[add][0]` from a decoded Kommo webhook.
    ///
    /// Only the first entry of `add` is used.
    pub fn from_form(tree: &Node) -> Result<Self, AppError> {
        let message = tree.get("message").ok_or_else(|| missing("message"))?;
        let add = message
            .get("add")
            .and_then(Node::as_list)
            .ok_or_else(|| missing("message[add]"))?;
        let first = add.first().ok_or_else(|| missing("message[add][0]"))?;

        let raw_id = first
            .get("entity_id")
            .and_then(Node::as_str)
            .ok_or_else(|| missing("message[add][0][entity_id]"))?;
        let entity_id: i64 = raw_id.trim().parse().map_err(|_| {
            AppError::BadRequest(format!("entity_id is not an integer: '{}'", raw_id))
        })?;

        let text = leaf(first, "text").unwrap_or_default().trim().to_string();

        let attachment = first.get("attachment").map(|att| AttachmentDescriptor {
            kind: AttachmentKind::parse(att.get("type").and_then(Node::as_str).unwrap_or("")),
            link: leaf(att, "link"),
            file_name: leaf(att, "file_name"),
        });

        Ok(Self {
            entity_id,
            text,
            attachment,
        })
    }
}

/// Turns a message event into the text to store on its lead.
pub async fn assemble_message(
    event: &MessageEvent,
    attachments: &AttachmentProcessor,
) -> ProcessedMessage {
    ProcessedMessage {
        lead_id: event.entity_id,
        text: attachments.process(event).await,
    }
}
