//! Kommo Webhook Bridge Library
//!
//! This library receives Kommo (amoCRM) chat webhooks, enriches picture
//! and voice attachments with OpenAI, and appends the resulting text to a
//! custom field on the lead.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Parsing, enrichment and merge logic.
//! - `integrations`: External service clients.
//! - `attachments`: Picture/voice enrichment.
//! - `audio_format`: Magic-byte audio container detection.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `field_updater`: Lead custom field merge and write.
//! - `handlers`: Shared state and health check.
//! - `kommo_client`: Kommo leads API client.
//! - `media_fetcher`: Attachment downloads.
//! - `message`: Chat message extraction and assembly.
//! - `models`: Core data models.
//! - `nested_form`: Bracketed form-key parser.
//! - `openai_client`: OpenAI vision and transcription client.
//! - `routes`: Router assembly.
//! - `webhook_handler`: Kommo webhook handler.
//! - `webhook_models`: Webhook response models.

pub mod api;
pub mod core;
pub mod integrations;

pub mod attachments;
pub mod audio_format;
pub mod config;
pub mod errors;
pub mod field_updater;
pub mod handlers;
pub mod kommo_client;
pub mod media_fetcher;
pub mod message;
pub mod models;
pub mod nested_form;
pub mod openai_client;
pub mod routes;
pub mod webhook_handler;
pub mod webhook_models;
