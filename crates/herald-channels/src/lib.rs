//! # Herald Channels
//! Messaging gateway implementations.
//!
//! - `waha`: WhatsApp via a WAHA server (text, image, document)
//! - `media`: SSRF checks and mimetype detection for media URLs
//! - `phone`: phone number normalization to WhatsApp chat ids

pub mod media;
pub mod phone;
pub mod waha;

pub use media::{mimetype_for, validate_media_url};
pub use phone::{chat_id, normalize_phone};
pub use waha::{WahaGateway, WahaRequest, build_request, session_name_for};
