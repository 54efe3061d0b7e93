//! WhatsApp gateway backed by a WAHA (WhatsApp HTTP API) server.
//!
//! One WAHA session per tenant. Media is passed by URL and fetched by the
//! WAHA server, so every media URL goes through [`validate_media_url`] first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_core::HeraldError;
use herald_core::config::GatewayConfig;
use herald_core::error::Result;
use herald_core::traits::{MessageGateway, TenantDirectory};
use herald_core::types::{DeliveryReceipt, MessageKind, OutboundMessage};
use serde_json::{Value, json};

use crate::media::{mimetype_for, validate_media_url};
use crate::phone::chat_id;

const SESSION_NAME_MAX: usize = 30;
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

fn short_id(tenant_id: &str) -> &str {
    match tenant_id.split('-').next() {
        Some(head) if !head.is_empty() => head,
        _ => "unknown",
    }
}

/// Session name for a tenant: a slug of the company name plus the first
/// segment of the tenant id, or `company_<segment>` when there is no name.
pub fn session_name_for(tenant_id: &str, company_name: Option<&str>) -> String {
    let short = short_id(tenant_id);

    let slug = company_name.map(|name| {
        let mut slug = String::with_capacity(name.len());
        for c in name.to_lowercase().chars() {
            let c = if c.is_ascii_alphanumeric() { c } else { '_' };
            if c == '_' && slug.ends_with('_') {
                continue;
            }
            slug.push(c);
        }
        slug.trim_matches('_').chars().take(SESSION_NAME_MAX).collect::<String>()
    });

    match slug {
        Some(slug) if !slug.is_empty() => format!("{slug}_{short}"),
        _ => format!("company_{short}"),
    }
}

/// A fully built WAHA send call.
#[derive(Debug, Clone, PartialEq)]
pub struct WahaRequest {
    pub path: &'static str,
    pub payload: Value,
    pub timeout: Duration,
}

/// Build the WAHA call for `message` on `session`.
pub fn build_request(
    message: &OutboundMessage,
    session: &str,
    config: &GatewayConfig,
) -> Result<WahaRequest> {
    let chat = chat_id(&message.to);
    let media_timeout = Duration::from_secs(config.media_timeout_secs);

    match message.kind {
        MessageKind::Text => Ok(WahaRequest {
            path: "/api/sendText",
            payload: json!({
                "chatId": chat,
                "text": message.body,
                "session": session,
            }),
            timeout: Duration::from_secs(config.timeout_secs),
        }),
        MessageKind::Image => {
            let Some(raw) = message.media_url.as_deref().filter(|u| !u.trim().is_empty()) else {
                return Err(HeraldError::Gateway("No image provided".into()));
            };
            let url = validate_media_url(raw)?;
            Ok(WahaRequest {
                path: "/api/sendImage",
                payload: json!({
                    "chatId": chat,
                    "caption": message.body,
                    "session": session,
                    "file": {
                        "url": url.as_str(),
                        "mimetype": mimetype_for(url.as_str()),
                    },
                }),
                timeout: media_timeout,
            })
        }
        MessageKind::Document => {
            let Some(raw) = message.media_url.as_deref().filter(|u| !u.trim().is_empty()) else {
                return Err(HeraldError::Gateway("No document provided".into()));
            };
            let url = validate_media_url(raw)?;
            let filename = message
                .media_filename
                .as_deref()
                .filter(|f| !f.is_empty())
                .unwrap_or("document");
            Ok(WahaRequest {
                path: "/api/sendFile",
                payload: json!({
                    "chatId": chat,
                    "caption": message.body,
                    "session": session,
                    "file": {
                        "filename": filename,
                        "url": url.as_str(),
                    },
                }),
                timeout: media_timeout,
            })
        }
    }
}

/// Message id from a WAHA send response, either `id` or `key.id`.
fn message_id(body: &Value) -> Option<String> {
    let id = body.get("id").or_else(|| body.get("key").and_then(|k| k.get("id")))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("_serialized")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// WAHA-backed [`MessageGateway`].
pub struct WahaGateway {
    config: GatewayConfig,
    client: reqwest::Client,
    directory: Option<Arc<dyn TenantDirectory>>,
    sessions: Mutex<HashMap<String, String>>,
}

impl WahaGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            directory: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Use tenant names from `directory` when deriving session names.
    pub fn with_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Session for a tenant. An explicitly configured session wins; otherwise
    /// the name is derived once per tenant and cached.
    pub async fn session_for(&self, tenant_id: &str) -> String {
        if !self.config.session.is_empty() && self.config.session != "default" {
            return self.config.session.clone();
        }
        if let Some(cached) = self.cached_session(tenant_id) {
            return cached;
        }

        let company_name = match &self.directory {
            Some(directory) => match directory.tenant_profile(tenant_id).await {
                Ok(profile) => profile.map(|p| p.name).filter(|n| !n.trim().is_empty()),
                Err(e) => {
                    tracing::warn!("⚠️ Tenant lookup for session name failed ({tenant_id}): {e}");
                    None
                }
            },
            None => None,
        };

        let session = session_name_for(tenant_id, company_name.as_deref());
        if company_name.is_none() {
            tracing::warn!("⚠️ No company name for {tenant_id}, using session {session}");
        }
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tenant_id.to_string(), session.clone());
        session
    }

    fn cached_session(&self, tenant_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(tenant_id)
            .cloned()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            builder
        } else {
            builder.header("X-Api-Key", &self.config.api_key)
        }
    }
}

#[async_trait]
impl MessageGateway for WahaGateway {
    fn name(&self) -> &str {
        "waha"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt> {
        let session = self.session_for(&message.tenant_id).await;
        let request = build_request(message, &session, &self.config)?;
        tracing::debug!(
            "📤 WAHA {} → {} (session {session})",
            request.path,
            message.to
        );

        let response = self
            .authorized(self.client.post(format!("{}{}", self.base_url(), request.path)))
            .timeout(request.timeout)
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| HeraldError::Gateway(format!("WAHA request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() != 200 && status.as_u16() != 201 {
            return Err(HeraldError::Gateway(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let message_id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| message_id(&v));
        Ok(DeliveryReceipt { message_id })
    }

    async fn is_connected(&self, tenant_id: &str) -> Result<bool> {
        let session = self.session_for(tenant_id).await;
        let url = format!("{}/api/sessions/{session}", self.base_url());

        let response = match self
            .authorized(self.client.get(&url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("⚠️ WAHA session check failed for {session}: {e}");
                return Ok(false);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                "⚠️ WAHA session {session} returned HTTP {}",
                response.status().as_u16()
            );
            return Ok(false);
        }

        let status = match response.json::<Value>().await {
            Ok(body) => body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            Err(e) => {
                tracing::warn!("⚠️ Unparseable WAHA session status for {session}: {e}");
                return Ok(false);
            }
        };
        tracing::debug!("🔌 WAHA session {session}: {status}");
        Ok(status == "WORKING" || status == "CONNECTED")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::types::TenantProfile;

    fn message(kind: MessageKind, media_url: Option<&str>) -> OutboundMessage {
        OutboundMessage {
            tenant_id: "3f2a9c1e-1111-2222".into(),
            kind,
            to: "(11) 99999-0000".into(),
            body: "Olá Ana".into(),
            media_url: media_url.map(str::to_string),
            media_filename: None,
        }
    }

    #[test]
    fn test_session_name_from_company() {
        assert_eq!(
            session_name_for("3f2a9c1e-1111-2222", Some("Padaria São João!!")),
            "padaria_s_o_jo_o_3f2a9c1e"
        );
        assert_eq!(
            session_name_for("abc-1", Some("  Acme   Corp  ")),
            "acme_corp_abc"
        );
    }

    #[test]
    fn test_session_name_truncates_slug() {
        let name = "a".repeat(50);
        let session = session_name_for("t1-x", Some(&name));
        assert_eq!(session, format!("{}_t1", "a".repeat(30)));
    }

    #[test]
    fn test_session_name_fallback() {
        assert_eq!(session_name_for("3f2a9c1e-1111", None), "company_3f2a9c1e");
        assert_eq!(session_name_for("3f2a9c1e-1111", Some("!!!")), "company_3f2a9c1e");
        assert_eq!(session_name_for("", None), "company_unknown");
    }

    #[test]
    fn test_text_request() {
        let config = GatewayConfig::default();
        let req = build_request(&message(MessageKind::Text, None), "acme_3f2a", &config).unwrap();
        assert_eq!(req.path, "/api/sendText");
        assert_eq!(req.timeout, Duration::from_secs(config.timeout_secs));
        assert_eq!(req.payload["chatId"], "5511999990000@c.us");
        assert_eq!(req.payload["text"], "Olá Ana");
        assert_eq!(req.payload["session"], "acme_3f2a");
    }

    #[test]
    fn test_image_request_has_mimetype() {
        let config = GatewayConfig::default();
        let msg = message(MessageKind::Image, Some("https://cdn.example.com/promo.webp"));
        let req = build_request(&msg, "s", &config).unwrap();
        assert_eq!(req.path, "/api/sendImage");
        assert_eq!(req.timeout, Duration::from_secs(config.media_timeout_secs));
        assert_eq!(req.payload["caption"], "Olá Ana");
        assert_eq!(req.payload["file"]["url"], "https://cdn.example.com/promo.webp");
        assert_eq!(req.payload["file"]["mimetype"], "image/webp");
    }

    #[test]
    fn test_document_request_defaults_filename() {
        let config = GatewayConfig::default();
        let msg = message(MessageKind::Document, Some("https://cdn.example.com/catalog.pdf"));
        let req = build_request(&msg, "s", &config).unwrap();
        assert_eq!(req.path, "/api/sendFile");
        assert_eq!(req.payload["file"]["filename"], "document");
        assert_eq!(req.payload["file"]["url"], "https://cdn.example.com/catalog.pdf");
    }

    #[test]
    fn test_media_required_and_validated() {
        let config = GatewayConfig::default();
        let err = build_request(&message(MessageKind::Image, None), "s", &config).unwrap_err();
        assert!(matches!(err, HeraldError::Gateway(m) if m == "No image provided"));

        let err = build_request(&message(MessageKind::Document, Some("  ")), "s", &config)
            .unwrap_err();
        assert!(matches!(err, HeraldError::Gateway(m) if m == "No document provided"));

        let msg = message(MessageKind::Image, Some("http://192.168.0.10/a.png"));
        assert!(matches!(
            build_request(&msg, "s", &config),
            Err(HeraldError::Security(_))
        ));
    }

    #[test]
    fn test_message_id_shapes() {
        assert_eq!(message_id(&json!({"id": "abc"})), Some("abc".into()));
        assert_eq!(message_id(&json!({"key": {"id": "k1"}})), Some("k1".into()));
        assert_eq!(
            message_id(&json!({"id": {"_serialized": "true_55@c.us_X"}})),
            Some("true_55@c.us_X".into())
        );
        assert_eq!(message_id(&json!({"ok": true})), None);
    }

    struct OneTenant;

    #[async_trait]
    impl TenantDirectory for OneTenant {
        async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>> {
            Ok(Some(TenantProfile {
                id: tenant_id.to_string(),
                name: "Loja Azul".into(),
                timezone: None,
            }))
        }
    }

    #[tokio::test]
    async fn test_session_for_uses_directory_and_config() {
        let gateway = WahaGateway::new(GatewayConfig::default()).with_directory(Arc::new(OneTenant));
        assert_eq!(gateway.session_for("9a8b-77").await, "loja_azul_9a8b");
        assert_eq!(gateway.cached_session("9a8b-77").as_deref(), Some("loja_azul_9a8b"));

        let fixed = WahaGateway::new(GatewayConfig {
            session: "shared".into(),
            ..GatewayConfig::default()
        });
        assert_eq!(fixed.session_for("9a8b-77").await, "shared");
    }
}
