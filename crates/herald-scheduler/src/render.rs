//! Message rendering: `{placeholder}` substitution from contact fields.

use herald_core::types::Contact;
use serde_json::Value;

/// Used for `{empresa}` when the tenant has no display name.
pub const DEFAULT_COMPANY_NAME: &str = "Sua Empresa";

const STRIPPED_CHARS: [char; 10] = ['`', '|', '>', '<', '$', ';', '&', '\n', '\r', '\0'];

/// Make a field value safe to splice into an outbound message:
/// strip shell metacharacters and line breaks, HTML-escape, then cap length.
pub fn sanitize_template_value(value: &Value, max_len: usize) -> String {
    let raw = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let stripped: String = raw.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();

    let mut escaped = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }

    escaped.chars().take(max_len).collect()
}

/// Placeholder mapping for one contact. Built-in aliases come first; entries
/// from `contact.extra` override a built-in of the same name in place.
pub fn contact_fields(contact: &Contact, company_name: Option<&str>) -> Vec<(String, Value)> {
    let text = |s: &str| Value::String(s.to_string());
    let opt = |s: &Option<String>| Value::String(s.clone().unwrap_or_default());

    let mut fields: Vec<(String, Value)> = vec![
        ("nome".into(), text(&contact.name)),
        ("name".into(), text(&contact.name)),
        ("telefone".into(), text(&contact.phone)),
        ("phone".into(), text(&contact.phone)),
        ("email".into(), opt(&contact.email)),
        ("categoria".into(), opt(&contact.category)),
        ("category".into(), opt(&contact.category)),
        (
            "empresa".into(),
            text(company_name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_COMPANY_NAME)),
        ),
    ];

    for (key, value) in &contact.extra {
        match fields.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.clone(),
            None => fields.push((key.clone(), value.clone())),
        }
    }
    fields
}

/// Substitute `{key}` placeholders, then the lower/UPPER/Capitalized
/// variants of each key. Unknown placeholders stay verbatim.
pub fn render_template(template: &str, fields: &[(String, Value)], max_len: usize) -> String {
    let sanitized: Vec<(&str, String)> = fields
        .iter()
        .map(|(k, v)| (k.as_str(), sanitize_template_value(v, max_len)))
        .collect();

    let mut out = template.to_string();
    for (key, value) in &sanitized {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    for (key, value) in &sanitized {
        for variant in [key.to_lowercase(), key.to_uppercase(), capitalize(key)] {
            out = out.replace(&format!("{{{variant}}}"), value);
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
