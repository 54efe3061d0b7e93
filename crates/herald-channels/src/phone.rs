//! Phone numbers to WhatsApp chat ids.

/// Digits only, one leading `0` dropped, Brazil's `55` prefixed when the
/// number looks local (11 digits or fewer).
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.strip_prefix('0').unwrap_or(&digits);

    if digits.len() <= 11 && !digits.starts_with("55") {
        format!("55{digits}")
    } else {
        digits.to_string()
    }
}

/// WAHA chat id for a phone number.
pub fn chat_id(raw: &str) -> String {
    format!("{}@c.us", normalize_phone(raw))
}
