use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::intake::IntakeError;

const SUBJECT_KEYS: &[&str] = &["subject", "Subject"];
const FROM_KEYS: &[&str] = &["from", "sender", "from_address", "From"];
const FROM_NAME_KEYS: &[&str] = &["from_name", "fromName"];
const TEXT_KEYS: &[&str] = &["text", "body", "body-plain", "body_plain", "stripped-text"];
const MESSAGE_ID_KEYS: &[&str] = &[
    "message_id",
    "messageId",
    "Message-Id",
    "message-id",
    "Message-ID",
];
const DATE_KEYS: &[&str] = &["date", "Date"];

/// An inbound message reduced to the fields a ticket is built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundEmail {
    pub subject: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub text: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<String>,
}

/// Parses `Name <addr>`, `"Name" <addr>`, `<addr>` or a bare address.
/// The address comes back lowercased.
pub fn parse_sender(raw: &str) -> Option<(String, Option<String>)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (address, name) = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = raw[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (raw[open + 1..close].trim(), name)
        }
        _ => (raw, None),
    };

    let address = address.to_lowercase();
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !address.contains(char::is_whitespace)
        }
        None => false,
    };
    valid.then_some((address, name))
}

pub fn sender_domain(address: &str) -> Option<&str> {
    address.rsplit_once('@').map(|(_, domain)| domain)
}

/// Trims and removes surrounding angle brackets.
pub fn normalize_message_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let id = id.strip_prefix('<').unwrap_or(id);
    let id = id.strip_suffix('>').unwrap_or(id).trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Stable id for messages that arrive without a Message-ID, so redelivery of
/// the same message still deduplicates.
pub fn derive_message_id(from: &str, subject: &str, date: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in [from, subject, date, text].iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    format!("derived-{}", hex::encode(hasher.finalize()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_of<'a>(lookup: impl Fn(&str) -> Option<&'a str>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_blank(lookup(key)))
}

impl InboundEmail {
    /// Builds from loose string fields (form posts, mail-provider webhooks).
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, IntakeError> {
        let lookup = |key: &str| fields.get(key).map(String::as_str);
        let from = first_of(lookup, FROM_KEYS).ok_or(IntakeError::MissingSender)?;
        let (from_address, parsed_name) =
            parse_sender(&from).ok_or_else(|| IntakeError::InvalidSender(from.clone()))?;

        Ok(Self {
            subject: first_of(lookup, SUBJECT_KEYS),
            from_address,
            from_name: first_of(lookup, FROM_NAME_KEYS).or(parsed_name),
            text: first_of(lookup, TEXT_KEYS),
            message_id: first_of(lookup, MESSAGE_ID_KEYS)
                .and_then(|id| normalize_message_id(&id)),
            date: first_of(lookup, DATE_KEYS),
        })
    }

    /// JSON object body. A `from` given as `{ "address", "name" }` is also
    /// accepted.
    pub fn from_json(value: &Value) -> Result<Self, IntakeError> {
        let object = value
            .as_object()
            .ok_or_else(|| IntakeError::Payload("expected a JSON object".to_string()))?;

        let mut fields: HashMap<String, String> = object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        if let Some(from) = object.get("from").and_then(Value::as_object) {
            let address = from
                .get("address")
                .or_else(|| from.get("email"))
                .and_then(Value::as_str);
            if let Some(address) = address {
                fields.insert("from".to_string(), address.to_string());
            }
            if let Some(name) = from.get("name").and_then(Value::as_str) {
                fields.insert("from_name".to_string(), name.to_string());
            }
        }

        Self::from_fields(&fields)
    }

    pub fn from_mime(raw: &[u8]) -> Result<Self, IntakeError> {
        let parsed = mailparse::parse_mail(raw)?;
        let headers = &parsed.headers;

        let from = headers
            .get_first_value("From")
            .ok_or(IntakeError::MissingSender)?;
        let (from_address, from_name) =
            parse_sender(&from).ok_or_else(|| IntakeError::InvalidSender(from.clone()))?;

        Ok(Self {
            subject: non_blank(headers.get_first_value("Subject").as_deref()),
            from_address,
            from_name,
            text: non_blank(extract_text(&parsed).as_deref()),
            message_id: headers
                .get_first_value("Message-ID")
                .and_then(|id| normalize_message_id(&id)),
            date: non_blank(headers.get_first_value("Date").as_deref()),
        })
    }

    /// The message-id to deduplicate on, derived when the message has none.
    pub fn effective_message_id(&self) -> String {
        self.message_id.clone().unwrap_or_else(|| {
            derive_message_id(
                &self.from_address,
                self.subject.as_deref().unwrap_or_default(),
                self.date.as_deref().unwrap_or_default(),
                self.text.as_deref().unwrap_or_default(),
            )
        })
    }
}

/// First `text/plain` part that is not an attachment, falling back to a
/// tag-stripped `text/html` part.
fn extract_text(mail: &ParsedMail<'_>) -> Option<String> {
    find_part(mail, "text/plain")
        .or_else(|| find_part(mail, "text/html").map(|html| strip_tags(&html)))
}

fn find_part(mail: &ParsedMail<'_>, mimetype: &str) -> Option<String> {
    if mail.subparts.is_empty() {
        let is_attachment = mail
            .headers
            .get_first_value("Content-Disposition")
            .is_some_and(|d| d.trim_start().to_lowercase().starts_with("attachment"));
        if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) && !is_attachment {
            return mail.get_body().ok();
        }
        return None;
    }
    mail.subparts.iter().find_map(|part| find_part(part, mimetype))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sender_forms() {
        assert_eq!(
            parse_sender("Jane Doe <Jane.Doe@Contoso.com>"),
            Some(("jane.doe@contoso.com".to_string(), Some("Jane Doe".to_string())))
        );
        assert_eq!(
            parse_sender("\"Doe, Jane\" <jane@contoso.com>"),
            Some(("jane@contoso.com".to_string(), Some("Doe, Jane".to_string())))
        );
        assert_eq!(
            parse_sender("<jane@contoso.com>"),
            Some(("jane@contoso.com".to_string(), None))
        );
        assert_eq!(
            parse_sender("  JANE@contoso.com "),
            Some(("jane@contoso.com".to_string(), None))
        );
        assert_eq!(parse_sender("Jane Doe"), None);
        assert_eq!(parse_sender(""), None);
    }

    #[test]
    fn test_normalize_message_id() {
        assert_eq!(
            normalize_message_id("  <abc@mail.example.com> "),
            Some("abc@mail.example.com".to_string())
        );
        assert_eq!(normalize_message_id("abc"), Some("abc".to_string()));
        assert_eq!(normalize_message_id("<>"), None);
        assert_eq!(normalize_message_id("   "), None);
    }

    #[test]
    fn test_derived_message_id_is_stable() {
        let a = derive_message_id("a@b.co", "Help", "Mon, 1 Jan 2024", "body");
        let b = derive_message_id("a@b.co", "Help", "Mon, 1 Jan 2024", "body");
        let c = derive_message_id("a@b.co", "Help!", "Mon, 1 Jan 2024", "body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("derived-"));
        assert_eq!(a.len(), "derived-".len() + 64);
    }

    #[test]
    fn test_from_json_aliases() {
        let email = InboundEmail::from_json(&json!({
            "subject": "Printer jammed",
            "sender": "Bob <BOB@acme.io>",
            "body-plain": "Third floor printer",
            "Message-Id": "<m1@acme.io>",
            "date": "Tue, 11 Jun 2024 09:00:00 +0000"
        }))
        .unwrap();

        assert_eq!(email.subject.as_deref(), Some("Printer jammed"));
        assert_eq!(email.from_address, "bob@acme.io");
        assert_eq!(email.from_name.as_deref(), Some("Bob"));
        assert_eq!(email.text.as_deref(), Some("Third floor printer"));
        assert_eq!(email.message_id.as_deref(), Some("m1@acme.io"));
        assert_eq!(email.effective_message_id(), "m1@acme.io");
    }

    #[test]
    fn test_from_json_object_sender() {
        let email = InboundEmail::from_json(&json!({
            "from": { "address": "Ops@Acme.io", "name": "Ops Team" },
            "text": "hi"
        }))
        .unwrap();
        assert_eq!(email.from_address, "ops@acme.io");
        assert_eq!(email.from_name.as_deref(), Some("Ops Team"));
        assert!(email.subject.is_none());
        assert!(email.effective_message_id().starts_with("derived-"));
    }

    #[test]
    fn test_from_json_rejects_missing_or_bad_sender() {
        assert!(matches!(
            InboundEmail::from_json(&json!({ "subject": "x" })),
            Err(IntakeError::MissingSender)
        ));
        assert!(matches!(
            InboundEmail::from_json(&json!({ "from": "nobody" })),
            Err(IntakeError::InvalidSender(_))
        ));
        assert!(matches!(
            InboundEmail::from_json(&json!(["not", "an", "object"])),
            Err(IntakeError::Payload(_))
        ));
    }

    #[test]
    fn test_from_mime_multipart() {
        let raw = concat!(
            "From: \"Carla Ruiz\" <Carla@Globex.com>\r\n",
            "To: help@desk.example.com\r\n",
            "Subject: VPN not connecting\r\n",
            "Message-ID: <CAF123@mail.globex.com>\r\n",
            "Date: Wed, 12 Jun 2024 08:15:00 +0000\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "The VPN client times out.\r\n",
            "--b1\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>The VPN client <b>times out</b>.</p>\r\n",
            "--b1--\r\n",
        );

        let email = InboundEmail::from_mime(raw.as_bytes()).unwrap();
        assert_eq!(email.from_address, "carla@globex.com");
        assert_eq!(email.from_name.as_deref(), Some("Carla Ruiz"));
        assert_eq!(email.subject.as_deref(), Some("VPN not connecting"));
        assert_eq!(email.message_id.as_deref(), Some("CAF123@mail.globex.com"));
        assert_eq!(email.text.as_deref(), Some("The VPN client times out."));
    }

    #[test]
    fn test_from_mime_html_only() {
        let raw = concat!(
            "From: it@globex.com\r\n",
            "Subject: Hi\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<div>Disk&nbsp;full &amp; slow</div>\r\n",
        );
        let email = InboundEmail::from_mime(raw.as_bytes()).unwrap();
        assert_eq!(email.text.as_deref(), Some("Disk full & slow"));
        assert!(email.message_id.is_none());
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(sender_domain("a@globex.com"), Some("globex.com"));
        assert_eq!(sender_domain("nope"), None);
    }
}
