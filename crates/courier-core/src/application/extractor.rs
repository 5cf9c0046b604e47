//!
//! Message extractor
//!
//! Turns the provider's nested `entry → changes → value` envelope into one
//! [`InboundEvent`] in a single parsing pass. Routing never looks at the raw
//! payload again. Malformed input yields `Unrecognized`; this module never
//! returns an error. Individual malformed entries in `messages`, `statuses`
//! or `contacts` are skipped without discarding the rest of the batch.
//!

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::message::{
    CanonicalMessage, InboundEvent, MediaRef, MessageKind, ReportedStatus, StatusEvent,
};
use crate::types::{ExternalMessageId, SenderId};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: Option<ChangeValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Value>,
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    statuses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    wa_id: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    from: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextBody>,
    #[serde(default)]
    interactive: Option<Interactive>,
    #[serde(default)]
    button: Option<TemplateButton>,
    #[serde(default)]
    image: Option<Image>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct Interactive {
    #[serde(default)]
    button_reply: Option<Selection>,
    #[serde(default)]
    list_reply: Option<Selection>,
}

#[derive(Debug, Deserialize)]
struct Selection {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TemplateButton {
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    id: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    id: String,
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
    recipient_id: String,
    #[serde(default)]
    errors: Vec<RawStatusError>,
}

#[derive(Debug, Deserialize)]
struct RawStatusError {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    details: Option<String>,
}

/// Classify a raw provider envelope
pub fn extract(payload: &Value) -> InboundEvent {
    let envelope = match Envelope::deserialize(payload) {
        Ok(envelope) => envelope,
        Err(e) => return InboundEvent::unrecognized(format!("malformed envelope: {}", e)),
    };

    let value = match envelope
        .entry
        .into_iter()
        .next()
        .and_then(|entry| entry.changes.into_iter().next())
        .and_then(|change| change.value)
    {
        Some(value) => value,
        None => return InboundEvent::unrecognized("envelope has no entry[0].changes[0].value"),
    };

    match (value.statuses.is_empty(), value.messages.is_empty()) {
        (false, false) => {
            InboundEvent::unrecognized("envelope carries both statuses and messages")
        }
        (false, true) => extract_statuses(value.statuses),
        (true, false) => extract_message(value.messages, value.contacts),
        (true, true) => InboundEvent::unrecognized("envelope carries neither statuses nor messages"),
    }
}

/// Parse each entry on its own, dropping the ones that do not fit `T`
fn parse_entries<T: for<'de> Deserialize<'de>>(entries: &[Value], collection: &str) -> Vec<T> {
    entries
        .iter()
        .filter_map(|entry| match T::deserialize(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!(collection, error = %e, "skipping malformed entry");
                None
            }
        })
        .collect()
}

fn extract_message(messages: Vec<Value>, contacts: Vec<Value>) -> InboundEvent {
    let Some(raw) = parse_entries::<RawMessage>(&messages, "messages")
        .into_iter()
        .next()
    else {
        return InboundEvent::unrecognized("no well-formed message entry");
    };
    let contacts = parse_entries::<Contact>(&contacts, "contacts");

    let contact_name = contacts
        .iter()
        .find(|c| c.wa_id.as_deref() == Some(raw.from.as_str()))
        .or_else(|| contacts.first())
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());

    let (kind, text_body, media_ref) = match raw.kind.as_str() {
        "text" => (
            MessageKind::Text,
            raw.text.map(|t| t.body).unwrap_or_default(),
            None,
        ),
        "interactive" => {
            let Some(interactive) = raw.interactive else {
                return InboundEvent::unrecognized("interactive message without body");
            };
            if let Some(button) = interactive.button_reply {
                (MessageKind::InteractiveButton, button.id, None)
            } else if let Some(row) = interactive.list_reply {
                (MessageKind::InteractiveList, row.id, None)
            } else {
                return InboundEvent::unrecognized("unsupported interactive reply");
            }
        }
        "button" => {
            let Some(button) = raw.button else {
                return InboundEvent::unrecognized("button message without body");
            };
            let text = button.payload.or(button.text).unwrap_or_default();
            (MessageKind::InteractiveButton, text, None)
        }
        "image" => {
            let Some(image) = raw.image else {
                return InboundEvent::unrecognized("image message without media");
            };
            (
                MessageKind::Image,
                image.caption.unwrap_or_default(),
                Some(MediaRef {
                    media_id: image.id,
                    mime_type: image.mime_type,
                }),
            )
        }
        other => {
            debug!(message_type = %other, "unsupported message type");
            return InboundEvent::unrecognized(format!("unsupported message type: {}", other));
        }
    };

    InboundEvent::Message(CanonicalMessage {
        external_id: ExternalMessageId(raw.id),
        sender_id: SenderId(raw.from),
        contact_name,
        kind,
        text_body,
        media_ref,
        timestamp: parse_epoch(raw.timestamp.as_deref()),
    })
}

fn extract_statuses(statuses: Vec<Value>) -> InboundEvent {
    let events: Vec<StatusEvent> = parse_entries::<RawStatus>(&statuses, "statuses")
        .into_iter()
        .filter_map(|raw| {
            let Some(status) = ReportedStatus::parse(&raw.status) else {
                debug!(external_id = %raw.id, status = %raw.status, "skipping unknown status");
                return None;
            };
            let first_error = raw.errors.into_iter().next();
            let error_code = first_error
                .as_ref()
                .and_then(|e| e.code.as_ref())
                .map(|code| match code {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            let error_message = first_error.and_then(|e| {
                e.error_data
                    .and_then(|d| d.details)
                    .or(e.message)
                    .or(e.title)
            });

            Some(StatusEvent {
                external_message_id: ExternalMessageId(raw.id),
                status,
                timestamp: parse_epoch(raw.timestamp.as_deref()),
                recipient_id: SenderId(raw.recipient_id),
                error_code,
                error_message,
            })
        })
        .collect();

    if events.is_empty() {
        return InboundEvent::unrecognized("no recognised status entries");
    }
    InboundEvent::StatusBatch(events)
}

/// Provider timestamps are epoch seconds as strings; unparseable values fall back to now
fn parse_epoch(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1029",
                "changes": [{ "field": "messages", "value": value }]
            }]
        })
    }

    fn message_envelope(message: Value) -> Value {
        envelope(json!({
            "messaging_product": "whatsapp",
            "contacts": [{ "profile": { "name": "Ana" }, "wa_id": "5511999" }],
            "messages": [message]
        }))
    }

    fn expect_message(event: InboundEvent) -> CanonicalMessage {
        match event {
            InboundEvent::Message(msg) => msg,
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_text_message() {
        let msg = expect_message(extract(&message_envelope(json!({
            "from": "5511999",
            "id": "wamid.A",
            "timestamp": "1700000000",
            "type": "text",
            "text": { "body": "hola" }
        }))));

        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.text_body, "hola");
        assert_eq!(msg.external_id.as_str(), "wamid.A");
        assert_eq!(msg.sender_id.as_str(), "5511999");
        assert_eq!(msg.contact_name.as_deref(), Some("Ana"));
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
        assert!(msg.media_ref.is_none());
    }

    #[test]
    fn test_button_and_list_selection_become_text() {
        let button = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.B", "timestamp": "1700000000",
            "type": "interactive",
            "interactive": { "type": "button_reply", "button_reply": { "id": "option_3", "title": "Three" } }
        }))));
        assert_eq!(button.kind, MessageKind::InteractiveButton);
        assert_eq!(button.text_body, "option_3");

        let list = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.C", "timestamp": "1700000000",
            "type": "interactive",
            "interactive": { "type": "list_reply", "list_reply": { "id": "option_7", "title": "Seven" } }
        }))));
        assert_eq!(list.kind, MessageKind::InteractiveList);
        assert_eq!(list.text_body, "option_7");
    }

    #[test]
    fn test_template_quick_reply_button() {
        let msg = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.D", "timestamp": "1700000000",
            "type": "button",
            "button": { "payload": "option_2", "text": "Support" }
        }))));
        assert_eq!(msg.kind, MessageKind::InteractiveButton);
        assert_eq!(msg.text_body, "option_2");
    }

    #[test]
    fn test_image_with_and_without_caption() {
        let captioned = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.E", "timestamp": "1700000000",
            "type": "image",
            "image": { "id": "media-1", "mime_type": "image/jpeg", "caption": "badge" }
        }))));
        assert_eq!(captioned.kind, MessageKind::Image);
        assert_eq!(captioned.text_body, "badge");
        let media = captioned.media_ref.unwrap();
        assert_eq!(media.media_id, "media-1");
        assert_eq!(media.mime_type.as_deref(), Some("image/jpeg"));

        let bare = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.F", "timestamp": "1700000000",
            "type": "image",
            "image": { "id": "media-2" }
        }))));
        assert_eq!(bare.text_body, "");
        assert!(bare.media_ref.is_some());
    }

    #[test]
    fn test_status_batch_with_error_details() {
        let event = extract(&envelope(json!({
            "statuses": [
                { "id": "wamid.S1", "status": "delivered", "timestamp": "1700000100", "recipient_id": "5511" },
                { "id": "wamid.S2", "status": "failed", "timestamp": "1700000200", "recipient_id": "5522",
                  "errors": [{ "code": 131026, "title": "Message undeliverable",
                               "error_data": { "details": "Receiver is incapable" } }] },
                { "id": "wamid.S3", "status": "failed", "timestamp": "1700000300", "recipient_id": "5533",
                  "errors": [{ "code": "470", "title": "Re-engagement message" }] },
                { "id": "wamid.S4", "status": "deleted", "timestamp": "1700000400", "recipient_id": "5544" }
            ]
        })));

        let InboundEvent::StatusBatch(events) = event else {
            panic!("expected status batch");
        };
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].status, ReportedStatus::Delivered);
        assert_eq!(events[0].timestamp.timestamp(), 1_700_000_100);
        assert_eq!(events[1].error_code.as_deref(), Some("131026"));
        assert_eq!(events[1].error_message.as_deref(), Some("Receiver is incapable"));
        assert_eq!(events[2].error_code.as_deref(), Some("470"));
        assert_eq!(events[2].error_message.as_deref(), Some("Re-engagement message"));
    }

    #[test]
    fn test_malformed_status_entry_does_not_drop_batch() {
        let event = extract(&envelope(json!({
            "statuses": [
                { "id": "wamid.S1", "status": "read", "timestamp": "1700000100" },
                { "id": "wamid.S2", "status": "delivered", "timestamp": "1700000200", "recipient_id": "5522" },
                "garbage"
            ]
        })));

        let InboundEvent::StatusBatch(events) = event else {
            panic!("expected status batch");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_message_id.as_str(), "wamid.S2");
        assert_eq!(events[0].recipient_id.as_str(), "5522");

        let none_left = extract(&envelope(json!({
            "statuses": [{ "id": "wamid.S1", "status": "read" }]
        })));
        assert!(matches!(none_left, InboundEvent::Unrecognized { .. }));
    }

    #[test]
    fn test_malformed_message_entry_is_skipped() {
        let msg = expect_message(extract(&envelope(json!({
            "contacts": [42, { "profile": { "name": "Ana" }, "wa_id": "5511999" }],
            "messages": [
                { "from": "5511999", "type": "text" },
                { "from": "5511999", "id": "wamid.H", "type": "text", "text": { "body": "hi" } }
            ]
        }))));
        assert_eq!(msg.external_id.as_str(), "wamid.H");
        assert_eq!(msg.contact_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_malformed_payloads_are_unrecognized() {
        let cases = vec![
            json!("not an object"),
            json!({}),
            json!({ "entry": [] }),
            json!({ "entry": [{ "changes": [] }] }),
            envelope(json!({})),
            message_envelope(json!({ "id": "x", "from": "y", "type": "sticker" })),
            message_envelope(json!({ "id": "x", "from": "y", "type": "interactive" })),
            message_envelope(json!({ "from": "y", "type": "text" })),
        ];

        for payload in cases {
            assert!(
                matches!(extract(&payload), InboundEvent::Unrecognized { .. }),
                "payload should be unrecognized: {}",
                payload
            );
        }
    }

    #[test]
    fn test_both_collections_rejected() {
        let event = extract(&envelope(json!({
            "messages": [{ "id": "x", "from": "y", "type": "text", "text": { "body": "hi" } }],
            "statuses": [{ "id": "z", "status": "sent", "recipient_id": "y" }]
        })));
        assert!(matches!(event, InboundEvent::Unrecognized { .. }));
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let msg = expect_message(extract(&message_envelope(json!({
            "from": "5511999", "id": "wamid.G", "timestamp": "yesterday",
            "type": "text", "text": { "body": "x" }
        }))));
        assert!(msg.timestamp >= before);
    }
}
