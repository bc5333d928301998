//! Bot API wire types.
//!
//! Only the fields the bot reads are modelled; serde ignores the rest.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Available sizes of a photo, smallest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the pressed keyboard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Result of `getFile`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Relative download path; valid for about an hour.
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_photo_update() {
        let raw = r#"{
            "ok": true,
            "result": [{
                "update_id": 10,
                "message": {
                    "message_id": 5,
                    "date": 1700000000,
                    "from": {"id": 42, "is_bot": false, "first_name": "Ada", "last_name": "Lovelace"},
                    "chat": {"id": 42, "type": "private"},
                    "photo": [
                        {"file_id": "small", "file_unique_id": "a", "width": 90, "height": 90, "file_size": 1000},
                        {"file_id": "large", "file_unique_id": "b", "width": 1280, "height": 1280}
                    ]
                }
            }]
        }"#;

        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.from.as_ref().unwrap().full_name(), "Ada Lovelace");
        let photo = message.photo.as_ref().unwrap();
        assert_eq!(photo.last().unwrap().file_id, "large");
        assert_eq!(photo[1].file_size, None);
    }

    #[test]
    fn parses_callback_query() {
        let raw = r#"{
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
                "message": {"message_id": 7, "chat": {"id": 42, "type": "private"}, "text": "ready"},
                "chat_instance": "x",
                "data": "send_doc_42"
            }
        }"#;

        let update: Update = serde_json::from_str(raw).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.data.as_deref(), Some("send_doc_42"));
        assert_eq!(query.message.unwrap().message_id, 7);
        assert_eq!(query.from.full_name(), "Ada");
    }

    #[test]
    fn parses_error_envelope() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let resp: ApiResponse<bool> = serde_json::from_str(raw).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(401));
        assert_eq!(resp.result, None);
    }

    #[test]
    fn keyboard_serializes_to_bot_api_shape() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: "Download".into(),
                callback_data: "send_doc_1".into(),
            }]],
        };
        let json = serde_json::to_value(&markup).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "send_doc_1");
    }
}
