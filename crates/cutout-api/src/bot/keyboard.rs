//! Result keyboard and callback payloads.
//!
//! Buttons carry `send_doc_{owner}` or `send_photo_{owner}` as callback
//! data. The owner id in the payload is checked against the user who
//! pressed the button before any result is touched.

use cutout_infra::telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use cutout_types::owner::OwnerId;

const SEND_DOC_PREFIX: &str = "send_doc_";
const SEND_PHOTO_PREFIX: &str = "send_photo_";

/// What a result keyboard button asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Deliver the transparent PNG as a document and consume the result.
    SendDocument(OwnerId),
    /// Send a recompressed preview photo; the result stays available.
    SendPreview(OwnerId),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(owner) = data.strip_prefix(SEND_DOC_PREFIX) {
            return owner.parse().ok().map(CallbackAction::SendDocument);
        }
        if let Some(owner) = data.strip_prefix(SEND_PHOTO_PREFIX) {
            return owner.parse().ok().map(CallbackAction::SendPreview);
        }
        None
    }

    pub fn owner_id(&self) -> OwnerId {
        match self {
            CallbackAction::SendDocument(owner) | CallbackAction::SendPreview(owner) => *owner,
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            CallbackAction::SendDocument(owner) => format!("{SEND_DOC_PREFIX}{owner}"),
            CallbackAction::SendPreview(owner) => format!("{SEND_PHOTO_PREFIX}{owner}"),
        }
    }
}

/// Two-row keyboard offered once a result is ready.
pub fn result_keyboard(owner_id: OwnerId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton {
                text: "📎 Download (Transparent PNG)".to_string(),
                callback_data: CallbackAction::SendDocument(owner_id).callback_data(),
            }],
            vec![InlineKeyboardButton {
                text: "🖼️ Quick Preview".to_string(),
                callback_data: CallbackAction::SendPreview(owner_id).callback_data(),
            }],
        ],
    }
}
