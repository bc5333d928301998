//! Update routing: commands, image uploads and keyboard callbacks.
//!
//! Handlers never let an error escape the router. Failures are logged with
//! the update id and answered with a generic reply, and the poll loop keeps
//! going.

use std::sync::Arc;

use cutout_core::service::CutoutService;
use cutout_infra::telegram::TelegramError;
use cutout_infra::telegram::types::{CallbackQuery, Message, Update, User};
use cutout_types::error::CutoutError;
use cutout_types::owner::OwnerId;
use tracing::{debug, error, info, warn};

use super::keyboard::{CallbackAction, result_keyboard};
use super::replies;
use super::transport::ChatTransport;

/// Routes one update at a time to the matching handler.
pub struct Router<T> {
    transport: Arc<T>,
    service: Arc<CutoutService>,
    max_input_bytes: u64,
}

impl<T> Clone for Router<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            service: Arc::clone(&self.service),
            max_input_bytes: self.max_input_bytes,
        }
    }
}

/// What an incoming message carries.
#[derive(Debug, PartialEq)]
enum Inbound<'a> {
    Command(&'a str),
    Image {
        file_id: &'a str,
        declared_size: Option<u64>,
    },
    NotAnImage,
    Other,
}

/// Why an image request did not produce a result.
enum Failure {
    /// Reported to the user with a kind-specific reply.
    Rejected(CutoutError),
    /// The chat transport failed; handled as a generic handler error.
    Transport(TelegramError),
}

impl From<CutoutError> for Failure {
    fn from(e: CutoutError) -> Self {
        Failure::Rejected(e)
    }
}

impl From<TelegramError> for Failure {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::FileTooLarge { size, limit } => {
                Failure::Rejected(CutoutError::TooLarge { size, limit })
            }
            other => Failure::Transport(other),
        }
    }
}

impl<T: ChatTransport + 'static> Router<T> {
    pub fn new(transport: Arc<T>, service: Arc<CutoutService>, max_input_bytes: u64) -> Self {
        Self {
            transport,
            service,
            max_input_bytes,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn service(&self) -> &Arc<CutoutService> {
        &self.service
    }

    /// Handle one update. Never fails; errors are logged and answered.
    pub async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;

        if let Some(query) = update.callback_query {
            if let Err(e) = self.handle_callback(&query).await {
                error!(update_id, error = %e, "callback handler failed");
                let _ = self
                    .transport
                    .answer_callback(&query.id, Some(replies::SEND_FAILED))
                    .await;
            }
        } else if let Some(message) = update.message {
            if let Err(e) = self.handle_message(&message).await {
                error!(update_id, error = %e, "message handler failed");
                let _ = self
                    .transport
                    .send_message(message.chat.id, replies::GENERIC_FAILURE, None)
                    .await;
            }
        } else {
            debug!(update_id, "ignoring update without message or callback");
        }
    }

    async fn handle_message(&self, message: &Message) -> Result<(), TelegramError> {
        let chat_id = message.chat.id;
        let owner_id = OwnerId(message.from.as_ref().map_or(chat_id, |u| u.id));

        match inbound(message) {
            Inbound::Command("start") => {
                let name = message
                    .from
                    .as_ref()
                    .map(User::full_name)
                    .unwrap_or_else(|| "there".to_string());
                self.transport
                    .send_message(chat_id, &replies::start(&name), None)
                    .await?;
            }
            Inbound::Command("help") => {
                self.transport
                    .send_message(chat_id, &replies::help(self.max_input_bytes), None)
                    .await?;
            }
            Inbound::Image {
                file_id,
                declared_size,
            } => {
                self.process_image(chat_id, owner_id, file_id, declared_size)
                    .await?;
            }
            Inbound::NotAnImage => {
                self.transport
                    .send_message(chat_id, replies::NOT_AN_IMAGE, None)
                    .await?;
            }
            Inbound::Command(_) | Inbound::Other => {
                self.transport.send_message(chat_id, replies::HINT, None).await?;
            }
        }
        Ok(())
    }

    async fn process_image(
        &self,
        chat_id: i64,
        owner_id: OwnerId,
        file_id: &str,
        declared_size: Option<u64>,
    ) -> Result<(), TelegramError> {
        if let Some(size) = declared_size {
            if size > self.max_input_bytes {
                info!(%owner_id, size, "rejecting oversized upload");
                self.transport
                    .send_message(chat_id, &replies::too_large(self.max_input_bytes), None)
                    .await?;
                return Ok(());
            }
        }

        info!(%owner_id, "processing image");
        let processing = match self
            .transport
            .send_message(chat_id, replies::PROCESSING, None)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%owner_id, error = %e, "could not send processing notice");
                None
            }
        };

        let outcome = self.remove_background(owner_id, file_id).await;

        if let Some(message_id) = processing {
            if let Err(e) = self.transport.delete_message(chat_id, message_id).await {
                debug!(%owner_id, error = %e, "could not delete processing notice");
            }
        }

        match outcome {
            Ok(()) => {
                self.transport
                    .send_message(chat_id, replies::READY, Some(&result_keyboard(owner_id)))
                    .await?;
            }
            Err(Failure::Rejected(e)) => {
                match e {
                    CutoutError::Superseded => debug!(%owner_id, "request superseded"),
                    _ => warn!(%owner_id, error = %e, kind = ?e.kind(), "image request failed"),
                }
                if let Some(text) = replies::for_error(&e, self.max_input_bytes) {
                    self.transport.send_message(chat_id, &text, None).await?;
                }
            }
            Err(Failure::Transport(e)) => return Err(e),
        }
        Ok(())
    }

    async fn remove_background(&self, owner_id: OwnerId, file_id: &str) -> Result<(), Failure> {
        let raw = self.transport.download(file_id, self.max_input_bytes).await?;
        let size = raw.len() as u64;
        if size > self.max_input_bytes {
            return Err(CutoutError::TooLarge {
                size,
                limit: self.max_input_bytes,
            }
            .into());
        }

        let ticket = self.service.submit(owner_id, raw)?;
        debug!(%owner_id, job_id = %ticket.job_id(), size, "job queued");
        ticket.await?;
        Ok(())
    }

    async fn handle_callback(&self, query: &CallbackQuery) -> Result<(), TelegramError> {
        let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
            debug!(data = ?query.data, "ignoring unknown callback");
            self.transport.answer_callback(&query.id, None).await?;
            return Ok(());
        };

        let owner_id = action.owner_id();
        let presser = OwnerId(query.from.id);
        if owner_id != presser {
            warn!(%owner_id, %presser, "callback for another user's result");
            self.transport
                .answer_callback(&query.id, Some(replies::EXPIRED))
                .await?;
            return Ok(());
        }

        if !self.service.has_result(owner_id) {
            self.transport
                .answer_callback(&query.id, Some(replies::EXPIRED))
                .await?;
            return Ok(());
        }

        let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);

        match action {
            CallbackAction::SendDocument(_) => {
                self.transport
                    .answer_callback(&query.id, Some(replies::PREPARING_DOCUMENT))
                    .await?;
                let png = match self.service.download(owner_id).await {
                    Ok(png) => png,
                    Err(e) => return self.reply_error(chat_id, owner_id, &e).await,
                };
                self.transport
                    .send_document(
                        chat_id,
                        png,
                        replies::DOCUMENT_FILE_NAME,
                        replies::DOCUMENT_CAPTION,
                    )
                    .await?;
                info!(%owner_id, "result delivered");

                if let Some(keyboard_message) = &query.message {
                    if let Err(e) = self
                        .transport
                        .delete_message(chat_id, keyboard_message.message_id)
                        .await
                    {
                        debug!(%owner_id, error = %e, "could not delete keyboard message");
                    }
                }
            }
            CallbackAction::SendPreview(_) => {
                self.transport
                    .answer_callback(&query.id, Some(replies::SENDING_PREVIEW))
                    .await?;
                let png = match self.service.preview(owner_id).await {
                    Ok(png) => png,
                    Err(e) => return self.reply_error(chat_id, owner_id, &e).await,
                };
                self.transport
                    .send_photo(
                        chat_id,
                        png,
                        replies::PREVIEW_FILE_NAME,
                        replies::PREVIEW_CAPTION,
                    )
                    .await?;
                self.transport
                    .send_message(
                        chat_id,
                        replies::GET_TRANSPARENT,
                        Some(&result_keyboard(owner_id)),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn reply_error(
        &self,
        chat_id: i64,
        owner_id: OwnerId,
        error: &CutoutError,
    ) -> Result<(), TelegramError> {
        warn!(%owner_id, error = %error, "could not produce result");
        if let Some(text) = replies::for_error(error, self.max_input_bytes) {
            self.transport.send_message(chat_id, &text, None).await?;
        }
        Ok(())
    }
}

/// Classify a message.
///
/// Photos use the largest available size. Documents must declare an
/// `image/*` MIME type.
fn inbound(message: &Message) -> Inbound<'_> {
    if let Some(text) = message.text.as_deref() {
        if let Some(name) = command(text) {
            return Inbound::Command(name);
        }
    }

    if let Some(largest) = message
        .photo
        .as_ref()
        .and_then(|sizes| sizes.iter().max_by_key(|p| p.width as u64 * p.height as u64))
    {
        return Inbound::Image {
            file_id: &largest.file_id,
            declared_size: largest.file_size,
        };
    }

    if let Some(document) = &message.document {
        let is_image = document
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"));
        if !is_image {
            return Inbound::NotAnImage;
        }
        return Inbound::Image {
            file_id: &document.file_id,
            declared_size: document.file_size,
        };
    }

    Inbound::Other
}

/// `/name`, `/name@bot` or `/name args` -> `name`.
fn command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    name.split('@').next().filter(|n| !n.is_empty())
}
