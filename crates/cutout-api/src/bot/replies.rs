//! User-facing message text (Telegram HTML).
//!
//! Error replies are chosen from [`ErrorKind`] only; internal error detail
//! goes to the log, never to the chat.

use cutout_types::error::{CutoutError, ErrorKind};

pub const DOCUMENT_FILE_NAME: &str = "background_removed_transparent.png";
pub const PREVIEW_FILE_NAME: &str = "preview.png";

pub const PROCESSING: &str = "🔄 <b>Processing your image...</b>\n\n\
    ⚡ Removing the background\n\
    🎨 Creating a transparent PNG\n\
    ⏱️ This usually takes a few seconds.";

pub const READY: &str = "✅ <b>Background removed!</b>\n\n\
    🎨 Your transparent PNG is ready.\n\
    📎 <b>Choose how to receive it:</b>";

pub const GET_TRANSPARENT: &str = "📎 <b>Get the transparent version:</b>";

pub const HINT: &str = "🖼️ <b>Send me an image to remove its background!</b>\n\n\
    📤 Send a photo or an image file\n\
    🎨 You'll get a transparent PNG back\n\n\
    💡 Use /help for more info";

pub const NOT_AN_IMAGE: &str = "📄 <b>Please send an image file</b>\n\n\
    Supported: JPG, PNG, WEBP, BMP, TIFF";

pub const DOCUMENT_CAPTION: &str = "✅ <b>Your transparent PNG is ready!</b>\n\n\
    💡 Transparency is preserved in this file.\n\
    🔄 Send another image anytime!";

pub const PREVIEW_CAPTION: &str = "🖼️ <b>Preview</b> (transparency may be lost)\n\n\
    📎 For the transparent PNG, use the Download button.";

pub const EXPIRED: &str = "❌ Image expired. Please send a new image.";
pub const PREPARING_DOCUMENT: &str = "📎 Preparing your transparent PNG...";
pub const SENDING_PREVIEW: &str = "🖼️ Sending preview...";
pub const SEND_FAILED: &str = "❌ Error sending file. Please try again.";
pub const GENERIC_FAILURE: &str = "❌ <b>Something went wrong</b>\n\nPlease try again.";

/// Greeting for `/start`.
pub fn start(full_name: &str) -> String {
    format!(
        "👋 Hello <b>{}</b>!\n\n\
         🤖 <b>Background Remover</b>\n\n\
         ✨ <b>What I do:</b>\n\
         • Remove image backgrounds\n\
         • Create transparent PNG files\n\
         • Keep the original resolution\n\n\
         📤 <b>Send me any image to get started!</b>\n\n\
         💡 <b>Tip:</b> Download as a document to keep transparency!",
        escape_html(full_name)
    )
}

/// Usage text for `/help`.
pub fn help(max_input_bytes: u64) -> String {
    format!(
        "🆘 <b>How to use:</b>\n\n\
         1️⃣ Send any image\n\
         2️⃣ Wait a few seconds\n\
         3️⃣ Download the transparent PNG\n\n\
         💡 <b>Tips:</b>\n\
         • Use 'Download' for transparency\n\
         • Max file size: {}\n\
         • Works with JPG, PNG, WEBP, BMP, TIFF",
        format_size(max_input_bytes)
    )
}

pub fn too_large(limit: u64) -> String {
    format!(
        "❌ <b>File too large</b>\n\n\
         Maximum size: {}\n\
         Please compress and try again.",
        format_size(limit)
    )
}

/// Reply for a failed request, or `None` when the user should not be told
/// anything (a newer request of theirs took over).
pub fn for_error(error: &CutoutError, max_input_bytes: u64) -> Option<String> {
    let text = match error.kind() {
        ErrorKind::Decode => "❌ <b>Could not read that image</b>\n\n\
            The file is corrupted or in an unsupported format.\n\
            Supported: JPG, PNG, WEBP, BMP, TIFF"
            .to_string(),
        ErrorKind::ResourceInit => "⚠️ <b>The background remover is starting up</b>\n\n\
            Please send your image again in a minute."
            .to_string(),
        ErrorKind::Segmentation => "❌ <b>Processing failed</b>\n\n\
            Please try again, or try a different image."
            .to_string(),
        ErrorKind::Busy => "⏳ <b>I'm busy right now</b>\n\n\
            Too many images are waiting. Please try again in a moment."
            .to_string(),
        ErrorKind::Timeout => "⏱️ <b>That took too long</b>\n\n\
            Please try again with a smaller image."
            .to_string(),
        ErrorKind::TooLarge => too_large(max_input_bytes),
        ErrorKind::Shutdown => "🔧 <b>Restarting</b>\n\n\
            Please send your image again shortly."
            .to_string(),
        ErrorKind::NotFound => EXPIRED.to_string(),
        ErrorKind::Superseded => return None,
    };
    Some(text)
}

fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= MIB {
        format!("{:.1}MB", bytes as f64 / MIB as f64)
    } else {
        format!("{}KB", bytes.div_ceil(1024))
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
