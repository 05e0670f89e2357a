//! Notification decoders.

mod json;
pub use self::json::JsonNotificationDecoder;
