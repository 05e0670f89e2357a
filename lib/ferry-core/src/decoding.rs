//! Decoding raw notifications into domain input.
use snafu::Snafu;

use crate::model::ArtifactNotification;

/// A decoding error.
///
/// Decoding errors are fatal to a single notification only.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum DecodingError {
    /// The notification is not a well-formed document.
    #[snafu(display("Malformed notification: {}", reason))]
    Malformed {
        /// Description of the problem.
        reason: String,
    },

    /// A required field was missing or blank.
    #[snafu(display("Notification is missing required field '{}'.", field))]
    MissingField {
        /// Path of the missing field.
        field: String,
    },

    /// No artifact in the notification is of interest.
    #[snafu(display("Notification for distribution '{}' contains no artifacts of interest.", distribution_id))]
    NoMatchingArtifacts {
        /// Distribution the notification belongs to.
        distribution_id: String,
    },
}

/// Decodes raw notification payloads.
pub trait NotificationDecoder: Send + Sync {
    /// Decodes a raw payload into a notification.
    ///
    /// # Errors
    ///
    /// If the payload cannot be decoded, or contains nothing to forward, an error is returned.
    fn decode(&self, raw: &[u8]) -> Result<ArtifactNotification, DecodingError>;
}
