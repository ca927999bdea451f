use anyhow::{anyhow, Context};
use serde_json::json;

use crate::{CommentId, ListingId, ListingStatus};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Content is empty")]
    EmptyContent,

    #[error("Content is longer than {max} characters")]
    ContentTooLong { max: usize },

    #[error("Listing not found {0:?}")]
    ListingNotFound(ListingId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Comment {0:?} cannot be replied to from this listing")]
    InvalidParent(CommentId),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Listing cannot go from {from} to {to}")]
    InvalidStatusTransition {
        from: ListingStatus,
        to: ListingStatus,
    },

    #[error("Unknown currency {0:?}")]
    UnknownCurrency(String),

    #[error("Unsupported country {0:?}")]
    UnsupportedCountry(String),

    #[error("Image upload failed: {0}")]
    UploadFailed(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::ContentTooLong { .. } => StatusCode::BAD_REQUEST,
            Error::ListingNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidParent(_) => StatusCode::BAD_REQUEST,
            Error::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            Error::UnknownCurrency(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedCountry(_) => StatusCode::BAD_REQUEST,
            Error::UploadFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::EmptyContent => json!({
                "message": "content is empty",
                "type": "empty-content",
            }),
            Error::ContentTooLong { max } => json!({
                "message": "content is too long",
                "type": "content-too-long",
                "max": max,
            }),
            Error::ListingNotFound(id) => json!({
                "message": "listing not found",
                "type": "listing-not-found",
                "id": id,
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id,
            }),
            Error::InvalidParent(id) => json!({
                "message": "parent comment is not on this listing",
                "type": "invalid-parent",
                "id": id,
            }),
            Error::InvalidField { field, reason } => json!({
                "message": reason,
                "type": "invalid-field",
                "field": field,
            }),
            Error::InvalidStatusTransition { from, to } => json!({
                "message": "invalid listing status transition",
                "type": "invalid-status-transition",
                "from": from,
                "to": to,
            }),
            Error::UnknownCurrency(c) => json!({
                "message": "unknown currency",
                "type": "unknown-currency",
                "currency": c,
            }),
            Error::UnsupportedCountry(c) => json!({
                "message": "unsupported country",
                "type": "unsupported-country",
                "country": c,
            }),
            Error::UploadFailed(msg) => json!({
                "message": msg,
                "type": "upload-failed",
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        macro_rules! field {
            ($name:expr, $typ:ty) => {
                serde_json::from_value::<$typ>(
                    data.get($name)
                        .cloned()
                        .ok_or_else(|| anyhow!("error is missing field {}", $name))?,
                )
                .with_context(|| format!("parsing error field {}", $name))?
            };
        }
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "permission-denied" => Error::PermissionDenied,
                "null-byte" => Error::NullByteInString(field!("string", String)),
                "empty-content" => Error::EmptyContent,
                "content-too-long" => Error::ContentTooLong {
                    max: field!("max", usize),
                },
                "listing-not-found" => Error::ListingNotFound(field!("id", ListingId)),
                "comment-not-found" => Error::CommentNotFound(field!("id", CommentId)),
                "invalid-parent" => Error::InvalidParent(field!("id", CommentId)),
                "invalid-field" => Error::InvalidField {
                    field: field!("field", String),
                    reason: field!("message", String),
                },
                "invalid-status-transition" => Error::InvalidStatusTransition {
                    from: field!("from", ListingStatus),
                    to: field!("to", ListingStatus),
                },
                "unknown-currency" => Error::UnknownCurrency(field!("currency", String)),
                "unsupported-country" => Error::UnsupportedCountry(field!("country", String)),
                "upload-failed" => Error::UploadFailed(field!("message", String)),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_roundtrip_through_json() {
        let errors = vec![
            Error::Unknown(String::from("oops")),
            Error::PermissionDenied,
            Error::NullByteInString(String::from("a\0")),
            Error::EmptyContent,
            Error::ContentTooLong { max: 2000 },
            Error::ListingNotFound(ListingId(4)),
            Error::CommentNotFound(CommentId(8)),
            Error::InvalidParent(CommentId(15)),
            Error::InvalidField {
                field: String::from("year"),
                reason: String::from("too old"),
            },
            Error::InvalidStatusTransition {
                from: ListingStatus::Sold,
                to: ListingStatus::Pending,
            },
            Error::UnknownCurrency(String::from("XYZ")),
            Error::UnsupportedCountry(String::from("FR")),
            Error::UploadFailed(String::from("storage unreachable")),
        ];
        for e in errors {
            assert_eq!(Error::parse(&e.contents()).unwrap(), e);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Error::parse(br#"{"type": "nope"}"#).is_err());
        assert!(Error::parse(b"not json").is_err());
    }
}
