use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Maximum length, in characters, of a comment
pub const MAX_COMMENT_LEN: usize = 2000;

/// Maximum length, in characters, of a listing description
pub const MAX_DESCRIPTION_LEN: usize = 5000;

/// Bounds on the number of images a listing carries
pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 10;

mod auth;
pub use auth::{AuthToken, NewSession};

mod comment;
pub use comment::{Comment, CommentEvent, CommentId, EditComment, FeedMessage, NewComment};

mod db;
pub use db::{Db, GeoLocator, ObjectStorage};

mod error;
pub use error::Error;

mod listing;
pub use listing::{
    Condition, FuelType, ImageId, ImageUpload, Listing, ListingDetails, ListingId, ListingImage,
    ListingInfo, ListingStatus, ListingSubmission, MainPhoto, NewListingImage, Plan, Transmission,
};

mod locale;
pub use locale::{CountryCode, CurrencyCode, Language, LocaleContext, SetLocale};

mod query;
pub use query::{ListingQuery, Order, OrderType, Search};

mod user;
pub use user::{Profile, UserId, UserSnapshot};

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Validates user-provided text content, returning it trimmed
pub fn validate_content(s: &str, max_len: usize) -> Result<String, Error> {
    validate_string(s)?;
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::EmptyContent);
    }
    if s.chars().count() > max_len {
        return Err(Error::ContentTooLong { max: max_len });
    }
    Ok(String::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(validate_content("  hello \n", 10), Ok(String::from("hello")));
        assert_eq!(validate_content("   ", 10), Err(Error::EmptyContent));
        assert_eq!(
            validate_content("abcdefghijk", 10),
            Err(Error::ContentTooLong { max: 10 })
        );
        // length is counted in characters, not bytes
        assert!(validate_content("مرحبا", 5).is_ok());
        assert_eq!(
            validate_content("a\0b", 10),
            Err(Error::NullByteInString(String::from("a\0b")))
        );
    }
}
