use std::{fmt, str::FromStr};

use chrono::Datelike;

use crate::{
    CountryCode, CurrencyCode, Error, Time, UserId, MAX_DESCRIPTION_LEN, MAX_IMAGES, MIN_IMAGES,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct ListingId(pub i64);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct ImageId(pub i64);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
    Sold,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 4] = [
        ListingStatus::Pending,
        ListingStatus::Approved,
        ListingStatus::Rejected,
        ListingStatus::Sold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Pending => "Pending",
            ListingStatus::Approved => "Approved",
            ListingStatus::Rejected => "Rejected",
            ListingStatus::Sold => "Sold",
        }
    }

    /// Moderation transitions, regardless of who performs them
    pub fn can_transition_to(self, to: ListingStatus) -> bool {
        use ListingStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Sold)
                | (Approved, Rejected)
                | (Rejected, Pending)
        )
    }

    /// Whether anyone may see a listing in this status, not only its seller and admins
    pub fn is_public(self) -> bool {
        matches!(self, ListingStatus::Approved | ListingStatus::Sold)
    }

    /// Whether the seller themselves may perform this transition
    pub fn seller_can_transition_to(self, to: ListingStatus) -> bool {
        self == ListingStatus::Approved && to == ListingStatus::Sold
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<ListingStatus, Error> {
        ListingStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidField {
                field: String::from("status"),
                reason: format!("unknown listing status {s:?}"),
            })
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Plan {
    Free,
    Featured,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Transmission {
    Automatic,
    Manual,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FuelType {
    Petrol,
    Diesel,
    Hybrid,
    Electric,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Condition {
    New,
    Used,
}

macro_rules! str_enum {
    ($typ:ident, $name:expr, $($variant:ident => $s:expr),*) => {
        impl $typ {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $typ::$variant => $s, )*
                }
            }
        }

        impl FromStr for $typ {
            type Err = Error;

            fn from_str(s: &str) -> Result<$typ, Error> {
                $(
                    if s.eq_ignore_ascii_case($s) {
                        return Ok($typ::$variant);
                    }
                )*
                Err(Error::InvalidField {
                    field: String::from($name),
                    reason: format!("unknown value {s:?}"),
                })
            }
        }
    };
}

str_enum!(Transmission, "transmission", Automatic => "automatic", Manual => "manual");
str_enum!(FuelType, "fuel_type", Petrol => "petrol", Diesel => "diesel", Hybrid => "hybrid", Electric => "electric");
str_enum!(Condition, "condition", New => "new", Used => "used");
str_enum!(Plan, "plan", Free => "free", Featured => "featured");

/// The seller-editable part of a listing
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListingInfo {
    pub title: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage_km: i64,

    /// Whole amount, in `currency`
    pub price: i64,
    pub currency: CurrencyCode,

    pub country: CountryCode,
    pub city: String,

    pub body_type: Option<String>,
    pub transmission: Transmission,
    pub fuel_type: FuelType,
    pub condition: Condition,
    pub color: Option<String>,
    pub description: String,
}

fn invalid(field: &str, reason: impl Into<String>) -> Error {
    Error::InvalidField {
        field: String::from(field),
        reason: reason.into(),
    }
}

fn required(field: &str, s: &str) -> Result<String, Error> {
    crate::validate_string(s)?;
    let s = s.trim();
    if s.is_empty() {
        return Err(invalid(field, "required"));
    }
    Ok(String::from(s))
}

fn optional(s: Option<String>) -> Result<Option<String>, Error> {
    match s {
        None => Ok(None),
        Some(s) => {
            crate::validate_string(&s)?;
            let s = s.trim();
            Ok((!s.is_empty()).then(|| String::from(s)))
        }
    }
}

impl ListingInfo {
    /// Returns the info with all its strings trimmed
    pub fn validate(self, now: Time) -> Result<ListingInfo, Error> {
        let max_year = now.year() + 1;
        if !(1900..=max_year).contains(&self.year) {
            return Err(invalid("year", format!("must be between 1900 and {max_year}")));
        }
        if self.price <= 0 {
            return Err(invalid("price", "must be positive"));
        }
        if self.mileage_km < 0 {
            return Err(invalid("mileage_km", "must not be negative"));
        }
        crate::validate_string(&self.description)?;
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::ContentTooLong {
                max: MAX_DESCRIPTION_LEN,
            });
        }
        Ok(ListingInfo {
            title: required("title", &self.title)?,
            make: required("make", &self.make)?,
            model: required("model", &self.model)?,
            city: required("city", &self.city)?,
            body_type: optional(self.body_type)?,
            color: optional(self.color)?,
            description: String::from(self.description.trim()),
            ..self
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,

    #[serde(flatten)]
    pub info: ListingInfo,

    pub status: ListingStatus,
    pub is_featured: bool,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListingImage {
    pub id: ImageId,
    pub car_id: ListingId,
    pub url: String,

    /// Path of the object in the object storage
    pub storage_path: String,

    pub is_main: bool,
    pub created_at: Time,
}

/// Metadata row for an image that was just uploaded
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewListingImage {
    pub car_id: ListingId,
    pub url: String,
    pub storage_path: String,
    pub is_main: bool,
}

#[derive(Clone, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,

    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::decode(s).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum MainPhoto {
    /// Index into `ListingSubmission::new_images`
    New(usize),
    Existing(ImageId),
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListingSubmission {
    pub plan: Plan,
    pub info: ListingInfo,
    pub new_images: Vec<ImageUpload>,

    /// Images of the listing being edited that should be deleted
    pub remove_images: Vec<ImageId>,

    pub main_photo: MainPhoto,
}

impl ListingSubmission {
    /// Checks the image set that would result from applying this submission
    /// on top of `existing`
    pub fn validate_images(&self, existing: &[ListingImage]) -> Result<(), Error> {
        for img in &self.new_images {
            crate::validate_string(&img.file_name)?;
            crate::validate_string(&img.content_type)?;
            if !img.content_type.starts_with("image/") {
                return Err(invalid(
                    "images",
                    format!("{:?} is not an image", img.file_name),
                ));
            }
            if img.data.is_empty() {
                return Err(invalid("images", format!("{:?} is empty", img.file_name)));
            }
        }
        for id in &self.remove_images {
            if !existing.iter().any(|i| i.id == *id) {
                return Err(invalid(
                    "images",
                    format!("image {id:?} is not part of this listing"),
                ));
            }
        }
        let kept = existing
            .iter()
            .filter(|i| !self.remove_images.contains(&i.id))
            .count();
        let count = kept + self.new_images.len();
        if !(MIN_IMAGES..=MAX_IMAGES).contains(&count) {
            return Err(invalid(
                "images",
                format!("a listing needs between {MIN_IMAGES} and {MAX_IMAGES} images, got {count}"),
            ));
        }
        let main_ok = match self.main_photo {
            MainPhoto::New(idx) => idx < self.new_images.len(),
            MainPhoto::Existing(id) => {
                existing.iter().any(|i| i.id == id) && !self.remove_images.contains(&id)
            }
        };
        if !main_ok {
            return Err(invalid("main_photo", "main photo is not one of the listing's images"));
        }
        Ok(())
    }
}

/// A listing as shown to one visitor, with price and date rendered for their locale
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ListingDetails {
    pub listing: Listing,
    pub images: Vec<ListingImage>,

    pub display_currency: CurrencyCode,
    pub display_amount: i64,
    pub display_price: String,
    pub display_date: String,
}
