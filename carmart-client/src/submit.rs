use anyhow::Context;
use futures::{stream, StreamExt};

use crate::api::{
    self, Db, ImageId, ImageUpload, Listing, ListingId, ListingImage, ListingSubmission,
    MainPhoto, NewListingImage, ObjectStorage, Plan, Time, UserId, Uuid,
};

/// Maximum number of images being uploaded at the same time
const UPLOADS_IN_FLIGHT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] api::Error),

    #[error("failed uploading image {file_name:?}")]
    Upload {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A listing as stored after a successful submission
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Submitted {
    pub listing: Listing,
    pub images: Vec<ListingImage>,
}

/// Everything a failed submission already did, so that it can be undone
struct Rollback<'a> {
    db: &'a dyn Db,
    storage: &'a dyn ObjectStorage,
    car: ListingId,

    /// `None` if the listing was created by this submission
    previous: Option<&'a Listing>,

    uploaded: Vec<String>,
    images: Vec<ImageId>,
}

impl<'a> Rollback<'a> {
    /// Failures here are only logged, the original error is what matters to the caller
    async fn run(self) {
        for id in self.images {
            if let Err(err) = self.db.delete_image(id).await {
                tracing::error!(?err, ?id, "failed removing image row of failed submission");
            }
        }
        for path in self.uploaded {
            if let Err(err) = self.storage.delete(&path).await {
                tracing::error!(?err, %path, "failed removing object of failed submission");
            }
        }
        match self.previous {
            None => {
                if let Err(err) = self.db.delete_listing(self.car).await {
                    tracing::error!(?err, car = ?self.car, "failed removing listing of failed submission");
                }
            }
            Some(prev) => {
                let restored = async {
                    self.db
                        .update_listing(prev.id, &prev.info, prev.is_featured)
                        .await?;
                    self.db.set_listing_status(prev.id, prev.status).await
                };
                if let Err(err) = restored.await {
                    tracing::error!(?err, car = ?self.car, "failed restoring listing after failed edit");
                }
            }
        }
    }
}

/// Keeps object names to a conservative character set
fn sanitize_file_name(name: &str) -> String {
    let res = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(64)
        .collect::<String>();
    match res.trim_matches('.').is_empty() {
        true => String::from("image"),
        false => res,
    }
}

pub fn storage_path(car: ListingId, file_name: &str) -> String {
    format!(
        "listings/{}/{}-{}",
        car.0,
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

async fn upload_all(
    storage: &dyn ObjectStorage,
    car: ListingId,
    images: Vec<ImageUpload>,
) -> (Vec<String>, Option<SubmitError>) {
    let mut results = stream::iter(images.into_iter().enumerate())
        .map(|(idx, img)| async move {
            let path = storage_path(car, &img.file_name);
            let res = storage
                .upload(&path, &img.content_type, img.data)
                .await
                .with_context(|| format!("uploading {path:?}"));
            (idx, img.file_name, path, res)
        })
        .buffer_unordered(UPLOADS_IN_FLIGHT)
        .collect::<Vec<_>>()
        .await;
    results.sort_by_key(|(idx, ..)| *idx);

    let mut uploaded = Vec::with_capacity(results.len());
    let mut error = None;
    for (_, file_name, path, res) in results {
        match res {
            Ok(()) => uploaded.push(path),
            Err(source) => {
                tracing::warn!(?source, %file_name, "image upload failed");
                error.get_or_insert(SubmitError::Upload { file_name, source });
            }
        }
    }
    (uploaded, error)
}

/// Creates a listing, or updates `editing`, along with its images.
///
/// On failure, everything done so far is undone before returning the error.
/// Images marked for removal are only removed once everything else succeeded,
/// and failing to remove them does not fail the submission.
pub async fn submit_listing(
    db: &dyn Db,
    storage: &dyn ObjectStorage,
    seller: UserId,
    editing: Option<&Listing>,
    submission: ListingSubmission,
    now: Time,
) -> Result<Submitted, SubmitError> {
    let info = submission.info.clone().validate(now)?;
    if crate::locale::country(&info.country).is_none() {
        return Err(api::Error::UnsupportedCountry(info.country.to_string()).into());
    }
    let existing = match editing {
        None => Vec::new(),
        Some(l) => db
            .fetch_images(l.id)
            .await
            .with_context(|| format!("fetching images of listing {:?}", l.id))?,
    };
    submission.validate_images(&existing)?;
    let is_featured = submission.plan == Plan::Featured;

    let listing = match editing {
        None => db
            .insert_listing(seller, &info, is_featured)
            .await
            .context("inserting listing")?,
        Some(l) => db
            .update_listing(l.id, &info, is_featured)
            .await
            .with_context(|| format!("updating listing {:?}", l.id))?,
    };
    tracing::debug!(car = ?listing.id, new_images = submission.new_images.len(), "submitting listing");

    let mut rollback = Rollback {
        db,
        storage,
        car: listing.id,
        previous: editing,
        uploaded: Vec::new(),
        images: Vec::new(),
    };

    let (uploaded, error) = upload_all(storage, listing.id, submission.new_images).await;
    rollback.uploaded = uploaded;
    if let Some(e) = error {
        rollback.run().await;
        return Err(e);
    }

    let mut inserted = Vec::with_capacity(rollback.uploaded.len());
    for path in rollback.uploaded.clone() {
        let res = db
            .insert_image(&NewListingImage {
                car_id: listing.id,
                url: storage.public_url(&path),
                storage_path: path.clone(),
                is_main: false,
            })
            .await
            .with_context(|| format!("recording image {path:?}"));
        match res {
            Ok(img) => {
                rollback.images.push(img.id);
                inserted.push(img);
            }
            Err(e) => {
                rollback.run().await;
                return Err(e.into());
            }
        }
    }

    let main = match submission.main_photo {
        MainPhoto::New(idx) => inserted[idx].id,
        MainPhoto::Existing(id) => id,
    };
    if let Err(e) = db
        .set_main_image(listing.id, main)
        .await
        .with_context(|| format!("setting main image of {:?}", listing.id))
    {
        rollback.run().await;
        return Err(e.into());
    }

    let mut images = Vec::new();
    for img in existing.into_iter().chain(inserted) {
        if submission.remove_images.contains(&img.id) {
            if let Err(err) = db.delete_image(img.id).await {
                tracing::warn!(?err, id = ?img.id, "failed removing image row");
                continue;
            }
            if let Err(err) = storage.delete(&img.storage_path).await {
                tracing::warn!(?err, path = %img.storage_path, "failed removing image object");
            }
        } else {
            images.push(ListingImage {
                is_main: img.id == main,
                ..img
            });
        }
    }

    tracing::info!(car = ?listing.id, images = images.len(), "listing submitted");
    Ok(Submitted { listing, images })
}
