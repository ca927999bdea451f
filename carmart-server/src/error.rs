use carmart_api::{CommentId, Error as ApiError, ListingId, ListingStatus};
use carmart_client::SubmitError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn listing_not_found(id: ListingId) -> Error {
        Error::Api(ApiError::ListingNotFound(id))
    }

    pub fn comment_not_found(id: CommentId) -> Error {
        Error::Api(ApiError::CommentNotFound(id))
    }

    pub fn invalid_parent(id: CommentId) -> Error {
        Error::Api(ApiError::InvalidParent(id))
    }

    pub fn invalid_transition(from: ListingStatus, to: ListingStatus) -> Error {
        Error::Api(ApiError::InvalidStatusTransition { from, to })
    }
}

impl From<SubmitError> for Error {
    fn from(e: SubmitError) -> Error {
        match e {
            SubmitError::Invalid(e) => Error::Api(e),
            SubmitError::Upload { file_name, source } => {
                tracing::error!(?source, %file_name, "image upload failed");
                Error::Api(ApiError::UploadFailed(format!("uploading {file_name:?}")))
            }
            SubmitError::Store(e) => Error::Anyhow(e),
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            Error::Anyhow(err) => {
                tracing::error!(?err, "internal server error");
                #[cfg(not(test))]
                let err =
                    ApiError::Unknown(String::from("Internal server error, see logs for details"));
                #[cfg(test)]
                let err = ApiError::Unknown(format!("Internal server error: {err:?}"));
                err
            }
            Error::Api(err) => {
                tracing::info!("returning error to client: {err}");
                err
            }
        };
        (
            err.status_code(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            err.contents(),
        )
            .into_response()
    }
}
