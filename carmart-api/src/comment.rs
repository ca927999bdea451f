use crate::{Error, ListingId, Time, UserId, UserSnapshot, MAX_COMMENT_LEN};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// A comment row, as returned by the store with its author joined in
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub car_id: ListingId,
    pub user_id: UserId,

    /// None for top-level comments
    pub parent_id: Option<CommentId>,

    pub content: String,
    pub created_at: Time,

    pub user: UserSnapshot,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub car_id: ListingId,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

impl NewComment {
    /// Returns the comment with its content trimmed
    pub fn validate(self) -> Result<NewComment, Error> {
        Ok(NewComment {
            content: crate::validate_content(&self.content, MAX_COMMENT_LEN)?,
            ..self
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub content: String,
}

impl EditComment {
    pub fn validate(self) -> Result<EditComment, Error> {
        Ok(EditComment {
            content: crate::validate_content(&self.content, MAX_COMMENT_LEN)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum CommentEvent {
    Created(Comment),
    Updated(Comment),
    Deleted {
        car_id: ListingId,
        comment_id: CommentId,
    },
}

impl CommentEvent {
    pub fn car_id(&self) -> ListingId {
        match self {
            CommentEvent::Created(c) | CommentEvent::Updated(c) => c.car_id,
            CommentEvent::Deleted { car_id, .. } => *car_id,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    Comment(CommentEvent),
}
