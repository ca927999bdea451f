use std::net::IpAddr;

use async_trait::async_trait;

use crate::{
    AuthToken, Comment, CommentId, CountryCode, ImageId, Listing, ListingId, ListingImage,
    ListingInfo, ListingStatus, NewComment, NewListingImage, Profile, Search, SetLocale, UserId,
};

/// The relational store behind the marketplace
#[async_trait]
pub trait Db: Send + Sync {
    async fn login(
        &self,
        email: &str,
        password: &str,
        device: &str,
    ) -> anyhow::Result<Option<AuthToken>>;
    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool>;
    async fn recover_session(&self, token: AuthToken) -> anyhow::Result<Option<UserId>>;
    async fn fetch_profile(&self, user: UserId) -> anyhow::Result<Option<Profile>>;
    async fn set_locale(&self, user: UserId, locale: &SetLocale) -> anyhow::Result<()>;

    async fn search_listings(&self, search: &Search) -> anyhow::Result<Vec<Listing>>;
    async fn fetch_listing(&self, id: ListingId) -> anyhow::Result<Option<Listing>>;
    /// New listings always start out as `Pending`
    async fn insert_listing(
        &self,
        seller: UserId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing>;
    /// Editing a listing sends it back to moderation
    async fn update_listing(
        &self,
        id: ListingId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing>;
    async fn delete_listing(&self, id: ListingId) -> anyhow::Result<()>;
    async fn set_listing_status(&self, id: ListingId, status: ListingStatus)
        -> anyhow::Result<()>;

    async fn fetch_images(&self, car: ListingId) -> anyhow::Result<Vec<ListingImage>>;
    async fn insert_image(&self, img: &NewListingImage) -> anyhow::Result<ListingImage>;
    async fn delete_image(&self, id: ImageId) -> anyhow::Result<()>;
    /// Flags `id` as the main photo of `car`, unflagging all others
    async fn set_main_image(&self, car: ListingId, id: ImageId) -> anyhow::Result<()>;

    /// Comments of a listing, newest first, with their author joined in
    async fn fetch_comments(&self, car: ListingId) -> anyhow::Result<Vec<Comment>>;
    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;
    async fn insert_comment(&self, user: UserId, c: &NewComment) -> anyhow::Result<Comment>;
    async fn update_comment(&self, id: CommentId, content: &str) -> anyhow::Result<Comment>;
    /// Also deletes the replies of the comment
    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()>;

    async fn fetch_favorites(&self, user: UserId) -> anyhow::Result<Vec<Listing>>;
    async fn add_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()>;
    async fn remove_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()>;
}

/// Where listing images end up
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, content_type: &str, data: Vec<u8>) -> anyhow::Result<()>;
    fn public_url(&self, path: &str) -> String;
    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> anyhow::Result<Option<CountryCode>>;
}
