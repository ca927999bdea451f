use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use axum::{
    extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    Json,
};
use carmart_api::{
    AuthToken, Comment, CommentEvent, CommentId, CountryCode, CurrencyCode, EditComment,
    Error as ApiError, Language, Listing, ListingDetails, ListingId, ListingStatus,
    ListingSubmission, LocaleContext, NewComment, NewSession, Profile, Search, SetLocale,
};
use carmart_client::{
    build_tree,
    currency::{format_date, format_price},
    locale, search, submit_listing, CommentWithReplies, LocaleInputs, Submitted,
};
use chrono::Utc;
use futures::StreamExt;

use crate::{extractors::*, Error};

pub const PREFERRED_COUNTRY_HEADER: &str = "x-preferred-country";
pub const PREFERRED_LANGUAGE_HEADER: &str = "x-preferred-language";

pub async fn auth(
    State(state): State<AppState>,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(
        state
            .db
            .login(&data.email, &data.password, &data.device)
            .await
            .context("logging user in")?
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, State(state): State<AppState>) -> Result<(), Error> {
    match state.db.logout(user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth, State(state): State<AppState>) -> Result<Json<Profile>, Error> {
    Ok(Json(
        state
            .db
            .fetch_profile(user)
            .await
            .with_context(|| format!("fetching profile of {user:?}"))?
            .with_context(|| format!("session points to missing user {user:?}"))?,
    ))
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct DisplayParams {
    pub currency: Option<String>,
}

fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn locale_for(
    state: &AppState,
    viewer: &Viewer,
    headers: &HeaderMap,
    ip: Option<IpAddr>,
    params: &DisplayParams,
) -> Result<LocaleContext, Error> {
    let display_currency = match &params.currency {
        None => None,
        Some(c) => {
            let c = CurrencyCode::new(c)?;
            if !state.rates.supports(&c) {
                return Err(Error::Api(ApiError::UnknownCurrency(c.to_string())));
            }
            Some(c)
        }
    };
    let profile = match viewer.user {
        None => None,
        Some(user) => state
            .db
            .fetch_profile(user)
            .await
            .with_context(|| format!("fetching profile of {user:?}"))?,
    };
    let inputs = LocaleInputs {
        geolocated: state.geo.locate(headers, ip).await,
        profile_country: profile.as_ref().and_then(|p| p.country.clone()),
        stored_country: header::<CountryCode>(headers, PREFERRED_COUNTRY_HEADER),
        profile_language: profile.as_ref().and_then(|p| p.language),
        stored_language: header::<Language>(headers, PREFERRED_LANGUAGE_HEADER),
        display_currency,
    };
    Ok(state.locale.resolve(&inputs))
}

pub async fn get_locale(
    viewer: Viewer,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(params): Query<DisplayParams>,
) -> Result<Json<LocaleContext>, Error> {
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    Ok(Json(locale_for(&state, &viewer, &headers, ip, &params).await?))
}

pub async fn set_locale(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(data): Json<SetLocale>,
) -> Result<(), Error> {
    if let Some(c) = &data.country {
        if locale::country(c).is_none() {
            return Err(Error::Api(ApiError::UnsupportedCountry(c.to_string())));
        }
    }
    state
        .db
        .set_locale(user, &data)
        .await
        .with_context(|| format!("setting locale of {user:?}"))?;
    Ok(())
}

pub async fn search_listings(
    viewer: Viewer,
    State(state): State<AppState>,
    Json(mut search): Json<Search>,
) -> Result<Json<Vec<Listing>>, Error> {
    search.filter.validate()?;
    if !viewer.is_admin {
        search.filter = search.filter.publicly_visible();
    }
    Ok(Json(
        state
            .db
            .search_listings(&search)
            .await
            .with_context(|| format!("searching listings for {:?}", viewer.user))?,
    ))
}

/// Fetches a listing, hiding it from those who should not know it exists
async fn visible_listing(
    state: &AppState,
    viewer: &Viewer,
    id: ListingId,
) -> Result<Listing, Error> {
    let listing = state
        .db
        .fetch_listing(id)
        .await
        .with_context(|| format!("fetching listing {id:?}"))?
        .ok_or(Error::listing_not_found(id))?;
    if listing.status.is_public() || viewer.is_admin || viewer.user == Some(listing.seller_id) {
        Ok(listing)
    } else {
        Err(Error::listing_not_found(id))
    }
}

pub async fn get_listing(
    viewer: Viewer,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(params): Query<DisplayParams>,
) -> Result<Json<ListingDetails>, Error> {
    let listing = visible_listing(&state, &viewer, id).await?;
    let images = state
        .db
        .fetch_images(id)
        .await
        .with_context(|| format!("fetching images of listing {id:?}"))?;
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let ctx = locale_for(&state, &viewer, &headers, ip, &params).await?;
    let display_amount =
        state
            .rates
            .convert(listing.info.price, &listing.info.currency, &ctx.currency)?;
    let country = locale::country(&ctx.country).unwrap_or_else(locale::default_country);
    Ok(Json(ListingDetails {
        display_price: format_price(display_amount, &ctx.currency, ctx.language),
        display_date: format_date(listing.created_at, country, ctx.language),
        display_currency: ctx.currency,
        display_amount,
        images,
        listing,
    }))
}

fn check_currency(state: &AppState, sub: &ListingSubmission) -> Result<(), Error> {
    if state.rates.supports(&sub.info.currency) {
        Ok(())
    } else {
        Err(Error::Api(ApiError::UnknownCurrency(
            sub.info.currency.to_string(),
        )))
    }
}

pub async fn create_listing(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(sub): Json<ListingSubmission>,
) -> Result<Json<Submitted>, Error> {
    check_currency(&state, &sub)?;
    let res = submit_listing(&*state.db, &*state.storage, user, None, sub, Utc::now()).await?;
    tracing::info!(?user, listing = ?res.listing.id, "listing created");
    Ok(Json(res))
}

pub async fn update_listing(
    Auth(user): Auth,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
    Json(sub): Json<ListingSubmission>,
) -> Result<Json<Submitted>, Error> {
    let listing = state
        .db
        .fetch_listing(id)
        .await
        .with_context(|| format!("fetching listing {id:?}"))?
        .ok_or(Error::listing_not_found(id))?;
    if listing.seller_id != user {
        return Err(Error::permission_denied());
    }
    if listing.status == ListingStatus::Sold {
        return Err(Error::invalid_transition(
            ListingStatus::Sold,
            ListingStatus::Pending,
        ));
    }
    check_currency(&state, &sub)?;
    let res = submit_listing(
        &*state.db,
        &*state.storage,
        user,
        Some(&listing),
        sub,
        Utc::now(),
    )
    .await?;
    tracing::info!(?user, listing = ?id, "listing updated");
    Ok(Json(res))
}

pub async fn delete_listing(
    viewer: Viewer,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
) -> Result<(), Error> {
    let listing = visible_listing(&state, &viewer, id).await?;
    if !viewer.is_admin && viewer.user != Some(listing.seller_id) {
        return Err(Error::permission_denied());
    }
    let images = state
        .db
        .fetch_images(id)
        .await
        .with_context(|| format!("fetching images of listing {id:?}"))?;
    state
        .db
        .delete_listing(id)
        .await
        .with_context(|| format!("deleting listing {id:?}"))?;
    for img in images {
        if let Err(err) = state.storage.delete(&img.storage_path).await {
            tracing::warn!(?err, path = %img.storage_path, "failed removing image of deleted listing");
        }
    }
    tracing::info!(user = ?viewer.user, listing = ?id, "listing deleted");
    Ok(())
}

async fn change_status(
    state: &AppState,
    viewer: &Viewer,
    id: ListingId,
    to: ListingStatus,
) -> Result<(), Error> {
    let listing = visible_listing(state, viewer, id).await?;
    let from = listing.status;
    let is_seller = viewer.user == Some(listing.seller_id);
    if !viewer.is_admin && !is_seller {
        return Err(Error::permission_denied());
    }
    if !from.can_transition_to(to) {
        return Err(Error::invalid_transition(from, to));
    }
    if !viewer.is_admin && !from.seller_can_transition_to(to) {
        return Err(Error::permission_denied());
    }
    state
        .db
        .set_listing_status(id, to)
        .await
        .with_context(|| format!("moving listing {id:?} from {from} to {to}"))?;
    tracing::info!(user = ?viewer.user, listing = ?id, %from, %to, "listing status changed");
    if !to.is_public() {
        state.feeds.close_listing(id).await;
    }
    Ok(())
}

pub async fn set_listing_status(
    viewer: Viewer,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
    Json(to): Json<ListingStatus>,
) -> Result<(), Error> {
    change_status(&state, &viewer, id, to).await
}

pub async fn admin_set_listing_status(
    AdminAuth: AdminAuth,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
    Json(to): Json<ListingStatus>,
) -> Result<(), Error> {
    let viewer = Viewer {
        user: None,
        is_admin: true,
    };
    change_status(&state, &viewer, id, to).await
}

pub async fn admin_pending_listings(
    AdminAuth: AdminAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Listing>>, Error> {
    Ok(Json(
        state
            .db
            .search_listings(&search::pending())
            .await
            .context("fetching the moderation queue")?,
    ))
}

pub async fn fetch_comments(
    viewer: Viewer,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CommentWithReplies>>, Error> {
    visible_listing(&state, &viewer, id).await?;
    let comments = state
        .db
        .fetch_comments(id)
        .await
        .with_context(|| format!("fetching comments of listing {id:?}"))?;
    Ok(Json(build_tree(comments)))
}

pub async fn create_comment(
    viewer: Viewer,
    State(state): State<AppState>,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    let user = viewer.user.ok_or(Error::permission_denied())?;
    let mut data = data.validate()?;
    visible_listing(&state, &viewer, data.car_id).await?;
    if let Some(parent_id) = data.parent_id {
        let parent = state
            .db
            .fetch_comment(parent_id)
            .await
            .with_context(|| format!("fetching parent comment {parent_id:?}"))?
            .ok_or(Error::invalid_parent(parent_id))?;
        if parent.car_id != data.car_id {
            return Err(Error::invalid_parent(parent_id));
        }
        // replies to replies get filed under the thread they belong to
        if let Some(top) = parent.parent_id {
            tracing::debug!(?parent_id, ?top, "re-parenting reply onto top-level comment");
            data.parent_id = Some(top);
        }
    }
    let comment = state
        .db
        .insert_comment(user, &data)
        .await
        .with_context(|| format!("inserting comment of {user:?}"))?;
    state
        .feeds
        .relay(CommentEvent::Created(comment.clone()))
        .await;
    Ok(Json(comment))
}

async fn fetch_comment(state: &AppState, id: CommentId) -> Result<Comment, Error> {
    state
        .db
        .fetch_comment(id)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?
        .ok_or(Error::comment_not_found(id))
}

pub async fn update_comment(
    Auth(user): Auth,
    Path(id): Path<CommentId>,
    State(state): State<AppState>,
    Json(data): Json<EditComment>,
) -> Result<Json<Comment>, Error> {
    let data = data.validate()?;
    let comment = fetch_comment(&state, id).await?;
    if comment.user_id != user {
        return Err(Error::permission_denied());
    }
    let viewer = Viewer {
        user: Some(user),
        is_admin: false,
    };
    visible_listing(&state, &viewer, comment.car_id).await?;
    let comment = state
        .db
        .update_comment(id, &data.content)
        .await
        .with_context(|| format!("updating comment {id:?}"))?;
    state
        .feeds
        .relay(CommentEvent::Updated(comment.clone()))
        .await;
    Ok(Json(comment))
}

pub async fn delete_comment(
    viewer: Viewer,
    Path(id): Path<CommentId>,
    State(state): State<AppState>,
) -> Result<(), Error> {
    let comment = fetch_comment(&state, id).await?;
    if !viewer.is_admin && viewer.user != Some(comment.user_id) {
        return Err(Error::permission_denied());
    }
    state
        .db
        .delete_comment(id)
        .await
        .with_context(|| format!("deleting comment {id:?}"))?;
    state
        .feeds
        .relay(CommentEvent::Deleted {
            car_id: comment.car_id,
            comment_id: id,
        })
        .await;
    Ok(())
}

pub async fn fetch_favorites(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Listing>>, Error> {
    Ok(Json(
        state
            .db
            .fetch_favorites(user)
            .await
            .with_context(|| format!("fetching favorites of {user:?}"))?,
    ))
}

pub async fn add_favorite(
    Auth(user): Auth,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
) -> Result<(), Error> {
    let viewer = Viewer {
        user: Some(user),
        is_admin: false,
    };
    visible_listing(&state, &viewer, id).await?;
    state
        .db
        .add_favorite(user, id)
        .await
        .with_context(|| format!("adding listing {id:?} to the favorites of {user:?}"))?;
    Ok(())
}

pub async fn remove_favorite(
    Auth(user): Auth,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
) -> Result<(), Error> {
    state
        .db
        .remove_favorite(user, id)
        .await
        .with_context(|| format!("removing listing {id:?} from the favorites of {user:?}"))?;
    Ok(())
}

pub async fn comment_feed(
    ws: WebSocketUpgrade,
    viewer: Viewer,
    Path(id): Path<ListingId>,
    State(state): State<AppState>,
) -> Result<axum::response::Response, Error> {
    visible_listing(&state, &viewer, id).await?;
    let watchers = state.feeds.num_watchers(id).await;
    tracing::debug!(
        listing = ?id,
        watchers = watchers,
        "comment feed websocket connected"
    );
    let feeds = state.feeds.clone();
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        feeds.add_for_listing(id, write, read)
    }))
}
