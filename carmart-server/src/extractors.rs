use std::sync::Arc;

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use carmart_api::{AuthToken, Db, ObjectStorage, UserId, Uuid};
use carmart_client::{ConversionTable, LocaleResolver};

use crate::{CommentFeeds, Error, Geo};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: Arc<dyn Db>,
    pub storage: Arc<dyn ObjectStorage>,
    pub geo: Geo,
    pub feeds: CommentFeeds,
    pub admin_token: Option<AuthToken>,
    pub rates: Arc<ConversionTable>,
    pub locale: Arc<LocaleResolver>,
}

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::permission_denied()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::permission_denied())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::permission_denied())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::permission_denied());
                }
                let token = auth.next().ok_or(Error::permission_denied())?;
                if !auth.next().is_none() {
                    return Err(Error::permission_denied());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::permission_denied())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

async fn recover_user(state: &AppState, token: AuthToken) -> Result<UserId, Error> {
    state
        .db
        .recover_session(token)
        .await
        .context("recovering session")?
        .ok_or_else(Error::permission_denied)
}

async fn user_is_admin(state: &AppState, user: UserId) -> Result<bool, Error> {
    Ok(state
        .db
        .fetch_profile(user)
        .await
        .with_context(|| format!("fetching profile of {user:?}"))?
        .map_or(false, |p| p.is_admin))
}

pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        Ok(Auth(recover_user(state, token).await?))
    }
}

/// Whoever is making the request, possibly nobody.
///
/// Sending a token that is not valid is still an error.
pub struct Viewer {
    pub user: Option<UserId>,
    pub is_admin: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for Viewer {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<Viewer, Error> {
        if !req.headers.contains_key(http::header::AUTHORIZATION) {
            return Ok(Viewer {
                user: None,
                is_admin: false,
            });
        }
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            return Ok(Viewer {
                user: None,
                is_admin: true,
            });
        }
        let user = recover_user(state, token).await?;
        Ok(Viewer {
            user: Some(user),
            is_admin: user_is_admin(state, user).await?,
        })
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let viewer = Viewer::from_request_parts(req, state).await?;
        if viewer.is_admin {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}
