use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    http::{header::HeaderName, StatusCode},
    routing::{delete, get, get_service, post, put},
    Router,
};
use carmart_api::{AuthToken, GeoLocator, Uuid};
use carmart_client::{ConversionTable, LocaleResolver};
use structopt::StructOpt;
use tower_http::{services::ServeDir, trace::TraceLayer};

mod db;
mod error;
mod extractors;
mod feeds;
mod geo;
mod handlers;
mod query;
mod storage;


use db::PgDb;
use error::Error;
use extractors::AppState;
use feeds::CommentFeeds;
use geo::{Geo, HttpGeoLocator};
use storage::FsStorage;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(StructOpt)]
struct Opt {
    /// Postgres connection string
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    #[structopt(long, env = "CARMART_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Token granting admin rights, usable by carmart-ctl
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,

    /// Directory listing images get stored in
    #[structopt(long, env = "CARMART_STORAGE_DIR", default_value = "storage")]
    storage_dir: PathBuf,

    /// URL under which `storage_dir` is reachable from browsers
    #[structopt(
        long,
        env = "CARMART_PUBLIC_URL",
        default_value = "http://127.0.0.1:3000/storage"
    )]
    public_url: String,

    /// JSON exchange rate table, the built-in rates are used if unset
    #[structopt(long, env = "CARMART_RATES_FILE")]
    rates_file: Option<PathBuf>,

    /// Header a fronting proxy sets to the visitor's country, eg. `cf-ipcountry`
    #[structopt(long, env = "CARMART_GEOIP_HEADER")]
    geoip_header: Option<String>,

    /// Geolocation service answering a bare country code, with an `{ip}` placeholder
    #[structopt(long, env = "CARMART_GEOIP_URL")]
    geoip_url: Option<String>,

    /// Order in which the visitor's country is looked for
    #[structopt(
        long,
        env = "CARMART_COUNTRY_ORDER",
        default_value = "geolocation,profile,stored"
    )]
    country_order: String,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {:?}", db_url))
}

pub fn app(state: AppState) -> Router {
    use handlers::*;
    Router::new()
        .route("/api/auth", post(auth))
        .route("/api/unauth", post(unauth))
        .route("/api/whoami", get(whoami))
        .route("/api/locale", get(get_locale))
        .route("/api/profile/locale", put(set_locale))
        .route("/api/search-listings", post(search_listings))
        .route("/api/listings", post(create_listing))
        .route(
            "/api/listings/:id",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/api/listings/:id/status", post(set_listing_status))
        .route("/api/listings/:id/comments", get(fetch_comments))
        .route("/api/comments", post(create_comment))
        .route(
            "/api/comments/:id",
            put(update_comment).delete(delete_comment),
        )
        .route("/api/favorites", get(fetch_favorites))
        .route(
            "/api/favorites/:id",
            put(add_favorite).delete(remove_favorite),
        )
        .route("/api/admin/pending-listings", get(admin_pending_listings))
        .route(
            "/api/admin/listings/:id/status",
            post(admin_set_listing_status),
        )
        .route("/ws/comments/:id", get(comment_feed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn geo_from_opt(opt: &Opt) -> anyhow::Result<Geo> {
    let header = opt
        .geoip_header
        .as_deref()
        .map(HeaderName::try_from)
        .transpose()
        .context("parsing geolocation header name")?;
    let locator = match &opt.geoip_url {
        None => None,
        Some(url) => Some(Arc::new(HttpGeoLocator::new(url.clone())?) as Arc<dyn GeoLocator>),
    };
    Ok(Geo::new(header, locator))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let rates = match &opt.rates_file {
        Some(path) => ConversionTable::load(path)?,
        None => ConversionTable::default(),
    };
    let locale = LocaleResolver::parse_order(&opt.country_order)
        .context("parsing country resolution order")?;
    let geo = geo_from_opt(&opt)?;

    let pool = create_sqlx_pool(&opt.database_url).await?;
    MIGRATOR
        .run(&pool)
        .await
        .context("running pending migrations")?;

    tokio::fs::create_dir_all(&opt.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {:?}", opt.storage_dir))?;
    let storage = FsStorage::new(opt.storage_dir.clone(), opt.public_url.clone());

    let state = AppState {
        db: Arc::new(PgDb::new(pool)),
        storage: Arc::new(storage),
        geo,
        feeds: CommentFeeds::new(),
        admin_token: opt.admin_token.map(AuthToken),
        rates: Arc::new(rates),
        locale: Arc::new(locale),
    };

    let serve_storage = get_service(ServeDir::new(&opt.storage_dir)).handle_error(
        |err: std::io::Error| async move {
            tracing::error!(?err, "failed serving stored object");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed serving stored object")
        },
    );
    let app = app(state).nest_service("/storage", serve_storage);

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("serving axum webserver")
}
