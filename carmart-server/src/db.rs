use anyhow::Context;
use async_trait::async_trait;
use carmart_api::{
    AuthToken, Comment, CommentId, CountryCode, CurrencyCode, Db, ImageId, Language, Listing,
    ListingId, ListingImage, ListingInfo, ListingStatus, NewComment, NewListingImage, Profile,
    Search, SetLocale, Time, UserId, UserSnapshot, Uuid,
};
use chrono::Utc;

use crate::query::{self, Bind};

macro_rules! car_columns {
    () => {
        "
            c.id, c.seller_id, c.title, c.make, c.model, c.year, c.mileage_km, c.price,
            c.currency, c.country, c.city, c.body_type, c.transmission, c.fuel_type,
            c.condition, c.color, c.description, c.status, c.is_featured, c.created_at
        "
    };
}

macro_rules! comment_select {
    () => {
        "
            SELECT cm.id, cm.car_id, cm.user_id, cm.parent_id, cm.content, cm.created_at,
                   p.full_name, p.email, p.phone_number
                FROM comments cm
            INNER JOIN profiles p
                ON p.id = cm.user_id
        "
    };
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: Option<String>,
    email: String,
    phone_number: Option<String>,
    country: Option<String>,
    language: Option<String>,
    is_admin: bool,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> anyhow::Result<Profile> {
        Ok(Profile {
            id: UserId(r.id),
            full_name: r.full_name,
            email: r.email,
            phone_number: r.phone_number,
            country: r
                .country
                .map(|c| CountryCode::new(&c))
                .transpose()
                .context("parsing the country field")?,
            language: r
                .language
                .map(|l| l.parse::<Language>())
                .transpose()
                .context("parsing the language field")?,
            is_admin: r.is_admin,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CarRow {
    id: i64,
    seller_id: Uuid,
    title: String,
    make: String,
    model: String,
    year: i32,
    mileage_km: i64,
    price: i64,
    currency: String,
    country: String,
    city: String,
    body_type: Option<String>,
    transmission: String,
    fuel_type: String,
    condition: String,
    color: Option<String>,
    description: String,
    status: String,
    is_featured: bool,
    created_at: Time,
}

impl TryFrom<CarRow> for Listing {
    type Error = anyhow::Error;

    fn try_from(r: CarRow) -> anyhow::Result<Listing> {
        let id = ListingId(r.id);
        Ok(Listing {
            id,
            seller_id: UserId(r.seller_id),
            info: ListingInfo {
                title: r.title,
                make: r.make,
                model: r.model,
                year: r.year,
                mileage_km: r.mileage_km,
                price: r.price,
                currency: CurrencyCode::new(&r.currency)
                    .with_context(|| format!("parsing the currency of listing {id:?}"))?,
                country: CountryCode::new(&r.country)
                    .with_context(|| format!("parsing the country of listing {id:?}"))?,
                city: r.city,
                body_type: r.body_type,
                transmission: r
                    .transmission
                    .parse()
                    .with_context(|| format!("parsing the transmission of listing {id:?}"))?,
                fuel_type: r
                    .fuel_type
                    .parse()
                    .with_context(|| format!("parsing the fuel type of listing {id:?}"))?,
                condition: r
                    .condition
                    .parse()
                    .with_context(|| format!("parsing the condition of listing {id:?}"))?,
                color: r.color,
                description: r.description,
            },
            status: r
                .status
                .parse()
                .with_context(|| format!("parsing the status of listing {id:?}"))?,
            is_featured: r.is_featured,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: i64,
    car_id: i64,
    url: String,
    storage_path: String,
    is_main: bool,
    created_at: Time,
}

impl From<ImageRow> for ListingImage {
    fn from(r: ImageRow) -> ListingImage {
        ListingImage {
            id: ImageId(r.id),
            car_id: ListingId(r.car_id),
            url: r.url,
            storage_path: r.storage_path,
            is_main: r.is_main,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    car_id: i64,
    user_id: Uuid,
    parent_id: Option<i64>,
    content: String,
    created_at: Time,
    full_name: Option<String>,
    email: String,
    phone_number: Option<String>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Comment {
        Comment {
            id: CommentId(r.id),
            car_id: ListingId(r.car_id),
            user_id: UserId(r.user_id),
            parent_id: r.parent_id.map(CommentId),
            content: r.content,
            created_at: r.created_at,
            user: UserSnapshot {
                id: UserId(r.user_id),
                full_name: r.full_name,
                email: Some(r.email),
                phone_number: r.phone_number,
            },
        }
    }
}

fn to_listings(rows: Vec<CarRow>) -> anyhow::Result<Vec<Listing>> {
    rows.into_iter().map(Listing::try_from).collect()
}

pub struct PgDb(sqlx::PgPool);

impl PgDb {
    pub fn new(pool: sqlx::PgPool) -> PgDb {
        PgDb(pool)
    }
}

#[async_trait]
impl Db for PgDb {
    async fn login(
        &self,
        email: &str,
        password: &str,
        device: &str,
    ) -> anyhow::Result<Option<AuthToken>> {
        let user = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, password_hash FROM profiles WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.0)
        .await
        .with_context(|| format!("fetching password hash for {email:?}"))?;
        let (user, hash) = match user {
            Some(u) => u,
            None => return Ok(None),
        };
        let password = String::from(password);
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .context("joining password verification task")?
            .with_context(|| format!("verifying password of user {user:?}"))?;
        if !matches {
            return Ok(None);
        }

        let token = Uuid::new_v4();
        let now = Utc::now();
        let res = sqlx::query(
            "INSERT INTO sessions (id, user_id, device, login_time, last_active) VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(token)
        .bind(user)
        .bind(device)
        .bind(now)
        .execute(&self.0)
        .await
        .with_context(|| format!("inserting session for user {user:?}"))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "insertion of session for user {user:?} affected {} rows",
            res.rows_affected()
        );
        tracing::info!(?user, %device, "user logged in");
        Ok(Some(AuthToken(token)))
    }

    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token.0)
            .execute(&self.0)
            .await
            .context("deleting session")?;
        Ok(res.rows_affected() == 1)
    }

    async fn recover_session(&self, token: AuthToken) -> anyhow::Result<Option<UserId>> {
        Ok(sqlx::query_as::<_, (Uuid,)>(
            "UPDATE sessions SET last_active = $1 WHERE id = $2 RETURNING user_id",
        )
        .bind(Utc::now())
        .bind(token.0)
        .fetch_optional(&self.0)
        .await
        .context("recovering session")?
        .map(|(u,)| UserId(u)))
    }

    async fn fetch_profile(&self, user: UserId) -> anyhow::Result<Option<Profile>> {
        sqlx::query_as::<_, ProfileRow>(
            "
                SELECT id, full_name, email, phone_number, country, language, is_admin
                    FROM profiles
                WHERE id = $1
            ",
        )
        .bind(user.0)
        .fetch_optional(&self.0)
        .await
        .with_context(|| format!("fetching profile of {user:?}"))?
        .map(Profile::try_from)
        .transpose()
    }

    async fn set_locale(&self, user: UserId, locale: &SetLocale) -> anyhow::Result<()> {
        let res = sqlx::query(
            "
                UPDATE profiles
                    SET country = COALESCE($2, country),
                        language = COALESCE($3, language)
                WHERE id = $1
            ",
        )
        .bind(user.0)
        .bind(locale.country.as_ref().map(|c| c.as_str()))
        .bind(locale.language.map(|l| l.as_str()))
        .execute(&self.0)
        .await
        .with_context(|| format!("setting locale of {user:?}"))?;
        anyhow::ensure!(res.rows_affected() == 1, "no user {user:?}");
        Ok(())
    }

    async fn search_listings(&self, search: &Search) -> anyhow::Result<Vec<Listing>> {
        let sql = query::to_postgres(&search.filter, 1);
        let q = format!(
            concat!("SELECT ", car_columns!(), " FROM cars c WHERE {} ORDER BY {}"),
            sql.where_clause,
            query::order_clause(&search.order),
        );
        let mut q = sqlx::query_as::<_, CarRow>(&q);
        for b in sql.binds {
            q = match b {
                Bind::Bool(b) => q.bind(b),
                Bind::I32(i) => q.bind(i),
                Bind::I64(i) => q.bind(i),
                Bind::String(s) => q.bind(s),
            };
        }
        let rows = q
            .fetch_all(&self.0)
            .await
            .with_context(|| format!("searching listings with {search:?}"))?;
        to_listings(rows)
    }

    async fn fetch_listing(&self, id: ListingId) -> anyhow::Result<Option<Listing>> {
        sqlx::query_as::<_, CarRow>(concat!(
            "SELECT ",
            car_columns!(),
            " FROM cars c WHERE c.id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.0)
        .await
        .with_context(|| format!("fetching listing {id:?}"))?
        .map(Listing::try_from)
        .transpose()
    }

    async fn insert_listing(
        &self,
        seller: UserId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing> {
        let row = sqlx::query_as::<_, CarRow>(concat!(
            "
                INSERT INTO cars AS c (
                    seller_id, title, make, model, year, mileage_km, price, currency, country,
                    city, body_type, transmission, fuel_type, condition, color, description,
                    status, is_featured, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
                RETURNING
            ",
            car_columns!()
        ))
        .bind(seller.0)
        .bind(&info.title)
        .bind(&info.make)
        .bind(&info.model)
        .bind(info.year)
        .bind(info.mileage_km)
        .bind(info.price)
        .bind(info.currency.as_str())
        .bind(info.country.as_str())
        .bind(&info.city)
        .bind(&info.body_type)
        .bind(info.transmission.as_str())
        .bind(info.fuel_type.as_str())
        .bind(info.condition.as_str())
        .bind(&info.color)
        .bind(&info.description)
        .bind(ListingStatus::Pending.as_str())
        .bind(is_featured)
        .bind(Utc::now())
        .fetch_one(&self.0)
        .await
        .with_context(|| format!("inserting listing for {seller:?}"))?;
        Listing::try_from(row)
    }

    async fn update_listing(
        &self,
        id: ListingId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing> {
        let row = sqlx::query_as::<_, CarRow>(concat!(
            "
                UPDATE cars AS c SET
                    title = $2, make = $3, model = $4, year = $5, mileage_km = $6, price = $7,
                    currency = $8, country = $9, city = $10, body_type = $11, transmission = $12,
                    fuel_type = $13, condition = $14, color = $15, description = $16,
                    is_featured = $17, status = $18
                WHERE c.id = $1
                RETURNING
            ",
            car_columns!()
        ))
        .bind(id.0)
        .bind(&info.title)
        .bind(&info.make)
        .bind(&info.model)
        .bind(info.year)
        .bind(info.mileage_km)
        .bind(info.price)
        .bind(info.currency.as_str())
        .bind(info.country.as_str())
        .bind(&info.city)
        .bind(&info.body_type)
        .bind(info.transmission.as_str())
        .bind(info.fuel_type.as_str())
        .bind(info.condition.as_str())
        .bind(&info.color)
        .bind(&info.description)
        .bind(is_featured)
        .bind(ListingStatus::Pending.as_str())
        .fetch_optional(&self.0)
        .await
        .with_context(|| format!("updating listing {id:?}"))?
        .with_context(|| format!("no listing {id:?}"))?;
        Listing::try_from(row)
    }

    async fn delete_listing(&self, id: ListingId) -> anyhow::Result<()> {
        // images, comments and favorites go with it through ON DELETE CASCADE
        sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(id.0)
            .execute(&self.0)
            .await
            .with_context(|| format!("deleting listing {id:?}"))?;
        Ok(())
    }

    async fn set_listing_status(
        &self,
        id: ListingId,
        status: ListingStatus,
    ) -> anyhow::Result<()> {
        let res = sqlx::query("UPDATE cars SET status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(status.as_str())
            .execute(&self.0)
            .await
            .with_context(|| format!("setting status of listing {id:?} to {status}"))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "status update of listing {id:?} affected {} rows",
            res.rows_affected()
        );
        Ok(())
    }

    async fn fetch_images(&self, car: ListingId) -> anyhow::Result<Vec<ListingImage>> {
        Ok(sqlx::query_as::<_, ImageRow>(
            "
                SELECT id, car_id, url, storage_path, is_main, created_at
                    FROM car_images
                WHERE car_id = $1
                ORDER BY id ASC
            ",
        )
        .bind(car.0)
        .fetch_all(&self.0)
        .await
        .with_context(|| format!("fetching images of listing {car:?}"))?
        .into_iter()
        .map(ListingImage::from)
        .collect())
    }

    async fn insert_image(&self, img: &NewListingImage) -> anyhow::Result<ListingImage> {
        let row = sqlx::query_as::<_, ImageRow>(
            "
                INSERT INTO car_images (car_id, url, storage_path, is_main, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, car_id, url, storage_path, is_main, created_at
            ",
        )
        .bind(img.car_id.0)
        .bind(&img.url)
        .bind(&img.storage_path)
        .bind(img.is_main)
        .bind(Utc::now())
        .fetch_one(&self.0)
        .await
        .with_context(|| format!("inserting image {:?}", img.storage_path))?;
        Ok(ListingImage::from(row))
    }

    async fn delete_image(&self, id: ImageId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM car_images WHERE id = $1")
            .bind(id.0)
            .execute(&self.0)
            .await
            .with_context(|| format!("deleting image {id:?}"))?;
        Ok(())
    }

    async fn set_main_image(&self, car: ListingId, id: ImageId) -> anyhow::Result<()> {
        let mut tx = self.0.begin().await.context("starting transaction")?;
        sqlx::query("UPDATE car_images SET is_main = false WHERE car_id = $1 AND is_main")
            .bind(car.0)
            .execute(&mut tx)
            .await
            .with_context(|| format!("clearing main image of listing {car:?}"))?;
        let res = sqlx::query("UPDATE car_images SET is_main = true WHERE car_id = $1 AND id = $2")
            .bind(car.0)
            .bind(id.0)
            .execute(&mut tx)
            .await
            .with_context(|| format!("setting main image of listing {car:?}"))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "image {id:?} is not part of listing {car:?}"
        );
        tx.commit().await.context("committing transaction")?;
        Ok(())
    }

    async fn fetch_comments(&self, car: ListingId) -> anyhow::Result<Vec<Comment>> {
        Ok(sqlx::query_as::<_, CommentRow>(concat!(
            comment_select!(),
            " WHERE cm.car_id = $1 ORDER BY cm.created_at DESC, cm.id DESC"
        ))
        .bind(car.0)
        .fetch_all(&self.0)
        .await
        .with_context(|| format!("fetching comments of listing {car:?}"))?
        .into_iter()
        .map(Comment::from)
        .collect())
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(
            sqlx::query_as::<_, CommentRow>(concat!(comment_select!(), " WHERE cm.id = $1"))
                .bind(id.0)
                .fetch_optional(&self.0)
                .await
                .with_context(|| format!("fetching comment {id:?}"))?
                .map(Comment::from),
        )
    }

    async fn insert_comment(&self, user: UserId, c: &NewComment) -> anyhow::Result<Comment> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            "
                INSERT INTO comments (car_id, user_id, parent_id, content, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
            ",
        )
        .bind(c.car_id.0)
        .bind(user.0)
        .bind(c.parent_id.map(|p| p.0))
        .bind(&c.content)
        .bind(Utc::now())
        .fetch_one(&self.0)
        .await
        .with_context(|| format!("inserting comment on listing {:?}", c.car_id))?;
        self.fetch_comment(CommentId(id))
            .await?
            .with_context(|| format!("comment {id} vanished right after insertion"))
    }

    async fn update_comment(&self, id: CommentId, content: &str) -> anyhow::Result<Comment> {
        let res = sqlx::query("UPDATE comments SET content = $2 WHERE id = $1")
            .bind(id.0)
            .bind(content)
            .execute(&self.0)
            .await
            .with_context(|| format!("updating comment {id:?}"))?;
        anyhow::ensure!(res.rows_affected() == 1, "no comment {id:?}");
        self.fetch_comment(id)
            .await?
            .with_context(|| format!("comment {id:?} vanished right after update"))
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()> {
        // replies go with it through ON DELETE CASCADE
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&self.0)
            .await
            .with_context(|| format!("deleting comment {id:?}"))?;
        Ok(())
    }

    async fn fetch_favorites(&self, user: UserId) -> anyhow::Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, CarRow>(concat!(
            "SELECT ",
            car_columns!(),
            "
                FROM favorites f
            INNER JOIN cars c
                ON c.id = f.car_id
            WHERE f.user_id = $1
                AND (c.status IN ('Approved', 'Sold') OR c.seller_id = $1)
            ORDER BY f.created_at DESC
            "
        ))
        .bind(user.0)
        .fetch_all(&self.0)
        .await
        .with_context(|| format!("fetching favorites of {user:?}"))?;
        to_listings(rows)
    }

    async fn add_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()> {
        sqlx::query(
            "
                INSERT INTO favorites (user_id, car_id, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
            ",
        )
        .bind(user.0)
        .bind(car.0)
        .bind(Utc::now())
        .execute(&self.0)
        .await
        .with_context(|| format!("adding listing {car:?} to the favorites of {user:?}"))?;
        Ok(())
    }

    async fn remove_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND car_id = $2")
            .bind(user.0)
            .bind(car.0)
            .execute(&self.0)
            .await
            .with_context(|| format!("removing listing {car:?} from the favorites of {user:?}"))?;
        Ok(())
    }
}
