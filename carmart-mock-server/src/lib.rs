use std::{
    collections::{BTreeMap, HashMap},
    net::IpAddr,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use carmart_api::{
    AuthToken, Comment, CommentId, Condition, CountryCode, CurrencyCode, Db, FuelType, GeoLocator,
    ImageId, Listing, ListingId, ListingImage, ListingInfo, ListingStatus, NewComment,
    NewListingImage, ObjectStorage, Profile, Search, SetLocale, Time, Transmission, UserId, Uuid,
};

/// An in-memory marketplace, standing in for the database, the object
/// storage and the geolocation service
pub struct MockServer(Mutex<State>);

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, DbUser>,
    sessions: HashMap<AuthToken, (UserId, Device)>,
    listings: BTreeMap<ListingId, Listing>,
    images: BTreeMap<ImageId, ListingImage>,
    comments: BTreeMap<CommentId, Comment>,
    // most recent last
    favorites: Vec<(UserId, ListingId)>,
    objects: BTreeMap<String, Object>,
    geolocation: HashMap<IpAddr, CountryCode>,

    last_id: i64,
    last_time: Option<Time>,

    failing_uploads: Vec<String>,
    image_inserts_before_failure: Option<usize>,
}

#[derive(Debug)]
struct DbUser {
    profile: Profile,
    pass: String,
}

#[derive(Debug)]
struct Device(String);

#[derive(Clone, Debug)]
struct Object {
    content_type: String,
    data: Vec<u8>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Strictly increasing, so that insertion order is also chronological order
    fn now(&mut self) -> Time {
        let now = chrono::Utc::now();
        let now = match self.last_time {
            Some(last) if last >= now => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_time = Some(now);
        now
    }

    fn listing_mut(&mut self, id: ListingId) -> anyhow::Result<&mut Listing> {
        self.listings
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no listing {id:?}"))
    }

    fn with_author(&self, mut c: Comment) -> Comment {
        if let Some(u) = self.users.get(&c.user_id) {
            c.user = u.profile.snapshot();
        }
        c
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(State::default()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().expect("mock server mutex poisoned")
    }

    /// A valid listing for tests, in the default country
    pub fn test_listing_info(make: &str, price: i64) -> ListingInfo {
        ListingInfo {
            title: format!("{make} in great shape"),
            make: String::from(make),
            model: String::from("Model"),
            year: 2020,
            mileage_km: 42_000,
            price,
            currency: CurrencyCode::new("AED").expect("valid currency"),
            country: CountryCode::new("AE").expect("valid country"),
            city: String::from("Dubai"),
            body_type: None,
            transmission: Transmission::Automatic,
            fuel_type: FuelType::Petrol,
            condition: Condition::Used,
            color: None,
            description: String::from("Full service history"),
        }
    }

    pub fn test_add_user(&self, email: &str, password: &str, is_admin: bool) -> UserId {
        let id = UserId(Uuid::new_v4());
        let name = email.split('@').next().map(String::from);
        self.state().users.insert(
            id,
            DbUser {
                profile: Profile {
                    id,
                    full_name: name,
                    email: String::from(email),
                    phone_number: None,
                    country: None,
                    language: None,
                    is_admin,
                },
                pass: String::from(password),
            },
        );
        id
    }

    /// Opens a session directly, without going through `login`
    pub fn test_session(&self, user: UserId) -> AuthToken {
        let tok = AuthToken(Uuid::new_v4());
        self.state()
            .sessions
            .insert(tok, (user, Device(String::from("test"))));
        tok
    }

    pub fn test_add_listing(
        &self,
        seller: UserId,
        info: ListingInfo,
        status: ListingStatus,
        is_featured: bool,
    ) -> Listing {
        let mut s = self.state();
        let listing = Listing {
            id: ListingId(s.next_id()),
            seller_id: seller,
            info,
            status,
            is_featured,
            created_at: s.now(),
        };
        s.listings.insert(listing.id, listing.clone());
        listing
    }

    /// Every path currently in the object storage, sorted
    pub fn test_objects(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn test_object(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.state()
            .objects
            .get(path)
            .map(|o| (o.content_type.clone(), o.data.clone()))
    }

    pub fn test_all_images(&self) -> Vec<ListingImage> {
        self.state().images.values().cloned().collect()
    }

    /// Makes uploads whose path contains `pattern` fail
    pub fn test_fail_uploads_containing(&self, pattern: &str) {
        self.state().failing_uploads.push(String::from(pattern));
    }

    /// Lets `n` more image rows be inserted, then fails every following insertion
    pub fn test_fail_image_inserts_after(&self, n: usize) {
        self.state().image_inserts_before_failure = Some(n);
    }

    pub fn test_set_geolocation(&self, ip: IpAddr, country: CountryCode) {
        self.state().geolocation.insert(ip, country);
    }
}

#[async_trait]
impl Db for MockServer {
    async fn login(
        &self,
        email: &str,
        password: &str,
        device: &str,
    ) -> anyhow::Result<Option<AuthToken>> {
        let mut s = self.state();
        let user = s
            .users
            .values()
            .find(|u| u.profile.email == email)
            .map(|u| (u.profile.id, u.pass.clone()));
        match user {
            // tests (of which mock-server is a part of) don't actually use bcrypt
            Some((id, pass)) if pass == password => {
                let tok = AuthToken(Uuid::new_v4());
                s.sessions.insert(tok, (id, Device(String::from(device))));
                Ok(Some(tok))
            }
            _ => Ok(None),
        }
    }

    async fn logout(&self, token: AuthToken) -> anyhow::Result<bool> {
        Ok(self.state().sessions.remove(&token).is_some())
    }

    async fn recover_session(&self, token: AuthToken) -> anyhow::Result<Option<UserId>> {
        Ok(self.state().sessions.get(&token).map(|(u, _)| *u))
    }

    async fn fetch_profile(&self, user: UserId) -> anyhow::Result<Option<Profile>> {
        Ok(self.state().users.get(&user).map(|u| u.profile.clone()))
    }

    async fn set_locale(&self, user: UserId, locale: &SetLocale) -> anyhow::Result<()> {
        let mut s = self.state();
        let u = s
            .users
            .get_mut(&user)
            .ok_or_else(|| anyhow::anyhow!("no user {user:?}"))?;
        if let Some(c) = &locale.country {
            u.profile.country = Some(c.clone());
        }
        if let Some(l) = locale.language {
            u.profile.language = Some(l);
        }
        Ok(())
    }

    async fn search_listings(&self, search: &Search) -> anyhow::Result<Vec<Listing>> {
        let mut res = self
            .state()
            .listings
            .values()
            .filter(|l| search.filter.matches(l))
            .cloned()
            .collect::<Vec<_>>();
        search.order.sort(&mut res);
        Ok(res)
    }

    async fn fetch_listing(&self, id: ListingId) -> anyhow::Result<Option<Listing>> {
        Ok(self.state().listings.get(&id).cloned())
    }

    async fn insert_listing(
        &self,
        seller: UserId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing> {
        let mut s = self.state();
        let listing = Listing {
            id: ListingId(s.next_id()),
            seller_id: seller,
            info: info.clone(),
            status: ListingStatus::Pending,
            is_featured,
            created_at: s.now(),
        };
        s.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn update_listing(
        &self,
        id: ListingId,
        info: &ListingInfo,
        is_featured: bool,
    ) -> anyhow::Result<Listing> {
        let mut s = self.state();
        let l = s.listing_mut(id)?;
        l.info = info.clone();
        l.is_featured = is_featured;
        l.status = ListingStatus::Pending;
        Ok(l.clone())
    }

    async fn delete_listing(&self, id: ListingId) -> anyhow::Result<()> {
        let mut s = self.state();
        s.listings.remove(&id);
        s.images.retain(|_, i| i.car_id != id);
        s.comments.retain(|_, c| c.car_id != id);
        s.favorites.retain(|(_, l)| *l != id);
        Ok(())
    }

    async fn set_listing_status(
        &self,
        id: ListingId,
        status: ListingStatus,
    ) -> anyhow::Result<()> {
        self.state().listing_mut(id)?.status = status;
        Ok(())
    }

    async fn fetch_images(&self, car: ListingId) -> anyhow::Result<Vec<ListingImage>> {
        Ok(self
            .state()
            .images
            .values()
            .filter(|i| i.car_id == car)
            .cloned()
            .collect())
    }

    async fn insert_image(&self, img: &NewListingImage) -> anyhow::Result<ListingImage> {
        let mut s = self.state();
        let budget = s.image_inserts_before_failure;
        match budget {
            Some(0) => anyhow::bail!("image insertion failure injected by test"),
            Some(n) => s.image_inserts_before_failure = Some(n - 1),
            None => (),
        }
        anyhow::ensure!(
            s.listings.contains_key(&img.car_id),
            "no listing {:?}",
            img.car_id
        );
        let image = ListingImage {
            id: ImageId(s.next_id()),
            car_id: img.car_id,
            url: img.url.clone(),
            storage_path: img.storage_path.clone(),
            is_main: img.is_main,
            created_at: s.now(),
        };
        s.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn delete_image(&self, id: ImageId) -> anyhow::Result<()> {
        self.state().images.remove(&id);
        Ok(())
    }

    async fn set_main_image(&self, car: ListingId, id: ImageId) -> anyhow::Result<()> {
        let mut s = self.state();
        anyhow::ensure!(
            s.images.get(&id).map_or(false, |i| i.car_id == car),
            "image {id:?} is not part of listing {car:?}"
        );
        for i in s.images.values_mut().filter(|i| i.car_id == car) {
            i.is_main = i.id == id;
        }
        Ok(())
    }

    async fn fetch_comments(&self, car: ListingId) -> anyhow::Result<Vec<Comment>> {
        let s = self.state();
        let mut res = s
            .comments
            .values()
            .filter(|c| c.car_id == car)
            .map(|c| s.with_author(c.clone()))
            .collect::<Vec<_>>();
        res.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(res)
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        let s = self.state();
        Ok(s.comments.get(&id).map(|c| s.with_author(c.clone())))
    }

    async fn insert_comment(&self, user: UserId, c: &NewComment) -> anyhow::Result<Comment> {
        let mut s = self.state();
        let author = s
            .users
            .get(&user)
            .map(|u| u.profile.snapshot())
            .ok_or_else(|| anyhow::anyhow!("no user {user:?}"))?;
        anyhow::ensure!(
            s.listings.contains_key(&c.car_id),
            "no listing {:?}",
            c.car_id
        );
        let comment = Comment {
            id: CommentId(s.next_id()),
            car_id: c.car_id,
            user_id: user,
            parent_id: c.parent_id,
            content: c.content.clone(),
            created_at: s.now(),
            user: author,
        };
        s.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(&self, id: CommentId, content: &str) -> anyhow::Result<Comment> {
        let mut s = self.state();
        let c = s
            .comments
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no comment {id:?}"))?;
        c.content = String::from(content);
        let c = c.clone();
        Ok(s.with_author(c))
    }

    async fn delete_comment(&self, id: CommentId) -> anyhow::Result<()> {
        self.state()
            .comments
            .retain(|_, c| c.id != id && c.parent_id != Some(id));
        Ok(())
    }

    async fn fetch_favorites(&self, user: UserId) -> anyhow::Result<Vec<Listing>> {
        let s = self.state();
        Ok(s.favorites
            .iter()
            .rev()
            .filter(|(u, _)| *u == user)
            .filter_map(|(_, l)| s.listings.get(l))
            .filter(|l| l.status.is_public() || l.seller_id == user)
            .cloned()
            .collect())
    }

    async fn add_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()> {
        let mut s = self.state();
        anyhow::ensure!(s.listings.contains_key(&car), "no listing {car:?}");
        if !s.favorites.contains(&(user, car)) {
            s.favorites.push((user, car));
        }
        Ok(())
    }

    async fn remove_favorite(&self, user: UserId, car: ListingId) -> anyhow::Result<()> {
        self.state().favorites.retain(|f| *f != (user, car));
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MockServer {
    async fn upload(&self, path: &str, content_type: &str, data: Vec<u8>) -> anyhow::Result<()> {
        let mut s = self.state();
        if s.failing_uploads.iter().any(|p| path.contains(p.as_str())) {
            anyhow::bail!("upload failure injected by test for {path:?}");
        }
        s.objects.insert(
            String::from(path),
            Object {
                content_type: String::from(content_type),
                data,
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("mock://storage/{path}")
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.state().objects.remove(path);
        Ok(())
    }
}

#[async_trait]
impl GeoLocator for MockServer {
    async fn locate(&self, ip: IpAddr) -> anyhow::Result<Option<CountryCode>> {
        Ok(self.state().geolocation.get(&ip).cloned())
    }
}
