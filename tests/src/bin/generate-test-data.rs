use carmart_api::{Condition, FuelType, ListingStatus, Transmission};
use carmart_client::locale::COUNTRIES;
use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};

const NUM_USERS: usize = 12;
const PASSWORD: &str = "password";
// low cost, these accounts only ever live on dev databases
const BCRYPT_COST: u32 = 4;

const NUM_CARS: usize = 80;
const MAX_IMAGES_PER_CAR: usize = 4;
const DESCRIPTION_WORD_COUNT: usize = 40;

const NUM_TOP_COMMENTS: usize = 120;
const NUM_REPLIES: usize = 200;
const COMMENT_WORD_COUNT: usize = 15;

const NUM_FAVORITES: usize = 50;

const MODELS: [(&str, &[&str]); 6] = [
    ("Toyota", &["Land Cruiser", "Camry", "Corolla", "Hilux"]),
    ("Nissan", &["Patrol", "Altima", "Sunny"]),
    ("Mercedes-Benz", &["C-Class", "E-Class", "G-Class"]),
    ("Hyundai", &["Elantra", "Tucson", "Sonata"]),
    ("Lexus", &["LX", "ES", "RX"]),
    ("Tesla", &["Model 3", "Model Y"]),
];

const CITIES: [(&str, &[&str]); 8] = [
    ("AE", &["Dubai", "Abu Dhabi", "Sharjah"]),
    ("SA", &["Riyadh", "Jeddah", "Dammam"]),
    ("KW", &["Kuwait City", "Hawalli"]),
    ("QA", &["Doha", "Al Wakrah"]),
    ("BH", &["Manama", "Muharraq"]),
    ("OM", &["Muscat", "Salalah"]),
    ("JO", &["Amman", "Irbid"]),
    ("EG", &["Cairo", "Alexandria", "Giza"]),
];

fn gen_n_items(table: &str, columns: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    println!("INSERT INTO {table} ({columns}) VALUES");
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn opt_quote(s: Option<&str>) -> String {
    s.map_or_else(|| String::from("NULL"), quote)
}

fn gen_date(rng: &mut impl Rng, max_days_ago: i64) -> chrono::DateTime<Utc> {
    Utc::now() - Duration::minutes(rng.gen_range(0..max_days_ago * 24 * 60))
}

fn main() {
    let mut rng = rand::thread_rng();
    let hash = bcrypt::hash(PASSWORD, BCRYPT_COST).expect("hashing test password");

    // Generate users, the first one is the admin
    let mut users = Vec::new();
    gen_n_items(
        "profiles",
        "id, full_name, email, phone_number, password_hash, country, language, is_admin",
        NUM_USERS,
        |i| {
            let id = uuid::Uuid::new_v4();
            users.push(id);
            let country = COUNTRIES.choose(&mut rng).expect("country table is not empty");
            format!(
                "('{id}', {}, '{}', {}, '{hash}', {}, {}, {})",
                quote(&lipsum::lipsum_title()),
                if i == 0 {
                    String::from("admin@carmart.test")
                } else {
                    format!("user{i}@carmart.test")
                },
                opt_quote(
                    rng.gen_bool(0.5)
                        .then(|| format!("{} 5{:08}", country.phone_prefix, rng.gen_range(0..100_000_000)))
                        .as_deref()
                ),
                opt_quote(rng.gen_bool(0.7).then(|| country.code)),
                opt_quote(rng.gen_bool(0.5).then(|| ["en", "ar"].choose(&mut rng).copied()).flatten()),
                i == 0,
            )
        },
    );

    // Generate listings
    let mut cars = Vec::new();
    gen_n_items(
        "cars",
        "id, seller_id, title, make, model, year, mileage_km, price, currency, country, city, \
         body_type, transmission, fuel_type, condition, color, description, status, \
         is_featured, created_at",
        NUM_CARS,
        |i| {
            let id = i as i64 + 1;
            let created_at = gen_date(&mut rng, 90);
            cars.push((id, created_at));
            let (make, models) = MODELS.choose(&mut rng).expect("model table is not empty");
            let model = models.choose(&mut rng).expect("every make has models");
            let (country, cities) = CITIES.choose(&mut rng).expect("city table is not empty");
            let currency = COUNTRIES
                .iter()
                .find(|c| c.code == *country)
                .expect("every city is in a supported country")
                .currency;
            let year = rng.gen_range(2005..=2024);
            let condition = if year >= 2023 && rng.gen_bool(0.5) {
                Condition::New
            } else {
                Condition::Used
            };
            format!(
                "({id}, '{}', {}, '{make}', '{model}', {year}, {}, {}, '{currency}', '{country}', {}, {}, '{}', '{}', '{}', {}, {}, '{}', {}, '{}')",
                users.choose(&mut rng).expect("users were generated"),
                quote(&format!("{year} {make} {model}, {}", lipsum::lipsum_words(3))),
                if condition == Condition::New { 0 } else { rng.gen_range(5_000..300_000) },
                rng.gen_range(20..800) * 1_000,
                quote(cities.choose(&mut rng).expect("every country has cities")),
                opt_quote(["SUV", "Sedan", "Pickup", "Coupe"].choose(&mut rng).copied()),
                [Transmission::Automatic, Transmission::Manual].choose(&mut rng).expect("non-empty").as_str(),
                [FuelType::Petrol, FuelType::Diesel, FuelType::Hybrid, FuelType::Electric]
                    .choose(&mut rng)
                    .expect("non-empty")
                    .as_str(),
                condition.as_str(),
                opt_quote(rng.gen_bool(0.8).then(|| ["White", "Black", "Silver", "Red"].choose(&mut rng).copied()).flatten()),
                quote(&lipsum::lipsum_words(DESCRIPTION_WORD_COUNT)),
                ListingStatus::ALL.choose(&mut rng).expect("non-empty").as_str(),
                rng.gen_bool(0.15),
                created_at.to_rfc3339(),
            )
        },
    );
    println!("SELECT setval('cars_id_seq', {NUM_CARS});");

    // Generate images, exactly one main image per listing
    let images = cars
        .iter()
        .flat_map(|(car, _)| {
            let n = rng.gen_range(1..=MAX_IMAGES_PER_CAR);
            (0..n).map(move |i| (*car, i))
        })
        .collect::<Vec<_>>();
    gen_n_items(
        "car_images",
        "car_id, url, storage_path, is_main",
        images.len(),
        |i| {
            let (car, idx) = images[i];
            let path = carmart_client::storage_path(carmart_api::ListingId(car), &format!("photo-{idx}.jpg"));
            format!(
                "({car}, 'http://127.0.0.1:3000/storage/{path}', '{path}', {})",
                idx == 0
            )
        },
    );

    // Generate top-level comments, then replies that come after them
    let mut top_comments = Vec::new();
    gen_n_items(
        "comments",
        "id, car_id, user_id, parent_id, content, created_at",
        NUM_TOP_COMMENTS,
        |i| {
            let id = i as i64 + 1;
            let (car, listed_at) = *cars.choose(&mut rng).expect("cars were generated");
            let date = listed_at + Duration::minutes(rng.gen_range(1..5 * 24 * 60));
            top_comments.push((id, car, date));
            format!(
                "({id}, {car}, '{}', NULL, {}, '{}')",
                users.choose(&mut rng).expect("users were generated"),
                quote(&lipsum::lipsum_words(COMMENT_WORD_COUNT)),
                date.to_rfc3339(),
            )
        },
    );
    gen_n_items(
        "comments",
        "id, car_id, user_id, parent_id, content, created_at",
        NUM_REPLIES,
        |i| {
            let id = (NUM_TOP_COMMENTS + i) as i64 + 1;
            let (parent, car, parent_date) =
                *top_comments.choose(&mut rng).expect("comments were generated");
            let date = parent_date + Duration::minutes(rng.gen_range(1..3 * 24 * 60));
            format!(
                "({id}, {car}, '{}', {parent}, {}, '{}')",
                users.choose(&mut rng).expect("users were generated"),
                quote(&lipsum::lipsum_words(COMMENT_WORD_COUNT)),
                date.to_rfc3339(),
            )
        },
    );
    println!(
        "SELECT setval('comments_id_seq', {});",
        NUM_TOP_COMMENTS + NUM_REPLIES
    );

    gen_n_items("favorites", "user_id, car_id", NUM_FAVORITES, |_| {
        format!(
            "('{}', {})",
            users.choose(&mut rng).expect("users were generated"),
            cars.choose(&mut rng).expect("cars were generated").0,
        )
    });
}
