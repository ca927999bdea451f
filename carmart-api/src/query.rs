use std::cmp::Reverse;

use crate::{CountryCode, Error, Listing, ListingStatus};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ListingQuery {
    Any(Vec<ListingQuery>),
    All(Vec<ListingQuery>),
    Not(Box<ListingQuery>),
    Make(String),
    Model(String),
    Country(CountryCode),
    Status(ListingStatus),
    Featured(bool),
    YearFrom(i32),
    YearTo(i32),

    /// Price bounds are compared in each listing's own currency
    PriceAtMost(i64),
    PriceAtLeast(i64),

    MileageAtMost(i64),
    Phrase(String), // case-insensitive search in title, make, model and description
}

impl ListingQuery {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ListingQuery::Any(v) | ListingQuery::All(v) => {
                for q in v {
                    q.validate()?;
                }
                Ok(())
            }
            ListingQuery::Not(q) => q.validate(),
            ListingQuery::Make(s) | ListingQuery::Model(s) | ListingQuery::Phrase(s) => {
                crate::validate_string(s)
            }
            ListingQuery::Country(_)
            | ListingQuery::Status(_)
            | ListingQuery::Featured(_)
            | ListingQuery::YearFrom(_)
            | ListingQuery::YearTo(_)
            | ListingQuery::PriceAtMost(_)
            | ListingQuery::PriceAtLeast(_)
            | ListingQuery::MileageAtMost(_) => Ok(()),
        }
    }

    pub fn matches(&self, l: &Listing) -> bool {
        match self {
            ListingQuery::Any(v) => v.iter().any(|q| q.matches(l)),
            ListingQuery::All(v) => v.iter().all(|q| q.matches(l)),
            ListingQuery::Not(q) => !q.matches(l),
            ListingQuery::Make(m) => l.info.make.eq_ignore_ascii_case(m),
            ListingQuery::Model(m) => l.info.model.eq_ignore_ascii_case(m),
            ListingQuery::Country(c) => l.info.country == *c,
            ListingQuery::Status(s) => l.status == *s,
            ListingQuery::Featured(f) => l.is_featured == *f,
            ListingQuery::YearFrom(y) => l.info.year >= *y,
            ListingQuery::YearTo(y) => l.info.year <= *y,
            ListingQuery::PriceAtMost(p) => l.info.price <= *p,
            ListingQuery::PriceAtLeast(p) => l.info.price >= *p,
            ListingQuery::MileageAtMost(m) => l.info.mileage_km <= *m,
            ListingQuery::Phrase(p) => {
                let p = p.to_lowercase();
                [
                    &l.info.title,
                    &l.info.make,
                    &l.info.model,
                    &l.info.description,
                ]
                .iter()
                .any(|s| s.to_lowercase().contains(&p))
            }
        }
    }

    /// Restricts this query to listings that are visible to the public
    pub fn publicly_visible(self) -> ListingQuery {
        ListingQuery::All(vec![ListingQuery::Status(ListingStatus::Approved), self])
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum OrderType {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Order {
    CreationDate(OrderType),
    Price(OrderType),
    Year(OrderType),
    Mileage(OrderType),
}

impl Default for Order {
    fn default() -> Order {
        Order::CreationDate(OrderType::Desc)
    }
}

impl Order {
    /// Featured listings always come first, then the requested order, then newest first
    pub fn sort(&self, listings: &mut [Listing]) {
        fn key(o: &Order, l: &Listing) -> i64 {
            let (v, t) = match *o {
                Order::CreationDate(t) => (l.created_at.timestamp(), t),
                Order::Price(t) => (l.info.price, t),
                Order::Year(t) => (i64::from(l.info.year), t),
                Order::Mileage(t) => (l.info.mileage_km, t),
            };
            match t {
                OrderType::Asc => v,
                OrderType::Desc => -v,
            }
        }
        listings.sort_by_key(|l| (Reverse(l.is_featured), key(self, l), Reverse(l.created_at), l.id))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Search {
    pub filter: ListingQuery,
    pub order: Order,
}

impl Search {
    pub fn all() -> Search {
        Search {
            filter: ListingQuery::All(vec![]),
            order: Order::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        Condition, CurrencyCode, FuelType, ListingId, ListingInfo, Transmission, UserId,
    };

    fn listing(id: i64, make: &str, year: i32, price: i64, featured: bool) -> Listing {
        Listing {
            id: ListingId(id),
            seller_id: UserId::stub(),
            info: ListingInfo {
                title: format!("{make} for sale"),
                make: String::from(make),
                model: String::from("Base"),
                year,
                mileage_km: 10_000 * id,
                price,
                currency: CurrencyCode::new("AED").unwrap(),
                country: CountryCode::new("AE").unwrap(),
                city: String::from("Dubai"),
                body_type: None,
                transmission: Transmission::Automatic,
                fuel_type: FuelType::Petrol,
                condition: Condition::Used,
                color: None,
                description: String::from("Full service history"),
            },
            status: ListingStatus::Approved,
            is_featured: featured,
            created_at: chrono::Utc
                .with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn matching() {
        let l = listing(1, "Toyota", 2018, 90_000, false);
        assert!(ListingQuery::Make(String::from("toyota")).matches(&l));
        assert!(ListingQuery::Phrase(String::from("SERVICE")).matches(&l));
        assert!(ListingQuery::All(vec![
            ListingQuery::YearFrom(2015),
            ListingQuery::PriceAtMost(90_000),
        ])
        .matches(&l));
        assert!(!ListingQuery::Not(Box::new(ListingQuery::Featured(false))).matches(&l));
        assert!(ListingQuery::Any(vec![
            ListingQuery::Make(String::from("nissan")),
            ListingQuery::YearTo(2018),
        ])
        .matches(&l));
        assert!(ListingQuery::All(vec![]).matches(&l));
        assert!(!ListingQuery::Any(vec![]).matches(&l));

        let mut pending = l.clone();
        pending.status = ListingStatus::Pending;
        let q = ListingQuery::Make(String::from("toyota")).publicly_visible();
        assert!(q.matches(&l));
        assert!(!q.matches(&pending));
    }

    #[test]
    fn featured_first_then_order() {
        let mut v = vec![
            listing(1, "A", 2010, 30_000, false),
            listing(2, "B", 2012, 10_000, true),
            listing(3, "C", 2014, 20_000, false),
        ];
        Order::Price(OrderType::Asc).sort(&mut v);
        let ids = v.iter().map(|l| l.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 3, 1]);

        Order::CreationDate(OrderType::Desc).sort(&mut v);
        let ids = v.iter().map(|l| l.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 3, 1]);

        Order::Year(OrderType::Asc).sort(&mut v);
        let ids = v.iter().map(|l| l.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
