use carmart_api::{ListingQuery, Order, OrderType};

#[derive(Clone, Debug, PartialEq)]
pub enum Bind {
    Bool(bool),
    I32(i32),
    I64(i64),
    String(String),
}

#[derive(Debug, Default)]
pub struct Sql {
    pub where_clause: String,
    pub binds: Vec<Bind>,
}

impl Sql {
    /// Adds a Bind, returning the index that should be used to refer to it assuming the first bind is at index first_bind_idx
    fn add_bind(&mut self, first_bind_idx: usize, b: Bind) -> usize {
        let res = first_bind_idx + self.binds.len();
        self.binds.push(b);
        res
    }
}

/// Assumes the `cars` table is available as `c`
pub fn to_postgres(q: &ListingQuery, first_bind_idx: usize) -> Sql {
    let mut res = Default::default();
    add_to_postgres(q, first_bind_idx, &mut res);
    res
}

fn add_to_postgres(q: &ListingQuery, first_bind_idx: usize, res: &mut Sql) {
    macro_rules! compare {
        ($column:literal, $op:literal, $bind:expr) => {{
            let idx = res.add_bind(first_bind_idx, $bind);
            res.where_clause
                .push_str(&format!(concat!("(c.", $column, " ", $op, " ${}"), idx));
            res.where_clause.push(')');
        }};
    }
    match q {
        ListingQuery::Any(queries) => {
            res.where_clause.push_str("(false");
            for q in queries {
                res.where_clause.push_str(" OR ");
                add_to_postgres(q, first_bind_idx, &mut *res);
            }
            res.where_clause.push(')');
        }
        ListingQuery::All(queries) => {
            res.where_clause.push_str("(true");
            for q in queries {
                res.where_clause.push_str(" AND ");
                add_to_postgres(q, first_bind_idx, &mut *res);
            }
            res.where_clause.push(')');
        }
        ListingQuery::Not(q) => {
            res.where_clause.push_str("NOT ");
            add_to_postgres(q, first_bind_idx, &mut *res);
        }
        ListingQuery::Make(m) => {
            let idx = res.add_bind(first_bind_idx, Bind::String(m.clone()));
            res.where_clause
                .push_str(&format!("(lower(c.make) = lower(${idx}))"));
        }
        ListingQuery::Model(m) => {
            let idx = res.add_bind(first_bind_idx, Bind::String(m.clone()));
            res.where_clause
                .push_str(&format!("(lower(c.model) = lower(${idx}))"));
        }
        ListingQuery::Country(country) => {
            compare!("country", "=", Bind::String(country.to_string()))
        }
        ListingQuery::Status(s) => compare!("status", "=", Bind::String(s.to_string())),
        ListingQuery::Featured(f) => compare!("is_featured", "=", Bind::Bool(*f)),
        ListingQuery::YearFrom(y) => compare!("year", ">=", Bind::I32(*y)),
        ListingQuery::YearTo(y) => compare!("year", "<=", Bind::I32(*y)),
        ListingQuery::PriceAtMost(p) => compare!("price", "<=", Bind::I64(*p)),
        ListingQuery::PriceAtLeast(p) => compare!("price", ">=", Bind::I64(*p)),
        ListingQuery::MileageAtMost(m) => compare!("mileage_km", "<=", Bind::I64(*m)),
        ListingQuery::Phrase(t) => {
            let idx = res.add_bind(first_bind_idx, Bind::String(escape_like(t)));
            res.where_clause.push_str(&format!(
                "(concat_ws(' ', c.title, c.make, c.model, c.description) ILIKE ('%' || ${idx} || '%'))"
            ));
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            res.push('\\');
        }
        res.push(c);
    }
    res
}

/// Featured listings always come first, ties are broken by recency
pub fn order_clause(o: &Order) -> String {
    let (column, dir) = match o {
        Order::CreationDate(t) => ("c.created_at", t),
        Order::Price(t) => ("c.price", t),
        Order::Year(t) => ("c.year", t),
        Order::Mileage(t) => ("c.mileage_km", t),
    };
    let dir = match dir {
        OrderType::Asc => "ASC",
        OrderType::Desc => "DESC",
    };
    format!("c.is_featured DESC, {column} {dir}, c.created_at DESC, c.id ASC")
}
