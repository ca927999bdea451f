use crate::api::{CountryCode, ListingQuery, ListingStatus, Order, OrderType, Search};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search syntax:\n{0}")]
    Syntax(String),

    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("unknown sort order {0:?}")]
    UnknownOrder(String),
}

mod search_parser {
    use pest::iterators::{Pair, Pairs};
    use pest::pratt_parser::PrattParser;

    use super::SearchError;
    use crate::api::{CountryCode, ListingQuery, ListingStatus};

    #[derive(pest_derive::Parser)]
    #[grammar = "search.pest"]
    pub struct Parser;

    lazy_static::lazy_static! {
        static ref SEARCH_PARSER: PrattParser<Rule> = {
            use pest::pratt_parser::{Assoc::*, Op};
            use Rule::*;
            PrattParser::new()
                .op(Op::infix(or, Left))
                .op(Op::infix(and, Left))
                .op(Op::prefix(not))
        };
    }

    // Unescape a quoted-string
    fn unescape(s: &str) -> String {
        let mut res = String::with_capacity(s.len());
        let mut s = s.chars();
        assert_eq!(s.next(), Some('"'), "first char is not a double quote");
        while let Some(c) = s.next() {
            if c == '\\' {
                res.push(s.next().expect("got terminal backslash"));
            } else {
                res.push(c);
            }
        }
        assert_eq!(res.pop(), Some('"'), "last char is not a double quote");
        res
    }

    fn value(p: Pair<Rule>) -> String {
        match p.as_rule() {
            Rule::phrase => unescape(p.as_str()),
            _ => p.as_str().to_string(),
        }
    }

    fn invalid(field: &'static str, value: &str) -> SearchError {
        SearchError::InvalidValue {
            field,
            value: value.to_string(),
        }
    }

    /// Turns `field <cmp> number` into bounds, as (at least, at most)
    fn bounds(field: &'static str, p: Pair<Rule>) -> Result<(Option<i64>, Option<i64>), SearchError> {
        let mut inner = p.into_inner();
        let cmp = inner.next().expect("comparison without operator");
        let num = inner.next().expect("comparison without number");
        let n = num
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<i64>()
            .map_err(|_| invalid(field, num.as_str()))?;
        Ok(match cmp.as_str() {
            ">=" => (Some(n), None),
            ">" => (Some(n.saturating_add(1)), None),
            "<=" => (None, Some(n)),
            "<" => (None, Some(n.saturating_sub(1))),
            "=" | ":" => (Some(n), Some(n)),
            r => unreachable!("unexpected comparison operator: {:?}", r),
        })
    }

    fn range(
        (min, max): (Option<i64>, Option<i64>),
        at_least: impl Fn(i64) -> ListingQuery,
        at_most: impl Fn(i64) -> ListingQuery,
    ) -> ListingQuery {
        let mut v = Vec::new();
        v.extend(min.map(at_least));
        v.extend(max.map(at_most));
        match v.len() {
            1 => v.pop().expect("vec has one element"),
            _ => ListingQuery::All(v),
        }
    }

    fn year(n: i64) -> Result<i32, SearchError> {
        i32::try_from(n).map_err(|_| invalid("year", &n.to_string()))
    }

    pub fn parse_search(pairs: Pairs<Rule>) -> Result<ListingQuery, SearchError> {
        SEARCH_PARSER
            .map_primary(|p| match p.as_rule() {
                Rule::make => Ok(ListingQuery::Make(value(p.into_inner().next().expect("make without value")))),
                Rule::model => Ok(ListingQuery::Model(value(p.into_inner().next().expect("model without value")))),
                Rule::country => {
                    let code = p.into_inner().next().expect("country without value");
                    code.as_str()
                        .parse::<CountryCode>()
                        .map(ListingQuery::Country)
                        .map_err(|_| invalid("country", code.as_str()))
                }
                Rule::status => {
                    let s = p.into_inner().next().expect("status without value");
                    s.as_str()
                        .parse::<ListingStatus>()
                        .map(ListingQuery::Status)
                        .map_err(|_| invalid("status", s.as_str()))
                }
                Rule::featured => Ok(ListingQuery::Featured(
                    match p.into_inner().next().map(|p| p.as_rule()) {
                        Some(Rule::r#true) => true,
                        Some(Rule::r#false) => false,
                        r => unreachable!("Rule::featured unexpected atom: {:?}", r),
                    },
                )),
                Rule::year => {
                    let (min, max) = bounds("year", p)?;
                    let min = min.map(year).transpose()?;
                    let max = max.map(year).transpose()?;
                    let mut v = Vec::new();
                    v.extend(min.map(ListingQuery::YearFrom));
                    v.extend(max.map(ListingQuery::YearTo));
                    Ok(match v.len() {
                        1 => v.pop().expect("vec has one element"),
                        _ => ListingQuery::All(v),
                    })
                }
                Rule::price => Ok(range(
                    bounds("price", p)?,
                    ListingQuery::PriceAtLeast,
                    ListingQuery::PriceAtMost,
                )),
                Rule::mileage => Ok(range(
                    bounds("mileage", p)?,
                    |n| ListingQuery::Not(Box::new(ListingQuery::MileageAtMost(n.saturating_sub(1)))),
                    ListingQuery::MileageAtMost,
                )),
                Rule::search => parse_search(p.into_inner()),
                Rule::phrase => Ok(ListingQuery::Phrase(unescape(p.as_str()))),
                Rule::word => Ok(ListingQuery::Phrase(p.as_str().to_string())),
                r => unreachable!("Search unexpected primary: {:?}", r),
            })
            .map_infix(|lhs, op, rhs| {
                let (lhs, rhs) = (lhs?, rhs?);
                Ok(match op.as_rule() {
                    Rule::and => match lhs {
                        ListingQuery::All(mut v) => {
                            v.push(rhs);
                            ListingQuery::All(v)
                        }
                        _ => ListingQuery::All(vec![lhs, rhs]),
                    },
                    Rule::or => match lhs {
                        ListingQuery::Any(mut v) => {
                            v.push(rhs);
                            ListingQuery::Any(v)
                        }
                        _ => ListingQuery::Any(vec![lhs, rhs]),
                    },
                    r => unreachable!("Search unexpected infix: {:?}", r),
                })
            })
            .map_prefix(|op, rhs| match op.as_rule() {
                Rule::not => Ok(ListingQuery::Not(Box::new(rhs?))),
                r => unreachable!("Search unexpected prefix: {:?}", r),
            })
            .parse(pairs)
    }
}

/// Parses a search string like `toyota "land cruiser" year>=2015 price<=50000`.
///
/// An empty search matches every listing.
pub fn parse_query(search: &str) -> Result<ListingQuery, SearchError> {
    use pest::Parser;

    if search.trim().is_empty() {
        return Ok(ListingQuery::All(Vec::new()));
    }
    let mut pairs = search_parser::Parser::parse(search_parser::Rule::everything, search)
        .map_err(|e| SearchError::Syntax(e.to_string()))?;
    // ignore the Pair generated by EOI
    let search_res = pairs
        .next()
        .expect("Rule::everything result without search result")
        .into_inner()
        .next()
        .expect("Rule::everything result without search result");
    search_parser::parse_search(search_res.into_inner())
}

pub fn parse_order(order: &str) -> Result<Order, SearchError> {
    Ok(match order.to_ascii_lowercase().as_str() {
        "newest" => Order::CreationDate(OrderType::Desc),
        "oldest" => Order::CreationDate(OrderType::Asc),
        "price-asc" => Order::Price(OrderType::Asc),
        "price-desc" => Order::Price(OrderType::Desc),
        "year-asc" => Order::Year(OrderType::Asc),
        "year-desc" => Order::Year(OrderType::Desc),
        "mileage-asc" => Order::Mileage(OrderType::Asc),
        "mileage-desc" => Order::Mileage(OrderType::Desc),
        _ => return Err(SearchError::UnknownOrder(order.to_string())),
    })
}

pub fn parse(search: &str, order: Option<&str>) -> Result<Search, SearchError> {
    Ok(Search {
        filter: parse_query(search)?,
        order: order.map(parse_order).transpose()?.unwrap_or_default(),
    })
}

/// Restricts a parsed query to one country, as the country picker does
pub fn in_country(q: ListingQuery, country: CountryCode) -> ListingQuery {
    ListingQuery::All(vec![ListingQuery::Country(country), q])
}

/// Shorthand for the admin moderation queue
pub fn pending() -> Search {
    Search {
        filter: ListingQuery::Status(ListingStatus::Pending),
        order: Order::CreationDate(OrderType::Asc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ListingQuery::*;

    fn phrase(s: &str) -> ListingQuery {
        Phrase(String::from(s))
    }

    #[test]
    fn words_and_phrases() {
        assert_eq!(parse_query("toyota"), Ok(phrase("toyota")));
        assert_eq!(
            parse_query(r#"toyota "land \"cruiser\"""#),
            Ok(All(vec![phrase("toyota"), phrase("land \"cruiser\"")]))
        );
        assert_eq!(parse_query("x-trail"), Ok(phrase("x-trail")));
        assert_eq!(parse_query("   "), Ok(All(vec![])));
    }

    #[test]
    fn filters() {
        assert_eq!(
            parse_query(r#"make:Toyota model:"Land Cruiser" country:sa"#),
            Ok(All(vec![
                Make(String::from("Toyota")),
                Model(String::from("Land Cruiser")),
                Country(CountryCode::new("SA").unwrap()),
            ]))
        );
        assert_eq!(parse_query("featured:yes"), Ok(Featured(true)));
        assert_eq!(parse_query("status:sold"), Ok(Status(ListingStatus::Sold)));
        assert_eq!(parse_query("year>=2015"), Ok(YearFrom(2015)));
        assert_eq!(parse_query("year>2015"), Ok(YearFrom(2016)));
        assert_eq!(parse_query("year:2015"), Ok(All(vec![YearFrom(2015), YearTo(2015)])));
        assert_eq!(parse_query("price<=50,000"), Ok(PriceAtMost(50_000)));
        assert_eq!(parse_query("price<50000"), Ok(PriceAtMost(49_999)));
        assert_eq!(parse_query("mileage<=100000"), Ok(MileageAtMost(100_000)));
        assert_eq!(
            parse_query("mileage>=100"),
            Ok(Not(Box::new(MileageAtMost(99))))
        );
        // a field name without a comparison is just a word
        assert_eq!(parse_query("yearly"), Ok(phrase("yearly")));
    }

    #[test]
    fn boolean_operators() {
        assert_eq!(
            parse_query("bmw or audi and not red"),
            Ok(Any(vec![
                phrase("bmw"),
                All(vec![phrase("audi"), Not(Box::new(phrase("red")))]),
            ]))
        );
        assert_eq!(
            parse_query("(bmw | audi) -diesel"),
            Ok(All(vec![
                Any(vec![phrase("bmw"), phrase("audi")]),
                Not(Box::new(phrase("diesel"))),
            ]))
        );
        assert_eq!(parse_query("oregon"), Ok(phrase("oregon")));
    }

    #[test]
    fn errors() {
        assert!(matches!(parse_query("(bmw"), Err(SearchError::Syntax(_))));
        assert!(matches!(parse_query("and"), Err(SearchError::Syntax(_))));
        assert_eq!(
            parse_query("status:lost"),
            Err(SearchError::InvalidValue {
                field: "status",
                value: String::from("lost")
            })
        );
        assert!(parse_query("country:xyz").is_err());
        assert!(parse_query("year>=99999999999").is_err());
        assert_eq!(
            parse_order("cheapest"),
            Err(SearchError::UnknownOrder(String::from("cheapest")))
        );
    }

    #[test]
    fn full_search() {
        let s = parse("make:kia", Some("price-asc")).unwrap();
        assert_eq!(s.filter, Make(String::from("kia")));
        assert_eq!(s.order, Order::Price(OrderType::Asc));
        assert_eq!(parse("", None).unwrap().order, Order::default());
        assert_eq!(pending().filter, Status(ListingStatus::Pending));
    }
}
