use std::{collections::HashMap, path::Path};

use anyhow::Context;

use crate::{
    api::{CurrencyCode, Error, Language, Time},
    locale::Country,
};

/// Exchange rates, expressed as units of each currency for one unit of `base`
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ConversionTable {
    base: CurrencyCode,
    rates: HashMap<CurrencyCode, f64>,
}

const DEFAULT_RATES: [(&str, f64); 9] = [
    ("AED", 3.6725),
    ("SAR", 3.75),
    ("KWD", 0.307),
    ("QAR", 3.64),
    ("BHD", 0.376),
    ("OMR", 0.3845),
    ("JOD", 0.709),
    ("EGP", 48.5),
    ("EUR", 0.92),
];

impl Default for ConversionTable {
    fn default() -> ConversionTable {
        let rates = DEFAULT_RATES
            .iter()
            .map(|(c, r)| (CurrencyCode::new(c).expect("valid default currency"), *r))
            .collect();
        ConversionTable {
            base: CurrencyCode::new("USD").expect("valid default currency"),
            rates,
        }
    }
}

impl ConversionTable {
    pub fn new(base: CurrencyCode, rates: HashMap<CurrencyCode, f64>) -> anyhow::Result<Self> {
        for (c, r) in rates.iter() {
            anyhow::ensure!(
                r.is_finite() && *r > 0.0,
                "rate for {c} must be a positive number, got {r}"
            );
        }
        Ok(ConversionTable { base, rates })
    }

    pub fn load(path: &Path) -> anyhow::Result<ConversionTable> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading conversion table {path:?}"))?;
        let table: ConversionTable = serde_json::from_slice(&data)
            .with_context(|| format!("parsing conversion table {path:?}"))?;
        ConversionTable::new(table.base, table.rates)
    }

    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    fn rate(&self, c: &CurrencyCode) -> Result<f64, Error> {
        if *c == self.base {
            return Ok(1.0);
        }
        self.rates
            .get(c)
            .copied()
            .ok_or_else(|| Error::UnknownCurrency(String::from(c.as_str())))
    }

    pub fn supports(&self, c: &CurrencyCode) -> bool {
        self.rate(c).is_ok()
    }

    /// Converts a whole amount, rounding to the nearest whole unit
    pub fn convert(&self, amount: i64, from: &CurrencyCode, to: &CurrencyCode) -> Result<i64, Error> {
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        if from == to {
            return Ok(amount);
        }
        Ok((amount as f64 / from_rate * to_rate).round() as i64)
    }
}

fn arabic_symbol(c: &CurrencyCode) -> Option<&'static str> {
    Some(match c.as_str() {
        "AED" => "د.إ",
        "SAR" => "ر.س",
        "KWD" => "د.ك",
        "QAR" => "ر.ق",
        "BHD" => "د.ب",
        "OMR" => "ر.ع",
        "JOD" => "د.أ",
        "EGP" => "ج.م",
        "USD" => "$",
        "EUR" => "€",
        _ => return None,
    })
}

pub fn group_digits(n: i64, sep: char) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut res = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        res.push('-');
    }
    for (i, d) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            res.push(sep);
        }
        res.push(d);
    }
    res
}

/// Replaces ASCII digits with Arabic-Indic ones
pub fn to_arabic_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x0660 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

pub fn format_price(amount: i64, currency: &CurrencyCode, lang: Language) -> String {
    match lang {
        Language::En => format!("{} {}", currency, group_digits(amount, ',')),
        Language::Ar => format!(
            "{} {}",
            to_arabic_digits(&group_digits(amount, '\u{066C}')),
            arabic_symbol(currency).unwrap_or(currency.as_str()),
        ),
    }
}

const ARABIC_MONTHS: [&str; 12] = [
    "يناير", "فبراير", "مارس", "أبريل", "مايو", "يونيو", "يوليو", "أغسطس", "سبتمبر", "أكتوبر",
    "نوفمبر", "ديسمبر",
];

/// Renders a date in the country's local time
pub fn format_date(t: Time, country: &Country, lang: Language) -> String {
    use chrono::Datelike;

    let local = t.with_timezone(&country.timezone);
    match lang {
        Language::En => local.format("%-d %b %Y").to_string(),
        Language::Ar => to_arabic_digits(&format!(
            "{} {} {}",
            local.day(),
            ARABIC_MONTHS[local.month0() as usize],
            local.year()
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::locale::{country, default_country};

    fn cur(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    #[test]
    fn conversion() {
        let t = ConversionTable::default();
        assert_eq!(t.convert(100, &cur("USD"), &cur("SAR")), Ok(375));
        assert_eq!(t.convert(375, &cur("SAR"), &cur("USD")), Ok(100));
        assert_eq!(t.convert(3750, &cur("SAR"), &cur("QAR")), Ok(3640));
        assert_eq!(t.convert(12, &cur("KWD"), &cur("KWD")), Ok(12));
        assert_eq!(
            t.convert(1, &cur("XYZ"), &cur("USD")),
            Err(Error::UnknownCurrency(String::from("XYZ")))
        );
        // even same-currency conversion requires a known currency
        assert!(t.convert(1, &cur("XYZ"), &cur("XYZ")).is_err());
        assert!(t.supports(&cur("USD")));
    }

    #[test]
    fn custom_table() {
        let mut rates = HashMap::new();
        rates.insert(cur("USD"), 0.27);
        assert!(ConversionTable::new(cur("AED"), rates.clone()).is_ok());
        rates.insert(cur("SAR"), -1.0);
        assert!(ConversionTable::new(cur("AED"), rates).is_err());

        let t: ConversionTable =
            serde_json::from_str(r#"{"base": "aed", "rates": {"usd": 0.2723}}"#).unwrap();
        assert_eq!(t.base().as_str(), "AED");
        assert_eq!(t.convert(1000, &cur("AED"), &cur("USD")), Ok(272));
    }

    #[test]
    fn digits() {
        assert_eq!(group_digits(0, ','), "0");
        assert_eq!(group_digits(999, ','), "999");
        assert_eq!(group_digits(1000, ','), "1,000");
        assert_eq!(group_digits(120000, ','), "120,000");
        assert_eq!(group_digits(-1234567, ','), "-1,234,567");
        assert_eq!(to_arabic_digits("2024-01"), "٢٠٢٤-٠١");
    }

    #[test]
    fn prices() {
        assert_eq!(format_price(120_000, &cur("AED"), Language::En), "AED 120,000");
        assert_eq!(format_price(120_000, &cur("AED"), Language::Ar), "١٢٠٬٠٠٠ د.إ");
        assert_eq!(format_price(5, &cur("CHF"), Language::Ar), "٥ CHF");
    }

    #[test]
    fn dates_use_local_time() {
        // 22:30 UTC is already the next day in Dubai
        let t = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 22, 30, 0).unwrap();
        assert_eq!(format_date(t, default_country(), Language::En), "2 Jan 2024");
        assert_eq!(format_date(t, default_country(), Language::Ar), "٢ يناير ٢٠٢٤");
        let egypt = country(&"EG".parse().unwrap()).unwrap();
        assert_eq!(format_date(t, egypt, Language::En), "2 Jan 2024");
        let t = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 20, 30, 0).unwrap();
        assert_eq!(format_date(t, egypt, Language::En), "1 Jan 2024");
    }
}
