use chrono_tz::Tz;

use crate::api::{CountryCode, CurrencyCode, Language, LocaleContext};

/// A market the site operates in
#[derive(Debug)]
pub struct Country {
    pub code: &'static str,
    pub name_en: &'static str,
    pub name_ar: &'static str,
    pub currency: &'static str,
    pub timezone: Tz,
    pub phone_prefix: &'static str,
}

pub static COUNTRIES: [Country; 8] = [
    Country {
        code: "AE",
        name_en: "United Arab Emirates",
        name_ar: "الإمارات العربية المتحدة",
        currency: "AED",
        timezone: chrono_tz::Asia::Dubai,
        phone_prefix: "+971",
    },
    Country {
        code: "SA",
        name_en: "Saudi Arabia",
        name_ar: "المملكة العربية السعودية",
        currency: "SAR",
        timezone: chrono_tz::Asia::Riyadh,
        phone_prefix: "+966",
    },
    Country {
        code: "KW",
        name_en: "Kuwait",
        name_ar: "الكويت",
        currency: "KWD",
        timezone: chrono_tz::Asia::Kuwait,
        phone_prefix: "+965",
    },
    Country {
        code: "QA",
        name_en: "Qatar",
        name_ar: "قطر",
        currency: "QAR",
        timezone: chrono_tz::Asia::Qatar,
        phone_prefix: "+974",
    },
    Country {
        code: "BH",
        name_en: "Bahrain",
        name_ar: "البحرين",
        currency: "BHD",
        timezone: chrono_tz::Asia::Bahrain,
        phone_prefix: "+973",
    },
    Country {
        code: "OM",
        name_en: "Oman",
        name_ar: "عُمان",
        currency: "OMR",
        timezone: chrono_tz::Asia::Muscat,
        phone_prefix: "+968",
    },
    Country {
        code: "JO",
        name_en: "Jordan",
        name_ar: "الأردن",
        currency: "JOD",
        timezone: chrono_tz::Asia::Amman,
        phone_prefix: "+962",
    },
    Country {
        code: "EG",
        name_en: "Egypt",
        name_ar: "مصر",
        currency: "EGP",
        timezone: chrono_tz::Africa::Cairo,
        phone_prefix: "+20",
    },
];

pub const DEFAULT_COUNTRY: &str = "AE";

impl Country {
    pub fn code(&self) -> CountryCode {
        CountryCode::new(self.code).expect("static country table holds valid codes")
    }

    pub fn currency(&self) -> CurrencyCode {
        CurrencyCode::new(self.currency).expect("static country table holds valid currencies")
    }

    pub fn name(&self, lang: Language) -> &'static str {
        match lang {
            Language::En => self.name_en,
            Language::Ar => self.name_ar,
        }
    }
}

pub fn country(code: &CountryCode) -> Option<&'static Country> {
    COUNTRIES.iter().find(|c| c.code == code.as_str())
}

pub fn default_country() -> &'static Country {
    COUNTRIES
        .iter()
        .find(|c| c.code == DEFAULT_COUNTRY)
        .expect("default country is in the country table")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountrySource {
    Geolocation,
    Profile,
    Stored,
}

impl std::str::FromStr for CountrySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<CountrySource> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geolocation" | "geo" => Ok(CountrySource::Geolocation),
            "profile" => Ok(CountrySource::Profile),
            "stored" => Ok(CountrySource::Stored),
            _ => Err(anyhow::anyhow!("unknown country source {s:?}")),
        }
    }
}

/// Everything known about a visitor's locale preferences
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocaleInputs {
    pub geolocated: Option<CountryCode>,
    pub profile_country: Option<CountryCode>,
    pub stored_country: Option<CountryCode>,
    pub profile_language: Option<Language>,
    pub stored_language: Option<Language>,

    /// Currency explicitly requested for display
    pub display_currency: Option<CurrencyCode>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocaleResolver {
    order: Vec<CountrySource>,
}

impl Default for LocaleResolver {
    fn default() -> LocaleResolver {
        LocaleResolver {
            order: vec![
                CountrySource::Geolocation,
                CountrySource::Profile,
                CountrySource::Stored,
            ],
        }
    }
}

impl LocaleResolver {
    pub fn with_order(order: Vec<CountrySource>) -> LocaleResolver {
        LocaleResolver { order }
    }

    /// Parses a comma-separated list of sources, eg. `profile,geolocation`
    pub fn parse_order(order: &str) -> anyhow::Result<LocaleResolver> {
        let order = order
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect::<anyhow::Result<Vec<CountrySource>>>()?;
        Ok(LocaleResolver::with_order(order))
    }

    /// The first supported country among the sources wins
    pub fn resolve_country(&self, inputs: &LocaleInputs) -> &'static Country {
        for source in &self.order {
            let candidate = match source {
                CountrySource::Geolocation => &inputs.geolocated,
                CountrySource::Profile => &inputs.profile_country,
                CountrySource::Stored => &inputs.stored_country,
            };
            if let Some(code) = candidate {
                match country(code) {
                    Some(c) => {
                        tracing::debug!(?source, country = c.code, "resolved country");
                        return c;
                    }
                    None => tracing::debug!(?source, %code, "skipping unsupported country"),
                }
            }
        }
        default_country()
    }

    pub fn resolve_language(&self, inputs: &LocaleInputs) -> Language {
        inputs
            .profile_language
            .or(inputs.stored_language)
            .unwrap_or_default()
    }

    pub fn resolve(&self, inputs: &LocaleInputs) -> LocaleContext {
        let country = self.resolve_country(inputs);
        let language = self.resolve_language(inputs);
        LocaleContext {
            country: country.code(),
            language,
            currency: inputs
                .display_currency
                .clone()
                .unwrap_or_else(|| country.currency()),
            rtl: language.is_rtl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Option<CountryCode> {
        Some(CountryCode::new(s).unwrap())
    }

    #[test]
    fn country_table_is_consistent() {
        for c in COUNTRIES.iter() {
            assert_eq!(country(&c.code()).unwrap().code, c.code);
            let _ = c.currency();
        }
        assert_eq!(default_country().code, "AE");
    }

    #[test]
    fn country_priority() {
        let r = LocaleResolver::default();
        let mut inputs = LocaleInputs {
            geolocated: code("SA"),
            profile_country: code("KW"),
            stored_country: code("QA"),
            ..Default::default()
        };
        assert_eq!(r.resolve_country(&inputs).code, "SA");

        // unsupported geolocation falls through to the profile
        inputs.geolocated = code("FR");
        assert_eq!(r.resolve_country(&inputs).code, "KW");

        inputs.profile_country = None;
        assert_eq!(r.resolve_country(&inputs).code, "QA");

        inputs.stored_country = None;
        assert_eq!(r.resolve_country(&inputs).code, "AE");

        let r = LocaleResolver::with_order(vec![CountrySource::Stored, CountrySource::Geolocation]);
        let inputs = LocaleInputs {
            geolocated: code("SA"),
            stored_country: code("EG"),
            ..Default::default()
        };
        assert_eq!(r.resolve_country(&inputs).code, "EG");
        assert_eq!(LocaleResolver::parse_order("stored, GEO").unwrap(), r);
        assert!(LocaleResolver::parse_order("stored,cookie").is_err());
    }

    #[test]
    fn full_context() {
        let r = LocaleResolver::default();
        let ctx = r.resolve(&LocaleInputs {
            geolocated: code("EG"),
            stored_language: Some(Language::Ar),
            ..Default::default()
        });
        assert_eq!(ctx.country.as_str(), "EG");
        assert_eq!(ctx.currency.as_str(), "EGP");
        assert_eq!(ctx.language, Language::Ar);
        assert!(ctx.rtl);

        let ctx = r.resolve(&LocaleInputs {
            profile_language: Some(Language::En),
            stored_language: Some(Language::Ar),
            display_currency: Some(CurrencyCode::new("USD").unwrap()),
            ..Default::default()
        });
        assert_eq!(ctx.country.as_str(), "AE");
        assert_eq!(ctx.currency.as_str(), "USD");
        assert_eq!(ctx.language, Language::En);
        assert!(!ctx.rtl);
    }
}
