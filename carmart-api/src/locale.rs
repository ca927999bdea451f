use std::{fmt, str::FromStr};

use crate::Error;

/// ISO 3166-1 alpha-2 country code, always uppercase
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

/// ISO 4217 currency code, always uppercase
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

macro_rules! code_type {
    ($typ:ident, $len:expr, $err:ident) => {
        impl $typ {
            pub fn new(code: &str) -> Result<$typ, Error> {
                let code = code.trim();
                if code.len() != $len || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(Error::$err(String::from(code)));
                }
                Ok($typ(code.to_ascii_uppercase()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $typ {
            type Error = Error;

            fn try_from(s: String) -> Result<$typ, Error> {
                $typ::new(&s)
            }
        }

        impl From<$typ> for String {
            fn from(c: $typ) -> String {
                c.0
            }
        }

        impl FromStr for $typ {
            type Err = Error;

            fn from_str(s: &str) -> Result<$typ, Error> {
                $typ::new(s)
            }
        }

        impl fmt::Display for $typ {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

code_type!(CountryCode, 2, UnsupportedCountry);
code_type!(CurrencyCode, 3, UnknownCurrency);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ar,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, Language::Ar)
    }
}

impl Default for Language {
    fn default() -> Language {
        Language::En
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Language, Error> {
        // accept full tags like "ar-AE" or "en_US"
        let primary = s.trim().split(['-', '_']).next().unwrap_or("");
        match primary.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ar" => Ok(Language::Ar),
            _ => Err(Error::InvalidField {
                field: String::from("language"),
                reason: format!("unsupported language {s:?}"),
            }),
        }
    }
}

/// The locale a visitor ends up browsing with
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LocaleContext {
    pub country: CountryCode,
    pub language: Language,
    pub currency: CurrencyCode,
    pub rtl: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SetLocale {
    pub country: Option<CountryCode>,
    pub language: Option<Language>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_normalized() {
        assert_eq!(CountryCode::new("ae").unwrap().as_str(), "AE");
        assert_eq!(CurrencyCode::new(" sar ").unwrap().as_str(), "SAR");
        assert_eq!(
            CountryCode::new("ARE"),
            Err(Error::UnsupportedCountry(String::from("ARE")))
        );
        assert!(CurrencyCode::new("A1D").is_err());
        assert!(serde_json::from_str::<CountryCode>("\"x\"").is_err());
        assert_eq!(
            serde_json::from_str::<CountryCode>("\"sa\"").unwrap(),
            CountryCode::new("SA").unwrap()
        );
    }

    #[test]
    fn language_tags() {
        assert_eq!("ar-AE".parse::<Language>(), Ok(Language::Ar));
        assert_eq!("EN_us".parse::<Language>(), Ok(Language::En));
        assert!("fr".parse::<Language>().is_err());
        assert!(Language::Ar.is_rtl());
        assert_eq!(serde_json::to_string(&Language::Ar).unwrap(), "\"ar\"");
    }
}
