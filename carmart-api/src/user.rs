use crate::{CountryCode, Language, Uuid, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// Author information joined onto comments at query time
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl UserSnapshot {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("?")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,

    /// Preferred market, if the user picked one
    pub country: Option<CountryCode>,
    pub language: Option<Language>,

    pub is_admin: bool,
}

impl Profile {
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            full_name: self.full_name.clone(),
            email: Some(self.email.clone()),
            phone_number: self.phone_number.clone(),
        }
    }
}
