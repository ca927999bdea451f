use crate::{Error, Uuid, STUB_UUID};

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    pub email: String,
    pub password: String,
    pub device: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.email)?;
        crate::validate_string(&self.password)?;
        crate::validate_string(&self.device)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}
