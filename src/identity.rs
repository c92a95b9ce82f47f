//! Caller identities and the provider that resolves them
use super::types::UserId;
use serde::Serialize;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[n(0)]
    #[default]
    User,
    #[n(1)]
    Admin,
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

// profile fields shown next to a trade
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: UserId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub role: Role,
}

impl User {
    pub fn new(name: &str, email: &str) -> anyhow::Result<Self> {
        Ok(Self {
            id: UserId::new()?,
            name: name.to_owned(),
            email: email.to_owned(),
            role: Role::User,
        })
    }
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.clone(), self.role)
    }
}

/// Turns a presented credential into a caller identity.
///
/// Token issuance and verification live outside this crate; implementors only need to map an
/// already-verified credential onto a registered user.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, credential: &str) -> anyhow::Result<Option<Identity>>;
    fn profile(&self, id: &UserId) -> anyhow::Result<Option<User>>;
}
