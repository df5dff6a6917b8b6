//! # sentinel-auth
//!
//! Credential verification for step-up reauthentication. The hub never
//! inspects secrets itself; it asks an [`IdentityProvider`].

pub mod password;
pub mod provider;

pub use password::PasswordHasher;
pub use provider::{IdentityProvider, StaticIdentityProvider};
