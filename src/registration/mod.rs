//! Device registration with the companion authentication service

mod companion;
mod flow;

pub use companion::CompanionAuthenticator;
pub use flow::{AuthError, Authenticator, RegistrationCode, RegistrationError, RegistrationFlow};
