//! Credential extraction and resolution

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod credential;
mod error;
mod resolver;

pub use credential::{Credential, CredentialSource, extract_credential};
pub use error::AuthError;
pub use resolver::{CredentialResolver, ResolvedCredential};
