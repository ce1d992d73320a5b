//! Authentication: credential storage and the bearer-token interceptor.

pub mod interceptor;
pub mod store;

pub use interceptor::AuthInterceptor;
pub use store::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
