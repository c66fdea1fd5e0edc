//! Microsoft identity platform authentication with a persisted token cache
//!
//! Supplies Graph access tokens to the rest of the workspace. The
//! `CredentialCache` is the entry point; everything else is the plumbing it
//! drives.
//!
//! Token flow:
//! 1. `CredentialCache::get_valid_access_token()` loads `TokenStore`
//! 2. A still-valid record is returned as-is, with no network call
//! 3. Otherwise `IdentityProvider::refresh()` is tried with the stored refresh token
//! 4. Without one (or when it is rejected) `IdentityProvider::device_code()` runs
//! 5. The new `TokenRecord` replaces the stored one
//!
//! The redirect-callback sign-in (`pkce` + `CredentialCache::complete_authorization()`)
//! is an alternative to step 4 driven by the web app.

pub mod cache;
pub mod constants;
pub mod device_code;
pub mod error;
pub mod pkce;
pub mod provider;
pub mod store;
pub mod token;

pub use cache::{AcquisitionSource, CacheStatus, Clock, CredentialCache, RetryPolicy};
pub use constants::*;
pub use device_code::{DeviceCodePrompt, DeviceCodeResponse, stderr_prompt};
pub use error::{Error, Result};
pub use pkce::{AuthorizationRequest, compute_challenge, generate_verifier};
pub use provider::{AzureIdentity, Endpoints, IdentityProvider, ProviderFuture};
pub use store::{TokenRecord, TokenStore, unix_now};
pub use token::{ClientCredentials, TokenResponse, request_scope};
