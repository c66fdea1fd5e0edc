//! Microsoft identity platform constants
//!
//! Endpoint paths follow the Azure AD v2.0 layout:
//! `{authority_host}/{tenant}/oauth2/v2.0/{authorize,token,devicecode}`.

use std::time::Duration;

/// Public cloud authority host
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Token file location, relative to the working directory
pub const DEFAULT_TOKEN_CACHE_FILE: &str = "token_cache.json";

/// Grant type for polling the token endpoint during device code sign-in (RFC 8628)
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Scope that makes the provider issue refresh tokens.
/// Without it every expiry would send the user back through device code sign-in.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Upper bound on how long a device code sign-in may block a caller.
pub const DEFAULT_DEVICE_CODE_TIMEOUT: Duration = Duration::from_secs(900);

/// Polling interval used when the device code response omits one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Floor for the polling interval, whatever the provider sends.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Added to the polling interval each time the provider answers `slow_down`.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);
