//! PKCE (RFC 7636) for the redirect-callback sign-in
//!
//! The web app's `/login` route sends the browser to the authorize endpoint
//! with an S256 challenge; `/getAToken` later redeems the returned code with
//! the matching verifier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::token::request_scope;

/// Generate a random code verifier.
///
/// 64 random bytes encode to 86 URL-safe base64 characters. Azure AD
/// enforces the RFC's 43..=128 character range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Parameters for an authorize redirect.
#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    pub authorize_endpoint: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    /// Opaque CSRF value echoed back on the callback
    pub state: &'a str,
    pub challenge: &'a str,
}

impl AuthorizationRequest<'_> {
    /// Full authorize URL with form-encoded query parameters.
    pub fn url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &request_scope(self.scopes))
            .append_pair("state", self.state)
            .append_pair("code_challenge", self.challenge)
            .append_pair("code_challenge_method", "S256")
            .finish();
        format!("{}?{query}", self.authorize_endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_url_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn verifier_length_is_within_rfc_range() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), 86);
        assert!(is_url_safe(&verifier), "verifier: {verifier}");
    }

    #[test]
    fn verifiers_are_unique() {
        assert_ne!(generate_verifier(), generate_verifier());
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") base64url-encoded without padding
        assert_eq!(
            compute_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn challenge_decodes_to_sha256_length() {
        let challenge = compute_challenge(&generate_verifier());
        assert!(is_url_safe(&challenge));
        assert_eq!(URL_SAFE_NO_PAD.decode(&challenge).unwrap().len(), 32);
    }

    #[test]
    fn authorize_url_encodes_parameters() {
        let scopes = vec!["User.Read".to_string(), "Mail.Send".to_string()];
        let url = AuthorizationRequest {
            authorize_endpoint: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            client_id: "client-123",
            redirect_uri: "http://localhost:5000/getAToken",
            scopes: &scopes,
            state: "state-xyz",
            challenge: "abc_DEF-123",
        }
        .url();

        assert!(url.starts_with(
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize?"
        ));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2FgetAToken"));
        assert!(url.contains("scope=User.Read+Mail.Send+offline_access"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("code_challenge=abc_DEF-123"));
        assert!(url.contains("code_challenge_method=S256"));
    }
}
