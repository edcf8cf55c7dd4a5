//! Forged identity assertions.
//!
//! The application under test authenticates with an HS256-signed token
//! in a `token=` cookie. [`AssertionIssuer`] is the seam through which
//! the worker mints one for the identity it impersonates;
//! [`HmacAssertionIssuer`] produces tokens interchangeable with the
//! application's own, given the shared signing secret.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::identity::Identity;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by an identity assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionClaims {
    pub user_id: String,
    pub username: String,
    /// Issued-at, epoch seconds
    pub iat: i64,
    /// Expiry, epoch seconds
    pub exp: i64,
}

/// Mints a short-lived signed credential asserting a user identity.
///
/// Treated as synchronous and infallible by the core; real backends
/// that can fail should surface that at launch time instead.
pub trait AssertionIssuer: Send + Sync {
    /// Mint a credential for `identity`.
    fn issue(&self, identity: &Identity) -> String;
}

/// HS256 issuer sharing the application's signing secret.
#[derive(Clone)]
pub struct HmacAssertionIssuer {
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl HmacAssertionIssuer {
    /// Create an issuer from the shared secret and assertion lifetime.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    fn sign(&self, signing_input: &str) -> String {
        // HMAC accepts keys of any length; new_from_slice cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(signing_input.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Decode and verify a token, returning its claims.
    ///
    /// Used by tests to check the injected credential is well-formed;
    /// the worker itself never verifies tokens.
    pub fn verify(&self, token: &str) -> Option<AssertionClaims> {
        let mut parts = token.split('.');
        let header = parts.next()?;
        let payload = parts.next()?;
        let signature = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let expected = self.sign(&format!("{header}.{payload}"));
        if expected != signature {
            return None;
        }
        let claims = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&claims).ok()
    }
}

impl AssertionIssuer for HmacAssertionIssuer {
    fn issue(&self, identity: &Identity) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
            iat: now,
            exp: now.saturating_add_unsigned(self.ttl_secs),
        };

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&claims).expect("claims serialize to JSON"),
        );
        let signing_input = format!("{header}.{payload}");
        let signature = self.sign(&signing_input);
        format!("{signing_input}.{signature}")
    }
}
