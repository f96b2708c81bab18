//! Verifies the shared secret that the periodic trigger sends with each invocation.

use std::fmt::Debug;

use axum::http::HeaderMap;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::Error;

/// The header the trigger may put the secret in.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// The server-held trigger credential.
///
/// Only a digest of the secret is kept, so comparisons run in constant time
/// regardless of the length of the candidate.
#[derive(Clone)]
pub struct CronSecret {
    digest: Vec<u8>,
}

impl CronSecret {
    /// Create a credential from `secret`.
    ///
    /// Returns `None` if `secret` is empty or only whitespace, since an empty
    /// secret would let anyone in.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.trim().is_empty() {
            return None;
        }

        Some(Self {
            digest: Sha512::digest(secret).to_vec(),
        })
    }

    /// Whether `candidate` is the secret.
    pub fn verify(&self, candidate: &str) -> bool {
        let candidate_digest = Sha512::digest(candidate);

        self.digest.as_slice().ct_eq(candidate_digest.as_slice()).into()
    }
}

impl Debug for CronSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CronSecret(********)")
    }
}

/// Get the credential the caller supplied, from either the `x-cron-secret`
/// header or an `Authorization: Bearer` header.
fn get_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(CRON_SECRET_HEADER) {
        return value.to_str().ok().map(str::to_owned);
    }

    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|authorization| authorization.token().to_owned())
}

/// Check the request `headers` against the server's `secret`.
///
/// # Errors
/// Returns [Error::Unauthorized] if no secret is configured, the request
/// carries no credential, or the credential does not match.
pub fn authorize(secret: Option<&CronSecret>, headers: &HeaderMap) -> Result<(), Error> {
    let Some(secret) = secret else {
        tracing::warn!("Rejecting trigger: no cron secret has been configured");
        return Err(Error::Unauthorized);
    };

    let Some(credential) = get_credential(headers) else {
        tracing::warn!("Rejecting trigger: no credential was supplied");
        return Err(Error::Unauthorized);
    };

    if !secret.verify(&credential) {
        tracing::warn!("Rejecting trigger: credential does not match");
        return Err(Error::Unauthorized);
    }

    Ok(())
}
