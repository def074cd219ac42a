//! Compact signed token codec (`header.payload.signature`).
//!
//! Pure: no clock, no I/O. Signature and algorithm are verified here; time
//! claims are left to [`crate::TokenValidator`].

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};

use crate::{AuthError, JwtConfig, SigningAlgorithm};

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], algorithm: SigningAlgorithm) -> Self {
        let algorithm: Algorithm = algorithm.into();

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.algorithm)
    }

    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token encoding failed: {e}")))
    }

    /// Verify the signature and deserialize the payload.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        jsonwebtoken::decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token decode failed");
                AuthError::TokenInvalid
            })
    }

    /// Read the payload without checking the signature.
    ///
    /// Diagnostics only; never use the result for an authentication decision.
    pub fn decode_unverified<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let mut validation = self.validation.clone();
        validation.insecure_disable_signature_validation();
        jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}
