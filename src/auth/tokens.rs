//! Stateless token codec: signed, tamper-evident access/refresh tokens.
//!
//! Claims are derived from the user's role set at mint time. A minted token
//! stays valid until its expiry or until the ephemeral registry drops it;
//! the codec itself keeps no state beyond the signing key.

use anyhow::Context;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Decoded token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id.
    pub sub: Uuid,
    /// Role names held by the subject when the token was minted.
    pub user_role: Vec<String>,
    pub kind: TokenKind,
    /// Random token id; makes every minted token string unique.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        secret_key: &SecretString,
        access_token_ttl_minutes: i64,
        refresh_token_ttl_minutes: i64,
    ) -> Self {
        let secret = secret_key.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_lifetime: Duration::minutes(access_token_ttl_minutes),
            refresh_lifetime: Duration::minutes(refresh_token_ttl_minutes),
        }
    }

    /// Mint a signed token for `user_id` carrying `role_names`.
    ///
    /// # Errors
    /// Returns an internal error if signing fails.
    pub fn mint(
        &self,
        user_id: Uuid,
        role_names: &[String],
        kind: TokenKind,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        };

        let claims = Claims {
            sub: user_id,
            user_role: role_names.to_vec(),
            kind,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .context("failed to mint token")?;
        Ok(token)
    }

    /// Mint an access/refresh pair from the same role snapshot.
    ///
    /// # Errors
    /// Returns an internal error if signing fails.
    pub fn mint_pair(
        &self,
        user_id: Uuid,
        role_names: &[String],
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.mint(user_id, role_names, TokenKind::Access)?,
            refresh_token: self.mint(user_id, role_names, TokenKind::Refresh)?,
        })
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidToken`] on signature mismatch, malformed
    /// payload, or expiry in the past.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    #[must_use]
    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    #[must_use]
    pub fn refresh_lifetime(&self) -> Duration {
        self.refresh_lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from("test-secret-key".to_string()), 15, 32312)
    }

    #[test]
    fn mint_decode_round_trip() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let roles = vec!["user".to_string(), "subscriber".to_string()];

        let token = codec.mint(user_id, &roles, TokenKind::Access).unwrap();
        let claims = codec.decode(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.user_role, roles);
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn pair_carries_both_kinds() {
        let codec = codec();
        let pair = codec.mint_pair(Uuid::new_v4(), &[]).unwrap();

        assert_eq!(
            codec.decode(&pair.access_token).unwrap().kind,
            TokenKind::Access
        );
        assert_eq!(
            codec.decode(&pair.refresh_token).unwrap().kind,
            TokenKind::Refresh
        );
    }

    #[test]
    fn minted_tokens_are_unique() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let first = codec.mint(user_id, &[], TokenKind::Refresh).unwrap();
        let second = codec.mint(user_id, &[], TokenKind::Refresh).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn tampered_signature_rejected() {
        let codec = codec();
        let other = TokenCodec::new(&SecretString::from("other-secret".to_string()), 15, 32312);

        let token = other
            .mint(Uuid::new_v4(), &[], TokenKind::Access)
            .unwrap();
        assert!(matches!(
            codec.decode(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn malformed_token_rejected() {
        let codec = codec();
        assert!(matches!(
            codec.decode("not.a.token"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let expired = TokenCodec::new(&SecretString::from("test-secret-key".to_string()), -5, -5);
        let token = expired
            .mint(Uuid::new_v4(), &[], TokenKind::Access)
            .unwrap();

        let codec = codec();
        assert!(matches!(
            codec.decode(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
