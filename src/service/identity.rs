//! Bearer-token identity resolution.
//!
//! The platform's real identity provider sits outside this service; the
//! gateway only needs `token -> (account, role)`. [`SharedSecretIdentity`]
//! is a self-contained provider for deployments that share an HMAC key
//! with whatever issues the tokens.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::{AccountId, Actor, Role};
use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Resolves a bearer token into an authenticated [`Actor`].
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Validates `token`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] for malformed, forged or
    /// unknown tokens.
    fn resolve_identity(&self, token: &str) -> Result<Actor, GatewayError>;

    /// Issues a token for `actor`, if this provider can mint tokens.
    fn issue_token(&self, _actor: &Actor) -> Option<String> {
        None
    }
}

/// Tokens of the form `<account uuid>.<role>.<hex hmac-sha256>`.
pub struct SharedSecretIdentity {
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedSecretIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretIdentity").finish_non_exhaustive()
    }
}

impl SharedSecretIdentity {
    /// Creates a provider over the shared key.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn mac(&self, claims: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(claims.as_bytes());
        Some(mac)
    }

    /// Issues a token for `actor`.
    #[must_use]
    pub fn issue(&self, actor: &Actor) -> String {
        let claims = format!("{}.{}", actor.account_id, actor.role);
        let sig = self
            .mac(&claims)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{claims}.{sig}")
    }
}

impl IdentityProvider for SharedSecretIdentity {
    fn resolve_identity(&self, token: &str) -> Result<Actor, GatewayError> {
        let Some((claims, sig)) = token.rsplit_once('.') else {
            return Err(GatewayError::Unauthenticated);
        };
        let sig = hex::decode(sig).map_err(|_| GatewayError::Unauthenticated)?;
        let verified = self
            .mac(claims)
            .is_some_and(|mac| mac.verify_slice(&sig).is_ok());
        if !verified {
            return Err(GatewayError::Unauthenticated);
        }

        let Some((account, role)) = claims.split_once('.') else {
            return Err(GatewayError::Unauthenticated);
        };
        let account_id = account
            .parse::<uuid::Uuid>()
            .map(AccountId::from_uuid)
            .map_err(|_| GatewayError::Unauthenticated)?;
        let role = role
            .parse::<Role>()
            .map_err(|_| GatewayError::Unauthenticated)?;
        Ok(Actor { account_id, role })
    }

    fn issue_token(&self, actor: &Actor) -> Option<String> {
        Some(self.issue(actor))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_resolve() {
        let identity = SharedSecretIdentity::new("secret");
        let actor = Actor {
            account_id: AccountId::new(),
            role: Role::Admin,
        };
        let token = identity.issue(&actor);
        let Ok(resolved) = identity.resolve_identity(&token) else {
            panic!("token should resolve");
        };
        assert_eq!(resolved, actor);
    }

    #[test]
    fn forged_role_is_rejected() {
        let identity = SharedSecretIdentity::new("secret");
        let actor = Actor {
            account_id: AccountId::new(),
            role: Role::User,
        };
        let token = identity.issue(&actor);
        let forged = token.replacen(".user.", ".admin.", 1);
        assert!(matches!(
            identity.resolve_identity(&forged),
            Err(GatewayError::Unauthenticated)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let identity = SharedSecretIdentity::new("secret");
        for token in ["", "abc", "a.b.c", "not-a-uuid.user.00"] {
            tokio_test::assert_err!(identity.resolve_identity(token));
        }
    }
}
