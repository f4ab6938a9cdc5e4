//! Single-use authorization codes.
//!
//! Codes live in a [`DashMap`] keyed by the opaque code. Redemption uses
//! `DashMap::remove`, which takes the shard write lock, so the lookup and the
//! delete happen atomically: of any number of concurrent redeemers of one code,
//! at most one gets the grant back.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default lifetime of an unredeemed code.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(300);

/// What a code was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// User id of the principal that authorized the request
    pub subject: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// OpenID Connect nonce, echoed into the ID token
    pub nonce: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingCode {
    grant: AuthorizationGrant,
    expires_at: Instant,
}

impl PendingCode {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Why a redemption did not yield a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemError {
    /// Never issued, or already redeemed
    Unknown,
    Expired,
}

#[derive(Clone)]
pub struct CodeRegistry {
    codes: Arc<DashMap<String, PendingCode>>,
    ttl: Duration,
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL)
    }
}

impl CodeRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Mint a fresh code bound to `grant`.
    pub fn issue(&self, grant: AuthorizationGrant) -> String {
        let pending = PendingCode {
            grant,
            expires_at: Instant::now() + self.ttl,
        };
        loop {
            let code = generate_token();
            // never overwrite a live code
            if let Entry::Vacant(slot) = self.codes.entry(code.clone()) {
                slot.insert(pending);
                return code;
            }
        }
    }

    /// Remove the code and hand back its grant. Expired codes are removed too.
    pub fn redeem(&self, code: &str) -> Result<AuthorizationGrant, RedeemError> {
        let (_, pending) = self.codes.remove(code).ok_or(RedeemError::Unknown)?;
        if pending.is_expired() {
            return Err(RedeemError::Expired);
        }
        Ok(pending.grant)
    }

    /// Drop every expired code, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, pending| !pending.is_expired());
        before.saturating_sub(self.codes.len())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// How often [`spawn_purge_task`] sweeps expired codes.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn a background task that drops expired codes every [`PURGE_INTERVAL`].
pub fn spawn_purge_task(registry: CodeRegistry) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = registry.purge_expired();
            if purged > 0 {
                tracing::debug!(
                    purged,
                    remaining = registry.len(),
                    "Purged expired authorization codes"
                );
            }
        }
    })
}

/// 32 random bytes, base64url encoded without padding.
pub fn generate_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    // The OS RNG failing leaves nothing sensible to issue
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
