//! Issuing and checking tickets against the wall clock.
//!
//! [`TicketAuthority`] wraps a shared [`KeyState`] with a lifetime policy and a
//! clock. It is what request handlers hold: `issue` after primary
//! authentication, `authorize` before any privileged operation.

use crate::error::{Denied, KeyError, TicketError};
use crate::key::KeyState;
use crate::ticket::{self, Ticket, UnverifiedTicket};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Default ticket lifetime.
pub const DEFAULT_TICKET_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Source of the current instant in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

/// A freshly minted ticket and what it grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    /// The opaque ticket string to hand to the client.
    pub ticket: String,
    pub subject: String,
    pub valid_until: i64,
}

/// Ticket issuer and verifier bound to one key state.
#[derive(Clone)]
pub struct TicketAuthority {
    keys: Arc<KeyState>,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl TicketAuthority {
    /// Create an authority using the system clock.
    pub fn new(keys: Arc<KeyState>, lifetime: Duration) -> Self {
        Self::with_clock(keys, lifetime, Arc::new(SystemClock))
    }

    /// Create an authority with an explicit clock.
    pub fn with_clock(keys: Arc<KeyState>, lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            lifetime,
            clock,
        }
    }

    /// The shared key state.
    pub fn keys(&self) -> &Arc<KeyState> {
        &self.keys
    }

    /// How long issued tickets stay valid.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// The authority's current instant.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Mint a ticket for an authenticated `subject` connecting from `address`.
    pub fn issue(&self, subject: &str, address: &str) -> Result<IssuedTicket, TicketError> {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let valid_until = self.clock.now().saturating_add(lifetime);
        let ticket = ticket::grant(&self.keys, subject, address, valid_until)?;

        info!(subject, address, valid_until, "Issued ticket");
        Ok(IssuedTicket {
            ticket,
            subject: subject.to_string(),
            valid_until,
        })
    }

    /// Check a presented ticket for a caller at `observed_address`.
    ///
    /// Every failure is logged with its diagnostic code and returned as an
    /// opaque [`Denied`].
    pub fn authorize(&self, ticket: &str, observed_address: &str) -> Result<Ticket, Denied> {
        let now = self.clock.now();
        UnverifiedTicket::parse(ticket)
            .and_then(|t| t.verify(&self.keys, observed_address, now))
            .map_err(|reason| {
                warn!(
                    code = reason.code(),
                    observed_address,
                    "Ticket rejected: {}",
                    reason
                );
                Denied::from(reason)
            })
    }

    /// Replace the secret, revoking every ticket issued so far.
    pub fn revoke_all(&self) -> Result<u64, KeyError> {
        self.keys.initialize()
    }
}

impl std::fmt::Debug for TicketAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketAuthority")
            .field("keys", &self.keys)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
