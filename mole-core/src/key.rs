//! Process-held secret used to tag tickets.
//!
//! The secret is never persisted. Calling [`KeyState::initialize`] replaces it,
//! which invalidates every ticket minted under the previous secret. That is
//! the only way to revoke tickets.

use crate::error::KeyError;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info};

type HmacSha256 = Hmac<Sha256>;

/// Secret length in bytes.
pub const SECRET_LEN: usize = 32;

/// Length of an HMAC-SHA256 tag in bytes.
pub const TAG_LEN: usize = 32;

struct Slot {
    /// `None` after a failed re-initialization; everything fails closed.
    secret: Option<[u8; SECRET_LEN]>,
    generation: u64,
}

/// Shared ticket secret with explicit re-initialization.
///
/// Tag computation holds the read lock for its whole duration, so a
/// concurrent [`initialize`](Self::initialize) is observed either entirely
/// before or entirely after it.
pub struct KeyState {
    slot: RwLock<Slot>,
}

impl KeyState {
    /// Create a key state with a fresh secret from the operating system.
    pub fn new() -> Result<Self, KeyError> {
        Self::from_rng(&mut OsRng)
    }

    /// Create a key state with a secret drawn from `rng`.
    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyError> {
        let secret = fresh_secret(rng)?;
        info!(generation = 1, "Ticket key initialized");
        Ok(Self {
            slot: RwLock::new(Slot {
                secret: Some(secret),
                generation: 1,
            }),
        })
    }

    /// Replace the secret with a fresh one, revoking all outstanding tickets.
    ///
    /// Returns the new key generation.
    pub fn initialize(&self) -> Result<u64, KeyError> {
        self.initialize_from(&mut OsRng)
    }

    /// Replace the secret with one drawn from `rng`.
    ///
    /// The previous secret is discarded even if `rng` fails. In that case no
    /// ticket can be granted or verified until a later call succeeds.
    pub fn initialize_from<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<u64, KeyError> {
        let fresh = fresh_secret(rng);

        let mut slot = self.write();
        slot.generation += 1;
        match fresh {
            Ok(secret) => {
                slot.secret = Some(secret);
                info!(generation = slot.generation, "Ticket key re-initialized, outstanding tickets revoked");
                Ok(slot.generation)
            }
            Err(e) => {
                slot.secret = None;
                error!(generation = slot.generation, "Ticket key discarded without replacement: {}", e);
                Err(e)
            }
        }
    }

    /// Number of times a secret has been installed or discarded.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Whether a secret is currently installed.
    pub fn is_available(&self) -> bool {
        self.read().secret.is_some()
    }

    /// Compute the tag for `payload` under the current secret.
    pub(crate) fn sign(&self, payload: &[u8]) -> Option<[u8; TAG_LEN]> {
        let slot = self.read();
        let mut mac = new_mac(slot.secret.as_ref()?)?;
        mac.update(payload);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Some(tag)
    }

    /// Check `tag` against `payload` under the current secret in constant time.
    pub(crate) fn verify(&self, payload: &[u8], tag: &[u8]) -> bool {
        let slot = self.read();
        let Some(mut mac) = slot.secret.as_ref().and_then(new_mac) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(tag).is_ok()
    }

    // The slot is plain data written in a single assignment, so a poisoned
    // lock cannot hold a torn secret.
    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.read();
        f.debug_struct("KeyState")
            .field("generation", &slot.generation)
            .field("available", &slot.secret.is_some())
            .finish_non_exhaustive()
    }
}

fn new_mac(secret: &[u8; SECRET_LEN]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret).ok()
}

fn fresh_secret<R: RngCore + CryptoRng>(rng: &mut R) -> Result<[u8; SECRET_LEN], KeyError> {
    let mut secret = [0u8; SECRET_LEN];
    rng.try_fill_bytes(&mut secret)?;
    Ok(secret)
}
