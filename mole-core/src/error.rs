//! Error types for ticket issuance and verification.
//!
//! [`TicketError`] carries the precise reason a ticket was refused and is meant
//! for local logging. Anything facing a remote caller should go through
//! [`Denied`], which displays the same message whatever the reason.

use thiserror::Error;

/// Failure to produce a ticket key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The secure random source could not fill the secret.
    #[error("Secure random source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// Reasons a ticket cannot be granted or verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketError {
    /// A field cannot be represented in the wire format.
    #[error("Ticket field cannot be encoded: {0}")]
    Encoding(&'static str),
    /// The key state holds no secret (a re-initialization failed).
    #[error("Ticket key unavailable")]
    KeyUnavailable,
    /// The ticket string does not decode to the expected structure.
    #[error("Malformed ticket")]
    Malformed,
    /// The tag does not match: forged, corrupted or minted under an old key.
    #[error("Ticket signature mismatch")]
    TamperedOrStale,
    /// The ticket is bound to a different network address.
    #[error("Ticket bound to a different address")]
    AddressMismatch,
    /// The ticket's validity instant has passed.
    #[error("Ticket expired")]
    Expired,
}

impl TicketError {
    /// Stable diagnostic code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            TicketError::Encoding(_) => "encoding_error",
            TicketError::KeyUnavailable => "key_unavailable",
            TicketError::Malformed => "malformed_ticket",
            TicketError::TamperedOrStale => "tampered_or_stale",
            TicketError::AddressMismatch => "address_mismatch",
            TicketError::Expired => "expired",
        }
    }
}

/// Opaque authorization refusal.
///
/// Displays as "not authorized" for every underlying reason so that callers
/// cannot turn the verifier into an oracle. The reason survives only as a
/// diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not authorized")]
pub struct Denied {
    reason: TicketError,
}

impl Denied {
    /// Diagnostic code of the underlying reason, for logs only.
    pub fn code(&self) -> &'static str {
        self.reason.code()
    }
}

impl From<TicketError> for Denied {
    fn from(reason: TicketError) -> Self {
        Self { reason }
    }
}
