//! Core ticket mechanism for the mole tunnel broker.
//!
//! A client authenticates once and receives a ticket: an HMAC-tagged token
//! bound to its network address and an expiry instant. Later privileged
//! requests present the ticket instead of credentials. Re-initializing the
//! [`KeyState`] revokes every outstanding ticket at once.

pub mod error;
pub mod issuer;
pub mod key;
pub mod ticket;

pub use error::{Denied, KeyError, TicketError};
pub use issuer::{Clock, IssuedTicket, SystemClock, TicketAuthority, DEFAULT_TICKET_LIFETIME};
pub use key::KeyState;
pub use ticket::{grant, verify, Ticket, UnverifiedTicket};
