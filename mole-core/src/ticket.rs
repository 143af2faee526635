//! Ticket wire format, granting and verification.
//!
//! A ticket is a single URL-safe base64 token (no padding) over
//!
//! ```text
//! version:u8 | len:u16 | subject | len:u16 | bound_address | valid_until:i64 | tag:[u8; 32]
//! ```
//!
//! with big-endian integers and an HMAC-SHA256 tag over everything before it.
//! Length prefixes make any field content representable, so no escaping is
//! needed.

use crate::error::TicketError;
use crate::key::{KeyState, TAG_LEN};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tracing::debug;

const FORMAT_VERSION: u8 = 1;

/// Longest subject or address accepted.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

const MAX_PAYLOAD_LEN: usize = 1 + 2 * (2 + MAX_FIELD_LEN) + 8;

/// Longest ticket string that can possibly decode.
const MAX_TICKET_LEN: usize = (MAX_PAYLOAD_LEN + TAG_LEN).div_ceil(3) * 4;

/// The authenticated content of a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Identity the ticket grants access to.
    pub subject: String,
    /// Network address the ticket is valid from.
    pub bound_address: String,
    /// Last instant (Unix seconds) at which the ticket is accepted.
    pub valid_until: i64,
}

impl Ticket {
    /// Create ticket contents.
    pub fn new(subject: impl Into<String>, bound_address: impl Into<String>, valid_until: i64) -> Self {
        Self {
            subject: subject.into(),
            bound_address: bound_address.into(),
            valid_until,
        }
    }

    /// Encode and tag these contents under the current secret.
    pub fn seal(&self, keys: &KeyState) -> Result<String, TicketError> {
        let mut bytes = self.payload()?;
        let tag = keys.sign(&bytes).ok_or(TicketError::KeyUnavailable)?;
        bytes.extend_from_slice(&tag);
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Whether the ticket is past its validity instant at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.valid_until
    }

    fn payload(&self) -> Result<Vec<u8>, TicketError> {
        let subject = field_len(&self.subject, "subject is empty", "subject is too long")?;
        let address = field_len(
            &self.bound_address,
            "bound address is empty",
            "bound address is too long",
        )?;

        let mut out = Vec::with_capacity(1 + 2 + self.subject.len() + 2 + self.bound_address.len() + 8);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&subject.to_be_bytes());
        out.extend_from_slice(self.subject.as_bytes());
        out.extend_from_slice(&address.to_be_bytes());
        out.extend_from_slice(self.bound_address.as_bytes());
        out.extend_from_slice(&self.valid_until.to_be_bytes());
        Ok(out)
    }

    fn from_payload(payload: &[u8]) -> Result<Self, TicketError> {
        let (&version, rest) = payload.split_first().ok_or(TicketError::Malformed)?;
        if version != FORMAT_VERSION {
            return Err(TicketError::Malformed);
        }

        let (subject, rest) = take_field(rest)?;
        let (bound_address, rest) = take_field(rest)?;
        let valid_until: [u8; 8] = rest.try_into().map_err(|_| TicketError::Malformed)?;

        Ok(Self {
            subject,
            bound_address,
            valid_until: i64::from_be_bytes(valid_until),
        })
    }
}

/// A decoded ticket whose tag has not been checked yet.
///
/// Nothing in [`fields`](Self::fields) may be trusted until
/// [`verify`](Self::verify) succeeds.
#[derive(Debug, Clone)]
pub struct UnverifiedTicket {
    fields: Ticket,
    payload: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl UnverifiedTicket {
    /// Decode a ticket string.
    pub fn parse(ticket: &str) -> Result<Self, TicketError> {
        if ticket.len() > MAX_TICKET_LEN {
            return Err(TicketError::Malformed);
        }

        let mut bytes = URL_SAFE_NO_PAD
            .decode(ticket)
            .map_err(|_| TicketError::Malformed)?;
        if bytes.len() <= TAG_LEN {
            return Err(TicketError::Malformed);
        }

        let tag_bytes = bytes.split_off(bytes.len() - TAG_LEN);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&tag_bytes);

        let fields = Ticket::from_payload(&bytes)?;
        Ok(Self {
            fields,
            payload: bytes,
            tag,
        })
    }

    /// The claimed, unauthenticated contents.
    pub fn fields(&self) -> &Ticket {
        &self.fields
    }

    /// The tag as lowercase hex.
    pub fn tag_hex(&self) -> String {
        hex::encode(self.tag)
    }

    /// Authenticate the ticket, then check its address binding and expiry.
    ///
    /// Checks run in that order so no field is consulted before the tag is
    /// known to be genuine.
    pub fn verify(self, keys: &KeyState, observed_address: &str, now: i64) -> Result<Ticket, TicketError> {
        if !keys.verify(&self.payload, &self.tag) {
            return Err(TicketError::TamperedOrStale);
        }
        if self.fields.bound_address != observed_address {
            return Err(TicketError::AddressMismatch);
        }
        if self.fields.is_expired_at(now) {
            return Err(TicketError::Expired);
        }
        Ok(self.fields)
    }
}

/// Mint a ticket for `subject`, usable from `bound_address` until `valid_until`.
pub fn grant(
    keys: &KeyState,
    subject: &str,
    bound_address: &str,
    valid_until: i64,
) -> Result<String, TicketError> {
    let ticket = Ticket::new(subject, bound_address, valid_until).seal(keys)?;
    debug!(subject, bound_address, valid_until, "Granted ticket");
    Ok(ticket)
}

/// Validate `ticket` for a caller at `observed_address` at instant `now`.
///
/// Returns the subject on success.
pub fn verify(keys: &KeyState, ticket: &str, observed_address: &str, now: i64) -> Result<String, TicketError> {
    let verified = UnverifiedTicket::parse(ticket)?.verify(keys, observed_address, now)?;
    Ok(verified.subject)
}

fn field_len(value: &str, empty: &'static str, too_long: &'static str) -> Result<u16, TicketError> {
    if value.is_empty() {
        return Err(TicketError::Encoding(empty));
    }
    u16::try_from(value.len()).map_err(|_| TicketError::Encoding(too_long))
}

fn take_field(buf: &[u8]) -> Result<(String, &[u8]), TicketError> {
    if buf.len() < 2 {
        return Err(TicketError::Malformed);
    }
    let (len, rest) = buf.split_at(2);
    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
    if len == 0 || rest.len() < len {
        return Err(TicketError::Malformed);
    }

    let (field, rest) = rest.split_at(len);
    let field = std::str::from_utf8(field).map_err(|_| TicketError::Malformed)?;
    Ok((field.to_string(), rest))
}
