//! Rendezvous material: the shared token, the socket address, and the
//! 64-byte announcement that carries both to a supervising process.
//!
//! Wire layout, no separators beyond the one newline:
//!
//! ```text
//! | 31-byte socket path | '\n' | 32 lowercase hex chars |
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;

use crate::constants::{ENDPOINT_LEN, RENDEZVOUS_LEN, SEED_LEN, TOKEN_LEN};
use crate::server::types::{BrokerError, RendezvousError};

fn random_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut seed);
    seed
}

/// Shared secret every socket client must send first. Hex ASCII.
#[derive(Clone, PartialEq, Eq)]
pub struct Token([u8; TOKEN_LEN]);

impl Token {
    pub const LEN: usize = TOKEN_LEN;

    pub fn generate() -> Self {
        let mut repr = [0u8; TOKEN_LEN];
        repr.copy_from_slice(hex::encode(random_seed()).as_bytes());
        Token(repr)
    }

    /// Parse the hex form as it appears on the wire.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, RendezvousError> {
        if bytes.len() != TOKEN_LEN {
            return Err(RendezvousError::Malformed(format!(
                "token is {} bytes, expected {TOKEN_LEN}",
                bytes.len()
            )));
        }
        if !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(RendezvousError::Malformed("token is not hex".into()));
        }
        let mut repr = [0u8; TOKEN_LEN];
        repr.copy_from_slice(bytes);
        Ok(Token(repr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Constant-time comparison against bytes received from a peer.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        candidate.len() == TOKEN_LEN && bool::from(self.0[..].ct_eq(candidate))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Socket path plus trailing newline, always `ENDPOINT_LEN` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointAddress([u8; ENDPOINT_LEN]);

impl EndpointAddress {
    pub const LEN: usize = ENDPOINT_LEN;

    /// `prefix` followed by the padded URL-safe base64 of 16 random bytes,
    /// with the final padding character turned into the newline.
    pub fn generate(prefix: &str) -> Result<Self, BrokerError> {
        let rendered = format!("{prefix}{}", URL_SAFE.encode(random_seed()));
        if rendered.len() != ENDPOINT_LEN {
            return Err(BrokerError::InvariantViolation(format!(
                "endpoint address is not {ENDPOINT_LEN} bytes: {rendered}"
            )));
        }
        let mut repr = [0u8; ENDPOINT_LEN];
        repr.copy_from_slice(rendered.as_bytes());
        repr[ENDPOINT_LEN - 1] = b'\n';
        Self::from_wire(&repr).map_err(|e| BrokerError::InvariantViolation(e.to_string()))
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, RendezvousError> {
        if bytes.len() != ENDPOINT_LEN {
            return Err(RendezvousError::Malformed(format!(
                "address is {} bytes, expected {ENDPOINT_LEN}",
                bytes.len()
            )));
        }
        let (path, tail) = bytes.split_at(ENDPOINT_LEN - 1);
        if tail != b"\n" {
            return Err(RendezvousError::Malformed("address does not end in a newline".into()));
        }
        if path.iter().any(|&b| b == b'\n' || b == 0) {
            return Err(RendezvousError::Malformed("address path contains a newline or NUL".into()));
        }
        let mut repr = [0u8; ENDPOINT_LEN];
        repr.copy_from_slice(bytes);
        Ok(EndpointAddress(repr))
    }

    /// Filesystem path, without the newline.
    pub fn path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.0[..ENDPOINT_LEN - 1]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EndpointAddress").field(&self.path()).finish()
    }
}

/// Address and token, fixed for the lifetime of a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendezvous {
    pub address: EndpointAddress,
    pub token: Token,
}

impl Rendezvous {
    pub const LEN: usize = RENDEZVOUS_LEN;

    /// Fresh address and an independently drawn token.
    pub fn generate(prefix: &str) -> Result<Self, BrokerError> {
        let address = EndpointAddress::generate(prefix)?;
        Ok(Self { address, token: Token::generate() })
    }

    pub fn encode(&self) -> [u8; RENDEZVOUS_LEN] {
        let mut out = [0u8; RENDEZVOUS_LEN];
        out[..ENDPOINT_LEN].copy_from_slice(self.address.as_bytes());
        out[ENDPOINT_LEN..].copy_from_slice(self.token.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RendezvousError> {
        if bytes.len() != RENDEZVOUS_LEN {
            return Err(RendezvousError::Malformed(format!(
                "rendezvous is {} bytes, expected {RENDEZVOUS_LEN}",
                bytes.len()
            )));
        }
        let (address, token) = bytes.split_at(ENDPOINT_LEN);
        Ok(Self {
            address: EndpointAddress::from_wire(address)?,
            token: Token::from_wire(token)?,
        })
    }

    /// Read exactly one announcement from a server's primary output.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, RendezvousError> {
        let mut buf = [0u8; RENDEZVOUS_LEN];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_token() {
        let token = Token::generate();
        let shown = format!("{token:?}");
        assert!(!shown.contains(std::str::from_utf8(token.as_bytes()).unwrap()));
    }

    #[test]
    fn matches_rejects_wrong_length() {
        let token = Token::generate();
        assert!(token.matches(token.as_bytes()));
        assert!(!token.matches(&token.as_bytes()[..TOKEN_LEN - 1]));
    }
}
