use std::io::{ErrorKind, Read};

use crate::server::rendezvous::Token;
use crate::server::types::AuthError;

/// Consume and check the token prefix of a freshly accepted connection.
///
/// Reads exactly `Token::LEN` bytes. On success the connection is
/// positioned at the first pipeline byte. Nothing is ever written back.
pub fn authenticate<S: Read>(conn: &mut S, token: &Token) -> Result<(), AuthError> {
    let mut received = [0u8; Token::LEN];
    let mut filled = 0;
    while filled < received.len() {
        match conn.read(&mut received[filled..]) {
            Ok(0) => {
                return Err(AuthError::ShortToken { received: filled, expected: Token::LEN });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(AuthError::Io(e)),
        }
    }

    if token.matches(&received) {
        Ok(())
    } else {
        Err(AuthError::TokenMismatch)
    }
}
