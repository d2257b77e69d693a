#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use batchpipe::server::{authenticate, AuthError, Token};

    fn wire(prefix: &[u8], payload: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(payload);
        Cursor::new(bytes)
    }

    #[test]
    fn correct_token_leaves_payload_unread() {
        let token = Token::generate();
        let mut conn = wire(token.as_bytes(), b"payload");

        authenticate(&mut conn, &token).unwrap();

        let mut rest = Vec::new();
        conn.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"payload");
    }

    #[test]
    fn another_token_is_a_mismatch() {
        let token = Token::generate();
        let other = Token::generate();
        let mut conn = wire(other.as_bytes(), b"payload");

        assert!(matches!(authenticate(&mut conn, &token), Err(AuthError::TokenMismatch)));
    }

    #[test]
    fn single_flipped_byte_is_a_mismatch() {
        let token = Token::generate();
        let mut forged = token.as_bytes().to_vec();
        forged[Token::LEN - 1] = if forged[Token::LEN - 1] == b'0' { b'1' } else { b'0' };

        assert!(matches!(
            authenticate(&mut wire(&forged, b""), &token),
            Err(AuthError::TokenMismatch)
        ));
    }

    #[test]
    fn truncated_token_is_short() {
        let token = Token::generate();
        let mut conn = wire(&token.as_bytes()[..10], b"");

        match authenticate(&mut conn, &token) {
            Err(AuthError::ShortToken { received, expected }) => {
                assert_eq!(received, 10);
                assert_eq!(expected, Token::LEN);
            }
            other => panic!("expected short token, got {other:?}"),
        }
    }

    #[test]
    fn silent_peer_is_short() {
        let token = Token::generate();
        assert!(matches!(
            authenticate(&mut wire(b"", b""), &token),
            Err(AuthError::ShortToken { received: 0, .. })
        ));
    }
}
