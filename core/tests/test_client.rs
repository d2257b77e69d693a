// Drives the `batchpipe-echo` binary the way a supervising process would:
// spawn it, read the announcement from its stdout, then talk over stdio and
// over extra socket channels.

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::net::Shutdown;
    use std::process::Command;
    use std::time::Duration;

    use batchpipe::client::{connect, ServerProcess};
    use batchpipe::constants::{env as keys, DEFAULT_PATH_PREFIX};
    use batchpipe::server::Token;

    fn echo_server(batch_size: usize, work_size: usize) -> ServerProcess {
        let mut command = Command::new(env!("CARGO_BIN_EXE_batchpipe-echo"));
        command
            .env(keys::BATCH_SIZE, batch_size.to_string())
            .env(keys::WORK_SIZE, work_size.to_string())
            .env_remove(keys::PATH_PREFIX);
        ServerProcess::spawn(command).unwrap()
    }

    #[test]
    fn stdio_and_socket_channels_echo() {
        let mut server = echo_server(64, 1);
        assert!(server.rendezvous().address.path().to_str().unwrap().starts_with(DEFAULT_PATH_PREFIX));

        server.stdin().write_all(b"hi").unwrap();
        server.stdin().flush().unwrap();
        let mut buf = [0u8; 2];
        server.stdout().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        let mut channel = server.connect().unwrap();
        channel.write_all(b"ee").unwrap();
        channel.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ee");

        server.stdin().write_all(b"ho").unwrap();
        server.stdin().flush().unwrap();
        server.stdout().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ho");

        let path = server.rendezvous().address.path().to_path_buf();
        let status = server.close().unwrap();
        assert!(status.success());
        assert!(!path.exists());
    }

    #[test]
    fn batched_server_holds_back_partial_work_units() {
        let mut server = echo_server(8, 2);

        let mut channel = server.connect().unwrap();
        channel.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        channel.write_all(b"x").unwrap();
        let mut buf = [0u8; 2];
        let err = channel.read(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

        channel.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        channel.write_all(b"y").unwrap();
        channel.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"xy");

        // A trailing odd byte still comes back once the channel closes.
        channel.write_all(b"z").unwrap();
        channel.shutdown(Shutdown::Write).unwrap();
        let mut rest = Vec::new();
        channel.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"z");

        assert!(server.close().unwrap().success());
    }

    #[test]
    fn wrong_token_gets_nothing_back() {
        let server = echo_server(64, 1);

        let mut forged = server.rendezvous().clone();
        forged.token = Token::generate();
        let mut channel = connect(&forged).unwrap();
        channel.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

        let mut buf = [0u8; 1];
        match channel.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
        }

        assert!(server.close().unwrap().success());
    }
}
