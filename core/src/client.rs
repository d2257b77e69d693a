//! Supervisor side of the protocol: launch a server, learn its rendezvous,
//! and open extra authenticated channels to it.

use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::server::rendezvous::Rendezvous;
use crate::server::types::RendezvousError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to spawn server: {0}")]
    Spawn(#[from] io::Error),

    #[error("server did not announce a rendezvous: {0}")]
    Rendezvous(#[from] RendezvousError),

    #[error("server {0} was not piped")]
    MissingPipe(&'static str),
}

/// Open a new channel to a running server and present its token.
/// Everything written afterwards is pipeline input.
pub fn connect(rendezvous: &Rendezvous) -> io::Result<UnixStream> {
    let mut stream = UnixStream::connect(rendezvous.address.path())?;
    stream.write_all(rendezvous.token.as_bytes())?;
    Ok(stream)
}

/// A server child process whose stdin/stdout form the primary channel.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    rendezvous: Rendezvous,
}

impl ServerProcess {
    /// Spawn `command` with piped stdio and block until it has announced
    /// its rendezvous.
    pub fn spawn(mut command: Command) -> Result<Self, ClientError> {
        command.stdin(Stdio::piped()).stdout(Stdio::piped());
        let mut child = command.spawn()?;

        let (stdin, mut stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            (None, _) => return Err(reap(child, ClientError::MissingPipe("stdin"))),
            (_, None) => return Err(reap(child, ClientError::MissingPipe("stdout"))),
        };

        match Rendezvous::read_from(&mut stdout) {
            Ok(rendezvous) => Ok(Self {
                child,
                stdin,
                stdout,
                rendezvous,
            }),
            Err(e) => Err(reap(child, e.into())),
        }
    }

    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    /// Primary channel, input side.
    pub fn stdin(&mut self) -> &mut ChildStdin {
        &mut self.stdin
    }

    /// Primary channel, output side.
    pub fn stdout(&mut self) -> &mut ChildStdout {
        &mut self.stdout
    }

    pub fn connect(&self) -> io::Result<UnixStream> {
        connect(&self.rendezvous)
    }

    /// End the primary channel and wait for the server to exit.
    pub fn close(self) -> io::Result<ExitStatus> {
        let ServerProcess { mut child, stdin, stdout, .. } = self;
        drop(stdin);
        drop(stdout);
        child.wait()
    }
}

fn reap(mut child: Child, err: ClientError) -> ClientError {
    let _ = child.kill();
    let _ = child.wait();
    err
}
