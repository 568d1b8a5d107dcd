use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::Error;
use crate::opts::Endpoint;

/// A buffered blocking TCP connection.
///
/// Grounded in `zero-mysql::sync::stream::Stream`, trimmed to the single
/// variant this protocol needs (no TLS, no Unix socket: both are Non-goals).
pub struct Stream(BufReader<TcpStream>);

impl Stream {
    /// Resolves and connects to `endpoint`, honoring `connect_timeout`
    /// and applying `tcp_nodelay` once connected.
    ///
    /// `original_source/src/net.c`'s `mongo_connect_helper` additionally
    /// disables `SIGPIPE` delivery for this socket; the idiomatic
    /// equivalent in Rust is to treat write-side EPIPE as a normal I/O
    /// error rather than mutate the process-wide signal disposition, so
    /// no `signal()` call is made here (see DESIGN.md).
    pub fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
        tcp_nodelay: bool,
    ) -> Result<Self, Error> {
        let addr = format!("{endpoint}")
            .to_socket_addrs()
            .map_err(|err| Error::ConnectFailed(format!("{endpoint}: {err}")))?
            .next()
            .ok_or_else(|| Error::ConnectFailed(format!("{endpoint}: no address resolved")))?;

        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|err| Error::ConnectFailed(format!("{endpoint}: {err}")))?;
        stream.set_nodelay(tcp_nodelay)?;
        Ok(Self(BufReader::new(stream)))
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.0.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.0.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Per spec.md §6/§7, a timed-out read/write must surface as a
    /// distinct error from a hard I/O failure (`WouldBlock`/`TimedOut` are
    /// what a blocking socket with `SO_RCVTIMEO`/`SO_SNDTIMEO` set returns
    /// on expiry).
    fn translate_timeout(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(err),
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.0.read_exact(buf).map_err(Self::translate_timeout)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.0
            .get_mut()
            .write_all(buf)
            .map_err(Self::translate_timeout)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.0.get_mut().flush().map_err(Error::from)
    }

    pub fn peer_is_loopback(&self) -> bool {
        self.0
            .get_ref()
            .peer_addr()
            .map(|addr| addr.ip().is_loopback())
            .unwrap_or(false)
    }

    pub fn into_inner(self) -> TcpStream {
        self.0.into_inner()
    }
}
