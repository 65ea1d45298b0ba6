use std::{
    fmt,
    io::{self, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs as _},
    time::Duration,
};

pub mod sync;

/// A connection to the proxy.
pub(crate) type Connection = Box<dyn Write + Send>;

/// Opens connections to a remote endpoint.
///
/// Transports only ever talk to the network through a `Dialer`, which keeps connection establishment pluggable.
pub(crate) trait Dialer: Send + Sync {
    /// Opens a new connection.
    fn dial(&self) -> io::Result<Connection>;

    /// Returns a human-readable description of the remote endpoint.
    fn address(&self) -> &str;
}

/// A resolved TCP endpoint.
#[derive(Clone)]
pub(crate) struct RemoteAddr {
    display: String,
    addrs: Vec<SocketAddr>,
}

impl RemoteAddr {
    /// Resolves the given host and port.
    pub fn resolve(host: &str, port: u16) -> Result<Self, String> {
        let addrs = (host, port).to_socket_addrs().map_err(|e| e.to_string())?.collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(format!("'{host}' did not resolve to any addresses"));
        }

        Ok(RemoteAddr { display: format!("{host}:{port}"), addrs })
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Transport configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TransportConfiguration {
    pub flush_interval: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

/// Dials plain TCP connections.
pub(crate) struct TcpDialer {
    remote_addr: RemoteAddr,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpDialer {
    pub fn new(remote_addr: RemoteAddr, config: &TransportConfiguration) -> Self {
        TcpDialer {
            remote_addr,
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
        }
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> io::Result<Connection> {
        let mut last_error = None;
        for addr in &self.remote_addr.addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(self.write_timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(stream));
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to dial")))
    }

    fn address(&self) -> &str {
        &self.remote_addr.display
    }
}
