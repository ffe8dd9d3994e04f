use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// A listening socket together with the port it occupies.
///
/// The port number only ever becomes visible through a lease, so whoever reads
/// it already holds the bound socket.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    listener: TcpListener,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    pub fn listener(&self) -> &TcpListener {
        &self.listener
    }

    /// Hands the socket to a tokio accept loop. Must be called inside a runtime.
    pub fn into_tokio(self) -> std::io::Result<(u16, tokio::net::TcpListener)> {
        self.listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(self.listener)?;
        Ok((self.port, listener))
    }
}

/// Scans `[start, end]` in ascending order and returns the first port that binds.
///
/// Every candidate is a real bind of a listening socket on the loopback
/// interface. `None` means the range is exhausted (or empty); the caller decides
/// whether that is fatal. Port 0 is skipped because the OS would pick an
/// arbitrary port instead.
pub fn find_and_bind(start: u16, end: u16) -> Option<PortLease> {
    if start > end {
        log::warn!("Ignoring inverted port range {start}-{end}");
        return None;
    }

    for port in start.max(1)..=end {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
            Ok(listener) => {
                log::debug!("Bound port {port}");
                return Some(PortLease { port, listener });
            }
            Err(err) => {
                log::trace!("Port {port} unavailable: {err}");
            }
        }
    }

    log::warn!("No bindable port in range {start}-{end}");
    None
}
