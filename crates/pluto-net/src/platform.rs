//! Socket options shared by the listener and every peer stream.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

/// Options applied to game sockets.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm; game messages are small and latency bound.
    pub tcp_nodelay: bool,
    /// Enable `SO_REUSEADDR` on the listener so a restarted host can rebind.
    pub reuse_addr: bool,
    /// Pending-connection backlog for the listener.
    pub backlog: i32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            reuse_addr: !cfg!(target_os = "windows"),
            backlog: 16,
        }
    }
}

/// Apply socket options to a freshly accepted or connected stream.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)
}

/// Create a non-blocking listener registered with the current Tokio runtime.
///
/// Must be called from within a runtime context.
pub fn create_listener(addr: SocketAddr, config: &SocketConfig) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.backlog)?;

    TcpListener::from_std(socket.into())
}

/// The address a host binds to when no interface is configured.
pub fn host_bind_address(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_accepts_on_ephemeral_port() {
        let config = SocketConfig::default();
        let listener = create_listener("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        configure_stream(&client, &config).unwrap();
        configure_stream(&server, &config).unwrap();
        assert!(client.nodelay().unwrap());
        assert!(server.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_nodelay_disabled_when_configured() {
        let config = SocketConfig {
            tcp_nodelay: false,
            ..Default::default()
        };
        let listener =
            create_listener("127.0.0.1:0".parse().unwrap(), &SocketConfig::default()).unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        configure_stream(&client, &config).unwrap();
        assert!(!client.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_rebind_after_close() {
        let config = SocketConfig::default();
        let listener = create_listener("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let again = create_listener(addr, &config);
        assert!(again.is_ok(), "rebinding {addr} failed: {:?}", again.err());
    }

    #[test]
    fn test_host_bind_address_is_unspecified() {
        let addr = host_bind_address(32500);
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 32500);
    }
}
