//! Direct connections to dial targets

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};

/// A direct connection to the dial target named by a CONNECT frame.
#[derive(Debug)]
pub enum Upstream {
    Tcp(TcpStream),
    Udp(UdpConn),
}

/// Resolves and dials `address` with the given transport name.
///
/// `tcp4`/`udp4` and `tcp6`/`udp6` restrict resolution to the matching
/// address family, like their Go `net` counterparts.
pub async fn dial_upstream(proto: &str, address: &str) -> io::Result<Upstream> {
    match proto {
        "tcp" | "tcp4" | "tcp6" => {
            let addr = resolve(proto, address).await?;
            Ok(Upstream::Tcp(TcpStream::connect(addr).await?))
        }
        "udp" | "udp4" | "udp6" => {
            let addr = resolve(proto, address).await?;
            let bind: SocketAddr = if addr.is_ipv4() {
                (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let socket = UdpSocket::bind(bind).await?;
            socket.connect(addr).await?;
            Ok(Upstream::Udp(UdpConn { socket }))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported proto {other:?}"),
        )),
    }
}

async fn resolve(proto: &str, address: &str) -> io::Result<SocketAddr> {
    let want_v4 = proto.ends_with('4');
    let want_v6 = proto.ends_with('6');
    lookup_host(address)
        .await?
        .find(|addr| (!want_v4 || addr.is_ipv4()) && (!want_v6 || addr.is_ipv6()))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {proto} address for {address}"),
            )
        })
}

/// A connected UDP socket presented as a byte channel.
///
/// Each write is one datagram out, each read one datagram in; datagram
/// boundaries are not preserved across the tunnel byte stream.
#[derive(Debug)]
pub struct UdpConn {
    socket: UdpSocket,
}

impl AsyncRead for UdpConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for Upstream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Upstream::Udp(conn) => Pin::new(conn).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Upstream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Upstream::Udp(conn) => Pin::new(conn).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Upstream::Udp(conn) => Pin::new(conn).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Upstream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Upstream::Udp(conn) => Pin::new(conn).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_dial() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut upstream = dial_upstream("tcp", &addr.to_string()).await.unwrap();
        upstream.write_all(b"ok").await.unwrap();
        let mut buf = [0u8; 2];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");

        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_udp_dial() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..n], peer).await.unwrap();
        });

        let mut upstream = dial_upstream("udp", &addr.to_string()).await.unwrap();
        upstream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let n = upstream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp6_rejects_v4_only_address() {
        let err = dial_upstream("tcp6", "127.0.0.1:80").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unsupported_proto() {
        let err = dial_upstream("sctp", "127.0.0.1:80").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_refused_dial_errors() {
        // Port 1 on loopback is essentially never listening.
        assert!(dial_upstream("tcp", "127.0.0.1:1").await.is_err());
    }
}
