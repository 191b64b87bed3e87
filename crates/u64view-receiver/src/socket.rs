use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tracing::info;

/// Bind `port` on all interfaces and join `group` on `interface`.
///
/// Address reuse is enabled so several viewers on one host can share the
/// stream. Must be called from within a tokio runtime.
pub fn bind_multicast(
    group: Ipv4Addr,
    interface: Ipv4Addr,
    port: u16,
    recv_buffer_size: usize,
) -> Result<UdpSocket> {
    if !group.is_multicast() {
        bail!("{} is not a multicast address", group);
    }

    let sock = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .with_context(|| "failed to create UDP socket")?;
    sock.set_reuse_address(true)
        .with_context(|| "failed to set SO_REUSEADDR")?;
    let _ = sock.set_recv_buffer_size(recv_buffer_size);

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    sock.bind(&addr.into())
        .with_context(|| format!("failed to bind UDP on {}", addr))?;
    sock.join_multicast_v4(&group, &interface)
        .with_context(|| format!("failed to join {} on {}", group, interface))?;
    sock.set_nonblocking(true)
        .with_context(|| "failed to set non-blocking")?;

    let std_sock: std::net::UdpSocket = sock.into();
    let socket =
        UdpSocket::from_std(std_sock).with_context(|| "failed to wrap UDP socket in tokio")?;

    info!(%group, %interface, port, "joined multicast group");
    Ok(socket)
}
