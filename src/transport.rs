//! Datagram transport used by the client and the reflector.
//!
//! [`Transport`] is the narrow interface the measurement driver depends on.
//! [`UdpTransport`] implements it over an IPv4 UDP socket and reports the TTL
//! and TOS of every received datagram through `IP_RECVTTL`/`IP_RECVTOS`
//! control messages. No special privileges are required.

use std::{
    io::IoSliceMut,
    net::{SocketAddr, SocketAddrV4},
    os::fd::{AsRawFd, RawFd},
    time::Duration,
};

use nix::{
    libc,
    sys::socket::{recvmsg, ControlMessageOwned, MsgFlags, SockaddrStorage},
};
use thiserror::Error;
use tokio::{io::Interest, net::UdpSocket};

use crate::time::{self, Timestamp};

/// TTL and TOS read from the IP header of a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpDiagnostics {
    pub ttl: u8,
    pub tos: u8,
}

/// Metadata of one received datagram. The payload is in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    /// Number of payload bytes written to the buffer.
    pub len: usize,
    /// Sender of the datagram.
    pub source: SocketAddrV4,
    /// Local IP header fields.
    pub diagnostics: IpDiagnostics,
    /// Local clock sampled as soon as the datagram was read.
    pub received_at: Timestamp,
    /// The datagram did not fit the buffer and was cut.
    pub truncated: bool,
}

/// Transport failures. Everything except `Timeout` is fatal for a run.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no IPv4 address found for {0}")]
    NoIpv4Address(String),
    #[error("cannot create socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("cannot bind to address {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("no remote endpoint configured")]
    NoRemote,
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),
    #[error("timed out waiting for a datagram")]
    Timeout,
}

impl TransportError {
    /// True for the only non-fatal outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Datagram channel to a pre-resolved remote endpoint.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends one datagram to the remote endpoint.
    async fn send(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Waits at most `timeout` for one datagram.
    ///
    /// Returns `TransportError::Timeout` when nothing arrived in time.
    async fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Datagram, TransportError>;

    /// Local UDP port the transport is bound to.
    fn local_port(&self) -> u16;
}

/// Resolves `host` to its first IPv4 address.
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddrV4, TransportError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| TransportError::NoIpv4Address(host.to_string()))
}

/// IPv4 UDP socket reporting TTL/TOS of received datagrams.
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddrV4,
    remote: Option<SocketAddrV4>,
    cmsg_buf: Vec<u8>,
}

impl UdpTransport {
    /// Binds to `local` and enables TTL/TOS reception.
    ///
    /// A non-zero `tos` is applied to every outgoing datagram. Must be called
    /// from within a tokio runtime.
    pub fn bind(local: SocketAddrV4, tos: u8) -> Result<Self, TransportError> {
        let std_socket = std::net::UdpSocket::bind(local)
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        let fd = std_socket.as_raw_fd();

        set_ip_option(fd, libc::IP_RECVTTL, 1, "IP_RECVTTL")?;
        if let Err(e) = set_ip_option(fd, libc::IP_RECVTOS, 1, "IP_RECVTOS") {
            log::warn!("{} (received TOS will be reported as 0)", e);
        }
        if tos != 0 {
            set_ip_option(fd, libc::IP_TOS, tos as libc::c_int, "IP_TOS")?;
        }

        std_socket
            .set_nonblocking(true)
            .map_err(TransportError::Socket)?;

        // Port 0 binds are resolved by the kernel.
        let local = match std_socket.local_addr().map_err(TransportError::Socket)? {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => local,
        };
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::Socket)?;

        log::debug!("UDP transport bound to {}", local);
        Ok(Self {
            socket,
            local,
            remote: None,
            cmsg_buf: vec![0u8; 256],
        })
    }

    /// Sets the endpoint used by [`Transport::send`].
    pub fn with_remote(mut self, remote: SocketAddrV4) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Local address after binding.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local
    }

    /// Sends one datagram to an arbitrary endpoint.
    pub async fn send_to(&self, buf: &[u8], dest: SocketAddrV4) -> Result<(), TransportError> {
        self.socket
            .send_to(buf, SocketAddr::V4(dest))
            .await
            .map_err(TransportError::Send)?;
        Ok(())
    }

    /// Waits without a deadline for the next datagram from any source.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<Datagram, TransportError> {
        loop {
            self.socket
                .readable()
                .await
                .map_err(TransportError::Receive)?;

            let fd = self.socket.as_raw_fd();
            let cmsg_buf = &mut self.cmsg_buf;
            let result = self.socket.try_io(Interest::READABLE, || {
                let mut iov = [IoSliceMut::new(&mut *buf)];
                let msg = recvmsg::<SockaddrStorage>(
                    fd,
                    &mut iov,
                    Some(&mut *cmsg_buf),
                    MsgFlags::MSG_DONTWAIT,
                )?;

                let source = msg
                    .address
                    .as_ref()
                    .and_then(|addr| addr.as_sockaddr_in())
                    .map(|v4| SocketAddrV4::new(v4.ip(), v4.port()))
                    .ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            "datagram without an IPv4 source address",
                        )
                    })?;

                Ok((
                    msg.bytes,
                    source,
                    extract_diagnostics(&msg),
                    msg.flags.contains(MsgFlags::MSG_TRUNC),
                ))
            });

            match result {
                Ok((len, source, diagnostics, truncated)) => {
                    return Ok(Datagram {
                        len,
                        source,
                        diagnostics,
                        received_at: time::now(),
                        truncated,
                    })
                }
                // Spurious readiness; try_io already cleared it.
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(TransportError::Receive(e)),
            }
        }
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let remote = self.remote.ok_or(TransportError::NoRemote)?;
        self.send_to(buf, remote).await
    }

    async fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Datagram, TransportError> {
        match tokio::time::timeout(timeout, self.recv(buf)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn local_port(&self) -> u16 {
        self.local.port()
    }
}

fn set_ip_option(
    fd: RawFd,
    name: libc::c_int,
    value: libc::c_int,
    label: &'static str,
) -> Result<(), TransportError> {
    // SAFETY: `fd` is an open socket owned by the caller and `value` lives
    // for the duration of the call.
    let result = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_IP,
            name,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if result < 0 {
        return Err(TransportError::SocketOption {
            option: label,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Reads TTL and TOS from `IP_RECVTTL`/`IP_RECVTOS` control messages.
///
/// Fields the kernel did not report stay 0.
#[cfg(target_os = "linux")]
fn extract_diagnostics(msg: &nix::sys::socket::RecvMsg<SockaddrStorage>) -> IpDiagnostics {
    let mut diagnostics = IpDiagnostics::default();
    let Ok(cmsgs) = msg.cmsgs() else {
        return diagnostics;
    };

    for cmsg in cmsgs {
        match cmsg {
            ControlMessageOwned::Ipv4Ttl(ttl) => diagnostics.ttl = ttl.clamp(0, 255) as u8,
            ControlMessageOwned::Ipv4Tos(tos) => diagnostics.tos = tos,
            _ => continue,
        }
    }
    diagnostics
}

/// macOS variant: nix has no typed TTL/TOS messages there, so the raw
/// control messages are matched by type.
#[cfg(target_os = "macos")]
fn extract_diagnostics(msg: &nix::sys::socket::RecvMsg<SockaddrStorage>) -> IpDiagnostics {
    let mut diagnostics = IpDiagnostics::default();
    let Ok(cmsgs) = msg.cmsgs() else {
        return diagnostics;
    };

    for cmsg in cmsgs {
        if let ControlMessageOwned::Unknown(ref ucmsg) = cmsg {
            if ucmsg.cmsg_header.cmsg_level != libc::IPPROTO_IP {
                continue;
            }
            let Some(&value) = ucmsg.data_bytes.first() else {
                continue;
            };
            match ucmsg.cmsg_header.cmsg_type {
                libc::IP_RECVTTL => diagnostics.ttl = value,
                libc::IP_RECVTOS => diagnostics.tos = value,
                _ => {}
            }
        }
    }
    diagnostics
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn extract_diagnostics(_msg: &nix::sys::socket::RecvMsg<SockaddrStorage>) -> IpDiagnostics {
    IpDiagnostics::default()
}
