use anyhow::{Context, Result, anyhow};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Socket with metadata about type (for DGRAM-aware parsing)
#[derive(Debug)]
pub struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets, kernel-owned identifier)
    pub is_dgram: bool,
}

/// Create a raw ICMP socket
pub fn create_raw_icmp_socket(ipv6: bool) -> io::Result<Socket> {
    let (domain, protocol) = if ipv6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Create an unprivileged ICMP socket (SOCK_DGRAM)
///
/// Requires the process group to fall inside `net.ipv4.ping_group_range`
/// on Linux.
pub fn create_dgram_icmp_socket(ipv6: bool) -> io::Result<Socket> {
    let (domain, protocol) = if ipv6 {
        (Domain::IPV6, Protocol::ICMPV6)
    } else {
        (Domain::IPV4, Protocol::ICMPV4)
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Open the ICMP socket used for both sending and receiving
///
/// Prefers RAW, falls back to DGRAM for unprivileged ICMP.
pub fn open_icmp_socket(ipv6: bool) -> Result<SocketInfo> {
    match create_raw_icmp_socket(ipv6) {
        Ok(socket) => {
            return Ok(SocketInfo {
                socket,
                is_dgram: false,
            });
        }
        Err(e) => log::debug!("Raw ICMP socket unavailable: {}", e),
    }

    match create_dgram_icmp_socket(ipv6) {
        Ok(socket) => {
            log::warn!("Using unprivileged ICMP sockets");
            Ok(SocketInfo {
                socket,
                is_dgram: true,
            })
        }
        Err(e) => {
            let binary_path = std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "pinglog".to_string());

            Err(anyhow!(
                "Insufficient permissions for ICMP sockets ({}).\n\n\
                 Fix options:\n\
                 \u{2022} Run with sudo: sudo pinglog <host>\n\
                 \u{2022} Add capability: sudo setcap cap_net_raw+ep {}\n\
                 \u{2022} Enable unprivileged ICMP: sudo sysctl -w net.ipv4.ping_group_range='0 65534'",
                e,
                binary_path
            ))
        }
    }
}

/// Set TTL (IPv4) or unicast hop limit (IPv6) on a socket
pub fn set_ttl(socket: &Socket, ttl: u8, ipv6: bool) -> Result<()> {
    if ipv6 {
        socket
            .set_unicast_hops_v6(ttl as u32)
            .context("failed to set hop limit")?;
    } else {
        socket.set_ttl(ttl as u32).context("failed to set TTL")?;
    }
    Ok(())
}

/// Poll interval for blocking receives
pub fn set_poll_timeout(socket: &Socket, timeout: Duration) -> Result<()> {
    socket.set_read_timeout(Some(timeout))?;
    Ok(())
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: IpAddr) -> io::Result<usize> {
    let addr = SocketAddr::new(target, 0);
    socket.send_to(packet, &SockAddr::from(addr))
}

/// Result of receiving an ICMP packet with TTL info
#[derive(Debug)]
pub struct RecvResult {
    pub len: usize,
    pub source: IpAddr,
    /// TTL/hop-limit from ancillary data, when the kernel supplied it
    pub response_ttl: Option<u8>,
}

/// Enable IP_RECVTTL/IPV6_RECVHOPLIMIT socket option
/// This allows recvmsg() to return the TTL of received packets in ancillary data
#[cfg(unix)]
pub fn enable_recv_ttl(socket: &Socket, ipv6: bool) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    #[cfg(target_os = "linux")]
    const IP_RECVTTL: libc::c_int = 12;
    #[cfg(target_os = "linux")]
    const IPV6_RECVHOPLIMIT: libc::c_int = 51;
    #[cfg(not(target_os = "linux"))]
    const IP_RECVTTL: libc::c_int = 24;
    #[cfg(not(target_os = "linux"))]
    const IPV6_RECVHOPLIMIT: libc::c_int = 37;

    let (level, optname) = if ipv6 {
        (libc::IPPROTO_IPV6, IPV6_RECVHOPLIMIT)
    } else {
        (libc::IPPROTO_IP, IP_RECVTTL)
    };

    let val: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            optname,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of_val(&val) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn enable_recv_ttl(_socket: &Socket, _ipv6: bool) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "TTL ancillary data is not available on this platform",
    ))
}

/// Receive ICMP packet with response TTL from control message
/// Uses recvmsg() to access ancillary data containing TTL/hop-limit
#[cfg(unix)]
pub fn recv_icmp_with_ttl(socket: &Socket, buffer: &mut [u8], ipv6: bool) -> io::Result<RecvResult> {
    use std::os::unix::io::AsRawFd;

    let mut iov = libc::iovec {
        iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
        iov_len: buffer.len(),
    };

    let mut cmsg_buf = [0u8; 64];
    let mut src_storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut src_storage as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    // msg_controllen type differs: usize on Linux, u32 on macOS
    msg.msg_controllen = cmsg_buf.len() as _;

    let len = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }

    let source = parse_sockaddr_storage(&src_storage)?;
    let response_ttl = extract_ttl_from_cmsg(&msg, ipv6);

    Ok(RecvResult {
        len: len as usize,
        source,
        response_ttl,
    })
}

#[cfg(not(unix))]
pub fn recv_icmp_with_ttl(socket: &Socket, buffer: &mut [u8], _ipv6: bool) -> io::Result<RecvResult> {
    use std::mem::MaybeUninit;

    // SAFETY: recv_from only writes initialized bytes into the buffer
    let uninit = unsafe { &mut *(buffer as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (len, addr) = socket.recv_from(uninit)?;
    let source = addr
        .as_socket()
        .map(|a| a.ip())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IP source address"))?;

    Ok(RecvResult {
        len,
        source,
        response_ttl: None,
    })
}

/// Extract TTL/hop limit from control message
#[cfg(unix)]
fn extract_ttl_from_cmsg(msg: &libc::msghdr, ipv6: bool) -> Option<u8> {
    // Linux: IP_TTL = 2
    // macOS: IP_TTL = 4, but IP_RECVTTL = 24 may be delivered instead
    #[cfg(target_os = "linux")]
    fn is_ip_ttl_type(cmsg_type: libc::c_int) -> bool {
        cmsg_type == 2
    }
    #[cfg(not(target_os = "linux"))]
    fn is_ip_ttl_type(cmsg_type: libc::c_int) -> bool {
        cmsg_type == 4 || cmsg_type == 24
    }

    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;

            let matches = if ipv6 {
                hdr.cmsg_level == libc::IPPROTO_IPV6 && hdr.cmsg_type == libc::IPV6_HOPLIMIT
            } else {
                hdr.cmsg_level == libc::IPPROTO_IP && is_ip_ttl_type(hdr.cmsg_type)
            };

            if matches {
                let data_ptr = libc::CMSG_DATA(cmsg);
                let ttl = std::ptr::read_unaligned(data_ptr as *const i32);
                return Some(ttl as u8);
            }

            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
    None
}

/// Parse sockaddr_storage to IpAddr
#[cfg(unix)]
fn parse_sockaddr_storage(storage: &libc::sockaddr_storage) -> io::Result<IpAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let addr: &libc::sockaddr_in = unsafe { &*(storage as *const _ as *const _) };
            let ip = std::net::Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            Ok(IpAddr::V4(ip))
        }
        libc::AF_INET6 => {
            let addr: &libc::sockaddr_in6 = unsafe { &*(storage as *const _ as *const _) };
            let ip = std::net::Ipv6Addr::from(addr.sin6_addr.s6_addr);
            Ok(IpAddr::V6(ip))
        }
        family => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unknown address family: {}", family),
        )),
    }
}

/// Whether a receive error only means nothing arrived before the poll timeout
pub fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
