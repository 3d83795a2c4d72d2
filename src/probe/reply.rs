use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;

use crate::probe::icmp::ICMP_HEADER_SIZE;

/// ICMPv6 Echo Reply type
const ICMPV6_ECHO_REPLY: u8 = 129;

/// An echo reply decoded from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
    /// Bytes following the ICMP header
    pub payload_len: usize,
    /// TTL from the IPv4 header, when the socket delivers one
    pub ttl: Option<u8>,
}

/// Calculate ICMP checksum (RFC 1071)
/// Returns true if checksum is valid (sums to 0xFFFF or 0x0000 after folding)
fn validate_icmp_checksum(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    let mut sum: u32 = 0;

    let mut i = 0;
    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }

    // Handle odd byte
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum == 0xFFFF || sum == 0x0000
}

/// Parse an echo reply from a received datagram
///
/// Raw IPv4 sockets deliver the IP header; datagram sockets and IPv6 raw
/// sockets start directly at the ICMP header. Anything that is not a
/// well-formed echo reply yields `None`. Identifier filtering is left to the
/// caller since datagram sockets rewrite it.
pub fn parse_echo_reply(data: &[u8], ipv6: bool, is_dgram: bool) -> Option<EchoReply> {
    if ipv6 {
        return parse_icmpv6(data);
    }

    if is_dgram {
        return parse_icmpv4(data, None);
    }

    let ip_packet = Ipv4Packet::new(data)?;
    if ip_packet.get_version() != 4 {
        return None;
    }
    let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
    if data.len() < ip_header_len + ICMP_HEADER_SIZE {
        return None;
    }

    parse_icmpv4(&data[ip_header_len..], Some(ip_packet.get_ttl()))
}

fn parse_icmpv4(icmp_data: &[u8], ttl: Option<u8>) -> Option<EchoReply> {
    let icmp_packet = IcmpPacket::new(icmp_data)?;
    if icmp_data.len() < ICMP_HEADER_SIZE || icmp_packet.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }

    if !validate_icmp_checksum(icmp_data) {
        return None;
    }

    Some(read_echo_fields(icmp_data, ttl))
}

/// ICMPv6 checksums cover a pseudo-header and are verified by the kernel
fn parse_icmpv6(icmp_data: &[u8]) -> Option<EchoReply> {
    if icmp_data.len() < ICMP_HEADER_SIZE || icmp_data[0] != ICMPV6_ECHO_REPLY {
        return None;
    }
    Some(read_echo_fields(icmp_data, None))
}

fn read_echo_fields(icmp_data: &[u8], ttl: Option<u8>) -> EchoReply {
    EchoReply {
        identifier: u16::from_be_bytes([icmp_data[4], icmp_data[5]]),
        sequence: u16::from_be_bytes([icmp_data[6], icmp_data[7]]),
        payload_len: icmp_data.len() - ICMP_HEADER_SIZE,
        ttl,
    }
}
