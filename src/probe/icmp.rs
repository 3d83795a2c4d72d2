use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpType, IcmpTypes};
use std::time::{SystemTime, UNIX_EPOCH};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// IPv4 header without options, used for the "bytes of data" banner
pub const IPV4_HEADER_SIZE: usize = 20;
/// Default payload size (standard ping)
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
/// Largest payload that fits in one IPv4 datagram
pub const MAX_PAYLOAD_SIZE: usize = 65527;
/// Payload bytes used for the send timestamp when room allows
const TIMESTAMP_SIZE: usize = 8;

/// ICMPv6 Echo Request type
pub const ICMPV6_ECHO_REQUEST: u8 = 128;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMP Echo Request packet with `payload_size` payload bytes
///
/// Set ipv6=true to build an ICMPv6 Echo Request; its checksum is filled in
/// by the kernel.
///
/// Payload layout:
/// - Bytes 0-7: send time in microseconds since the epoch (when it fits)
/// - Remaining: pattern fill
pub fn build_echo_request(
    identifier: u16,
    sequence: u16,
    payload_size: usize,
    ipv6: bool,
) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload_size];

    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        if ipv6 {
            packet.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST));
        } else {
            packet.set_icmp_type(IcmpTypes::EchoRequest);
        }
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
    }

    let payload = &mut buffer[ICMP_HEADER_SIZE..];
    let pattern_start = if payload.len() >= TIMESTAMP_SIZE {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        payload[..TIMESTAMP_SIZE].copy_from_slice(&micros.to_be_bytes());
        TIMESTAMP_SIZE
    } else {
        0
    };

    for (i, byte) in payload[pattern_start..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }

    if !ipv6 {
        let cksum = pnet::packet::util::checksum(&buffer, 1);
        buffer[2..4].copy_from_slice(&cksum.to_be_bytes());
    }

    buffer
}
