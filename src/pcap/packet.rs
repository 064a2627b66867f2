use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const DNS_PORT: u16 = 53;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Maximum number of compression pointers followed while reading a name
const MAX_POINTER_JUMPS: usize = 10;
/// RFC 1035 Section 2.3.4
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// Link-layer framing of captured frames, keyed by libpcap DLT value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Linux cooked capture v1, produced by the `any` pseudo-device
    LinuxSll,
    LinuxSll2,
    /// Bare IPv4/IPv6 with no link header (tun devices, WireGuard)
    RawIp,
    /// BSD loopback: 4-byte address family before the IP header
    Loopback,
    Other(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => Self::Ethernet,
            113 => Self::LinuxSll,
            276 => Self::LinuxSll2,
            12 | 14 | 101 | 228 | 229 => Self::RawIp,
            0 | 108 => Self::Loopback,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpLayer {
    pub src: IpAddr,
    pub dst: IpAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub src: u16,
    pub dst: u16,
}

impl PortPair {
    fn touches(&self, port: u16) -> bool {
        self.src == port || self.dst == port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    /// QR bit: false = query, true = response
    pub is_response: bool,
    pub rcode: u8,
    pub question_count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    /// Labels joined by `.` with a trailing `.`; bytes are kept as they
    /// appeared on the wire and may not be valid UTF-8.
    pub name: Bytes,
    pub qtype: u16,
}

/// One captured frame broken into the layers the analyzer reads.
///
/// Every layer is optional: a frame may carry an IP header but a transport
/// the decoder does not understand, or a DNS header whose question section
/// is truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    pub ip: Option<IpLayer>,
    pub udp: Option<PortPair>,
    pub tcp: Option<PortPair>,
    pub dns: Option<DnsHeader>,
    pub question: Option<DnsQuestion>,
}

/// Decode a raw captured frame.
///
/// Returns `None` for frames that are too short for their link header or do
/// not carry IPv4/IPv6. Anything past the IP layer degrades to absent layers
/// instead of rejecting the frame.
pub fn decode_frame(link_type: LinkType, data: &[u8]) -> Option<DecodedPacket> {
    let network = strip_link_header(link_type, data)?;
    decode_ip(network)
}

fn strip_link_header(link_type: LinkType, data: &[u8]) -> Option<&[u8]> {
    match link_type {
        // [0-5] dst MAC, [6-11] src MAC, [12-13] EtherType, optional 802.1Q tag
        LinkType::Ethernet => {
            if data.len() < 14 {
                return None;
            }
            let mut ether_type = be16(data, 12);
            let mut offset = 14;
            if ether_type == ETHERTYPE_VLAN {
                if data.len() < 18 {
                    return None;
                }
                ether_type = be16(data, 16);
                offset = 18;
            }
            is_ip_ethertype(ether_type).then(|| &data[offset..])
        }
        // 16-byte header, protocol type in the last two bytes
        LinkType::LinuxSll => {
            if data.len() < 16 {
                return None;
            }
            is_ip_ethertype(be16(data, 14)).then(|| &data[16..])
        }
        // 20-byte header, protocol type first
        LinkType::LinuxSll2 => {
            if data.len() < 20 {
                return None;
            }
            is_ip_ethertype(be16(data, 0)).then(|| &data[20..])
        }
        LinkType::RawIp => Some(data),
        // The family word is host-endian on some platforms, so the IP
        // version nibble is what decode_ip goes by.
        LinkType::Loopback => data.get(4..),
        LinkType::Other(_) => None,
    }
}

fn is_ip_ethertype(ether_type: u16) -> bool {
    ether_type == ETHERTYPE_IPV4 || ether_type == ETHERTYPE_IPV6
}

fn decode_ip(data: &[u8]) -> Option<DecodedPacket> {
    let version = *data.first()? >> 4;
    let (ip, protocol, payload) = match version {
        4 => parse_ipv4(data)?,
        6 => parse_ipv6(data)?,
        _ => return None,
    };

    let mut packet = DecodedPacket {
        ip: Some(ip),
        ..DecodedPacket::default()
    };

    let Some(payload) = payload else {
        return Some(packet);
    };

    let dns_message = match protocol {
        IPPROTO_UDP => parse_udp(payload).and_then(|(ports, body)| {
            packet.udp = Some(ports);
            ports.touches(DNS_PORT).then_some(body)
        }),
        IPPROTO_TCP => parse_tcp(payload).and_then(|(ports, body)| {
            packet.tcp = Some(ports);
            if ports.touches(DNS_PORT) {
                strip_tcp_length_prefix(body)
            } else {
                None
            }
        }),
        _ => None,
    };

    if let Some(message) = dns_message {
        let (header, question) = parse_dns_message(message);
        packet.dns = header;
        packet.question = question;
    }

    Some(packet)
}

/// Parse IPv4 header (RFC 791)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Version|  IHL  |Type of Service|          Total Length         |
/// |         Identification        |Flags|      Fragment Offset    |
/// |  Time to Live |    Protocol   |         Header Checksum       |
/// |                       Source Address                          |
/// |                    Destination Address                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Returns the addresses, the protocol number and the payload. The payload
/// is `None` for non-first fragments, which carry no transport header.
fn parse_ipv4(data: &[u8]) -> Option<(IpLayer, u8, Option<&[u8]>)> {
    if data.len() < 20 {
        return None;
    }

    let header_len = (data[0] & 0x0F) as usize * 4;
    if header_len < 20 || header_len > data.len() {
        return None;
    }

    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let ip = IpLayer {
        src: IpAddr::V4(src),
        dst: IpAddr::V4(dst),
    };

    let fragment_offset = be16(data, 6) & 0x1FFF;
    if fragment_offset != 0 {
        return Some((ip, data[9], None));
    }

    // Total Length bounds the payload; Ethernet pads short frames
    let total_len = (be16(data, 2) as usize).clamp(header_len, data.len());

    Some((ip, data[9], Some(&data[header_len..total_len])))
}

/// Parse IPv6 fixed header (RFC 8200). Extension headers are not walked.
fn parse_ipv6(data: &[u8]) -> Option<(IpLayer, u8, Option<&[u8]>)> {
    if data.len() < 40 {
        return None;
    }

    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&data[8..24]);
    dst.copy_from_slice(&data[24..40]);
    let ip = IpLayer {
        src: IpAddr::V6(Ipv6Addr::from(src)),
        dst: IpAddr::V6(Ipv6Addr::from(dst)),
    };

    let payload_end = (40 + be16(data, 4) as usize).min(data.len());

    Some((ip, data[6], Some(&data[40..payload_end])))
}

/// UDP header (RFC 768): ports, length, checksum; 8 bytes.
fn parse_udp(data: &[u8]) -> Option<(PortPair, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let ports = PortPair {
        src: be16(data, 0),
        dst: be16(data, 2),
    };
    let end = (be16(data, 4) as usize).clamp(8, data.len());
    Some((ports, &data[8..end]))
}

/// TCP header (RFC 9293). Ports survive even when the data offset is bogus;
/// the payload is then treated as empty.
fn parse_tcp(data: &[u8]) -> Option<(PortPair, &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let ports = PortPair {
        src: be16(data, 0),
        dst: be16(data, 2),
    };
    let data_offset = data.get(12).map_or(0, |b| (b >> 4) as usize * 4);
    if data_offset < 20 || data_offset > data.len() {
        return Some((ports, &data[..0]));
    }
    Some((ports, &data[data_offset..]))
}

/// DNS over TCP prefixes each message with a 2-byte length (RFC 1035 4.2.2).
fn strip_tcp_length_prefix(segment: &[u8]) -> Option<&[u8]> {
    if segment.len() < 2 {
        return None;
    }
    let message_len = be16(segment, 0) as usize;
    let end = (2 + message_len).min(segment.len());
    Some(&segment[2..end])
}

/// Parse DNS header and first question (RFC 1035 Section 4.1)
///
/// ```text
///  0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                      ID                       |
/// |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
/// |                    QDCOUNT                    |
/// |                    ANCOUNT                    |
/// |                    NSCOUNT                    |
/// |                    ARCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
fn parse_dns_message(data: &[u8]) -> (Option<DnsHeader>, Option<DnsQuestion>) {
    if data.len() < 12 {
        return (None, None);
    }

    let flags = be16(data, 2);
    let header = DnsHeader {
        is_response: flags & 0x8000 != 0,
        rcode: (flags & 0x000F) as u8,
        question_count: be16(data, 4),
    };

    if header.question_count == 0 {
        return (Some(header), None);
    }

    let mut offset = 12;
    let question = parse_domain_name(data, &mut offset).and_then(|name| {
        if offset + 4 > data.len() {
            return None;
        }
        Some(DnsQuestion {
            name,
            qtype: be16(data, offset),
        })
    });

    (Some(header), question)
}

/// Read a domain name with compression support (RFC 1035 Section 4.1.4).
///
/// Labels are joined with `.` and the name keeps its trailing `.`; the root
/// name decodes to `"."`. Pointer chains are capped at [`MAX_POINTER_JUMPS`].
/// On success `offset` points just past the name in the original position.
fn parse_domain_name(data: &[u8], offset: &mut usize) -> Option<Bytes> {
    let mut name = Vec::new();
    let mut cursor = *offset;
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(cursor)? as usize;

        if len == 0 {
            cursor += 1;
            break;
        }

        // Pointer: top two bits set, 14-bit offset from message start
        if len & 0xC0 == 0xC0 {
            let low = *data.get(cursor + 1)? as usize;
            if resume_at.is_none() {
                resume_at = Some(cursor + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return None;
            }
            cursor = ((len & 0x3F) << 8) | low;
            continue;
        }

        if len > MAX_LABEL_LEN {
            return None;
        }

        let label = data.get(cursor + 1..cursor + 1 + len)?;
        name.extend_from_slice(label);
        name.push(b'.');
        cursor += 1 + len;

        if name.len() > MAX_NAME_LEN {
            return None;
        }
    }

    if name.is_empty() {
        name.push(b'.');
    }

    *offset = resume_at.unwrap_or(cursor);
    Some(Bytes::from(name))
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode `www.example.com` style names as uncompressed labels.
    pub(crate) fn encode_name(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for label in name.split('.').filter(|l| !l.is_empty()) {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }

    pub(crate) fn dns_message(flags: u16, name: &str, qtype: u16) -> Vec<u8> {
        let mut msg = vec![0x12, 0x34];
        msg.extend_from_slice(&flags.to_be_bytes());
        msg.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
        msg.extend_from_slice(&encode_name(name));
        msg.extend_from_slice(&qtype.to_be_bytes());
        msg.extend_from_slice(&[0, 1]);
        msg
    }

    fn ipv4_header(protocol: u8, payload_len: usize) -> Vec<u8> {
        let total = (20 + payload_len) as u16;
        let mut ip = vec![0x45, 0];
        ip.extend_from_slice(&total.to_be_bytes());
        ip.extend_from_slice(&[0, 0, 0, 0, 64, protocol, 0, 0]);
        ip.extend_from_slice(&[192, 168, 1, 10]);
        ip.extend_from_slice(&[8, 8, 8, 8]);
        ip
    }

    pub(crate) fn ethernet_udp_frame(src_port: u16, dst_port: u16, dns: &[u8]) -> Vec<u8> {
        let mut udp = Vec::new();
        udp.extend_from_slice(&src_port.to_be_bytes());
        udp.extend_from_slice(&dst_port.to_be_bytes());
        udp.extend_from_slice(&((8 + dns.len()) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(dns);

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(&ipv4_header(IPPROTO_UDP, udp.len()));
        frame.extend_from_slice(&udp);
        frame
    }

    fn ethernet_tcp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut tcp = Vec::new();
        tcp.extend_from_slice(&src_port.to_be_bytes());
        tcp.extend_from_slice(&dst_port.to_be_bytes());
        tcp.extend_from_slice(&[0; 8]);
        tcp.push(5 << 4);
        tcp.extend_from_slice(&[0x18, 0, 0, 0, 0, 0, 0]);
        tcp.extend_from_slice(payload);

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(&ipv4_header(IPPROTO_TCP, tcp.len()));
        frame.extend_from_slice(&tcp);
        frame
    }

    #[test]
    fn decodes_udp_query() {
        let dns = dns_message(0x0100, "www.example.com", 1);
        let frame = ethernet_udp_frame(40000, 53, &dns);

        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        let ip = packet.ip.unwrap();
        assert_eq!(ip.src, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(ip.dst, IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(packet.udp, Some(PortPair { src: 40000, dst: 53 }));
        assert!(packet.tcp.is_none());

        let header = packet.dns.unwrap();
        assert!(!header.is_response);
        assert_eq!(header.rcode, 0);

        let question = packet.question.unwrap();
        assert_eq!(&question.name[..], b"www.example.com.");
        assert_eq!(question.qtype, 1);
    }

    #[test]
    fn decodes_response_rcode() {
        // QR=1, RD=1, RA=1, RCODE=3
        let dns = dns_message(0x8183, "missing.example", 28);
        let frame = ethernet_udp_frame(53, 40000, &dns);

        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        let header = packet.dns.unwrap();
        assert!(header.is_response);
        assert_eq!(header.rcode, 3);
        assert_eq!(packet.question.unwrap().qtype, 28);
    }

    #[test]
    fn decodes_tcp_with_length_prefix() {
        let dns = dns_message(0x0100, "example.org", 16);
        let mut payload = (dns.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(&dns);
        let frame = ethernet_tcp_frame(51515, 53, &payload);

        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        assert_eq!(packet.tcp, Some(PortPair { src: 51515, dst: 53 }));
        assert!(packet.udp.is_none());
        assert_eq!(&packet.question.unwrap().name[..], b"example.org.");
    }

    #[test]
    fn bare_tcp_segment_has_no_dns() {
        let frame = ethernet_tcp_frame(51515, 53, &[]);
        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        assert!(packet.tcp.is_some());
        assert!(packet.dns.is_none());
        assert!(packet.question.is_none());
    }

    #[test]
    fn non_dns_port_is_not_parsed_as_dns() {
        let dns = dns_message(0x0100, "example.com", 1);
        let frame = ethernet_udp_frame(40000, 443, &dns);
        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        assert!(packet.udp.is_some());
        assert!(packet.question.is_none());
    }

    #[test]
    fn ignores_non_ip_ethertype() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&0x0806u16.to_be_bytes());
        frame.extend_from_slice(&[0; 28]);
        assert!(decode_frame(LinkType::Ethernet, &frame).is_none());
        assert!(decode_frame(LinkType::Ethernet, &[0u8; 10]).is_none());
    }

    #[test]
    fn follows_compression_pointer() {
        // Header, then a name that is only a pointer back to offset 12
        let mut msg = dns_message(0x0100, "a.example", 1);
        let first_len = msg.len();
        msg.extend_from_slice(&[0xC0, 12]);

        let mut offset = first_len;
        let name = parse_domain_name(&msg, &mut offset).unwrap();
        assert_eq!(&name[..], b"a.example.");
        assert_eq!(offset, first_len + 2);
    }

    #[test]
    fn pointer_loop_is_rejected() {
        let mut msg = vec![0u8; 12];
        msg.extend_from_slice(&[0xC0, 12]);
        let mut offset = 12;
        assert!(parse_domain_name(&msg, &mut offset).is_none());
    }

    #[test]
    fn root_name_is_a_single_dot() {
        let mut offset = 0;
        let name = parse_domain_name(&[0], &mut offset).unwrap();
        assert_eq!(&name[..], b".");
        assert_eq!(offset, 1);
    }

    #[test]
    fn truncated_question_keeps_header() {
        let mut dns = dns_message(0x8180, "example.com", 1);
        dns.truncate(dns.len() - 3);
        let frame = ethernet_udp_frame(53, 40000, &dns);

        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        assert!(packet.dns.is_some());
        assert!(packet.question.is_none());
    }

    #[test]
    fn linux_cooked_capture() {
        let dns = dns_message(0x0100, "example.net", 1);
        let ethernet = ethernet_udp_frame(40000, 53, &dns);

        let mut frame = vec![0u8; 14];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(&ethernet[14..]);

        let packet = decode_frame(LinkType::LinuxSll, &frame).unwrap();
        assert_eq!(&packet.question.unwrap().name[..], b"example.net.");
    }

    #[test]
    fn non_first_fragment_has_no_transport() {
        let dns = dns_message(0x0100, "example.com", 1);
        let mut frame = ethernet_udp_frame(40000, 53, &dns);
        // fragment offset = 1 (in 8-byte units)
        frame[14 + 6] = 0x00;
        frame[14 + 7] = 0x01;

        let packet = decode_frame(LinkType::Ethernet, &frame).unwrap();
        assert!(packet.ip.is_some());
        assert!(packet.udp.is_none());
        assert!(packet.question.is_none());
    }
}
