use crate::pcap::DecodedPacket;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

/// `YYYY-MM-DDTHH:MM:SSZ`, the format every timestamp in a snapshot uses
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Unknown,
}

impl TransportProtocol {
    /// Wire-facing name, `None` when the transport was not recognised
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::Udp => Some("UDP"),
            Self::Tcp => Some("TCP"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("-"))
    }
}

impl Serialize for TransportProtocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.name().serialize(serializer)
    }
}

/// One observed DNS message, reduced to the fields the aggregator counts.
///
/// Serialises with the field names consumers of `recent_queries` rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryEvent {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "src_ip")]
    pub source_address: Option<IpAddr>,
    #[serde(rename = "dst_ip")]
    pub dest_address: Option<IpAddr>,
    #[serde(rename = "protocol")]
    pub transport: TransportProtocol,
    #[serde(rename = "src_port")]
    pub source_port: Option<u16>,
    #[serde(rename = "dst_port")]
    pub dest_port: Option<u16>,
    #[serde(rename = "qname")]
    pub query_name: String,
    #[serde(rename = "qtype")]
    pub query_type: u16,
    #[serde(rename = "rcode")]
    pub response_code: Option<u8>,
    #[serde(rename = "response")]
    pub is_response: bool,
}

impl QueryEvent {
    /// Normalize a decoded packet observed at `now`.
    ///
    /// Returns `None` when the packet carries no DNS question. Missing IP,
    /// transport or DNS header layers leave the matching fields empty rather
    /// than rejecting the event.
    pub fn from_packet(packet: &DecodedPacket, now: DateTime<Utc>) -> Option<Self> {
        let question = packet.question.as_ref()?;

        let (transport, ports) = if let Some(udp) = packet.udp {
            (TransportProtocol::Udp, Some(udp))
        } else if let Some(tcp) = packet.tcp {
            (TransportProtocol::Tcp, Some(tcp))
        } else {
            (TransportProtocol::Unknown, None)
        };

        Some(Self {
            timestamp: now.trunc_subsecs(0),
            source_address: packet.ip.map(|ip| ip.src),
            dest_address: packet.ip.map(|ip| ip.dst),
            transport,
            source_port: ports.map(|p| p.src),
            dest_port: ports.map(|p| p.dst),
            query_name: String::from_utf8_lossy(&question.name).into_owned(),
            query_type: question.qtype,
            response_code: packet.dns.map(|h| h.rcode),
            is_response: packet.dns.is_some_and(|h| h.is_response),
        })
    }
}

pub(crate) fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcap::{DnsHeader, DnsQuestion, IpLayer, PortPair};
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::net::Ipv4Addr;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 15).unwrap()
    }

    fn question(name: &[u8], qtype: u16) -> Option<DnsQuestion> {
        Some(DnsQuestion {
            name: Bytes::copy_from_slice(name),
            qtype,
        })
    }

    fn header(is_response: bool, rcode: u8) -> Option<DnsHeader> {
        Some(DnsHeader {
            is_response,
            rcode,
            question_count: 1,
        })
    }

    #[test]
    fn packet_without_question_is_dropped() {
        let packet = DecodedPacket {
            dns: header(false, 0),
            ..DecodedPacket::default()
        };
        assert!(QueryEvent::from_packet(&packet, at()).is_none());
    }

    #[test]
    fn full_udp_packet() {
        let packet = DecodedPacket {
            ip: Some(IpLayer {
                src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            }),
            udp: Some(PortPair { src: 5353, dst: 53 }),
            tcp: None,
            dns: header(true, 3),
            question: question(b"Example.COM.", 1),
        };

        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        assert_eq!(event.source_address, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        assert_eq!(event.transport, TransportProtocol::Udp);
        assert_eq!(event.source_port, Some(5353));
        assert_eq!(event.dest_port, Some(53));
        assert_eq!(event.query_name, "Example.COM.");
        assert_eq!(event.response_code, Some(3));
        assert!(event.is_response);
    }

    #[test]
    fn udp_wins_over_tcp() {
        let packet = DecodedPacket {
            udp: Some(PortPair { src: 1, dst: 53 }),
            tcp: Some(PortPair { src: 2, dst: 5353 }),
            question: question(b"a.", 1),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        assert_eq!(event.transport, TransportProtocol::Udp);
        assert_eq!(event.dest_port, Some(53));
    }

    #[test]
    fn missing_layers_stay_absent() {
        let packet = DecodedPacket {
            question: question(b"bare.", 28),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        assert_eq!(event.source_address, None);
        assert_eq!(event.dest_address, None);
        assert_eq!(event.transport, TransportProtocol::Unknown);
        assert_eq!(event.source_port, None);
        assert_eq!(event.dest_port, None);
        assert_eq!(event.response_code, None);
        assert!(!event.is_response);
    }

    #[test]
    fn noerror_is_distinct_from_missing_header() {
        let packet = DecodedPacket {
            dns: header(false, 0),
            question: question(b"a.", 1),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        assert_eq!(event.response_code, Some(0));
    }

    #[test]
    fn invalid_utf8_is_substituted() {
        let packet = DecodedPacket {
            question: question(b"bad\xff\xfe.example.", 1),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        assert!(event.query_name.starts_with("bad"));
        assert!(event.query_name.ends_with(".example."));
        assert!(event.query_name.contains('\u{FFFD}'));
    }

    #[test]
    fn timestamp_is_second_precision() {
        let now = at() + chrono::Duration::milliseconds(750);
        let packet = DecodedPacket {
            question: question(b"a.", 1),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, now).unwrap();
        assert_eq!(event.timestamp, at());
        assert_eq!(
            serde_json::to_value(&event).unwrap()["timestamp"],
            "2024-03-09T12:30:15Z"
        );
    }

    #[test]
    fn serializes_with_consumer_field_names() {
        let packet = DecodedPacket {
            ip: Some(IpLayer {
                src: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 5)),
                dst: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            }),
            tcp: Some(PortPair { src: 40000, dst: 53 }),
            dns: header(false, 0),
            question: question(b"example.com.", 15),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": "2024-03-09T12:30:15Z",
                "src_ip": "192.168.0.5",
                "dst_ip": "1.1.1.1",
                "protocol": "TCP",
                "src_port": 40000,
                "dst_port": 53,
                "qname": "example.com.",
                "qtype": 15,
                "rcode": 0,
                "response": false,
            })
        );
    }

    #[test]
    fn unknown_transport_serializes_as_null() {
        let packet = DecodedPacket {
            question: question(b"a.", 1),
            ..DecodedPacket::default()
        };
        let event = QueryEvent::from_packet(&packet, at()).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["protocol"].is_null());
        assert!(json["src_ip"].is_null());
        assert!(json["rcode"].is_null());
    }
}
