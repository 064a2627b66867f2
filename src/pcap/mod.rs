mod capture;
mod packet;

pub use capture::{CaptureController, DNS_FILTER, PacketSource, PcapSource};
pub use packet::{
    DNS_PORT, DecodedPacket, DnsHeader, DnsQuestion, IpLayer, LinkType, PortPair, decode_frame,
};

#[cfg(test)]
pub(crate) use packet::tests as frames;
#[cfg(test)]
pub(crate) use capture::tests as capture_tests;
