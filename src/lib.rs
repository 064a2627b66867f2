//! Passive DNS traffic analytics.
//!
//! Frames from a [`pcap::PacketSource`] are decoded, normalized into
//! [`dns::QueryEvent`]s and folded into a shared [`dns::Aggregator`] by the
//! [`pcap::CaptureController`]'s worker. [`api::Monitor`] bundles both behind
//! the operations a dashboard or transport layer calls.

pub mod api;
pub mod dns;
pub mod error;
pub mod pcap;

pub use api::{CaptureInfo, CaptureStatus, Health, Monitor};
pub use dns::{Aggregator, QueryEvent, StatsSnapshot};
pub use error::{ApiError, CaptureError};
