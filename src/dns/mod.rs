mod aggregator;
mod event;
pub mod types;

pub use aggregator::{
    Aggregator, MAX_RECENT_EVENTS, MAX_TIME_BUCKETS, StatsSnapshot, TOP_N, TimeBucket,
};
pub use event::{QueryEvent, TIMESTAMP_FORMAT, TransportProtocol};
