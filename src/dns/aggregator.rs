use super::event::{QueryEvent, TransportProtocol, serialize_timestamp};
use super::types::rcode_name;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

/// Entries reported in `top_domains` / `top_clients`
pub const TOP_N: usize = 10;
pub const MAX_TIME_BUCKETS: usize = 100;
pub const MAX_RECENT_EVENTS: usize = 50;
const BUCKET_SECS: i64 = 60;

/// Counter table that remembers the order keys were first seen in, so that
/// ranking by count keeps first-seen order among ties.
#[derive(Debug, Clone)]
struct CountTable<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, u64)>,
}

impl<K> Default for CountTable<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> CountTable<K> {
    fn increment(&mut self, key: K) {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1 += 1;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, 1));
        }
    }

    /// Highest counts first. `sort_by` is stable, so ties stay in
    /// first-seen order.
    fn top(&self, n: usize) -> Vec<(K, u64)> {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.entries.iter().map(|(k, c)| (k, *c))
    }
}

/// One minute of traffic in the time series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    /// Time of the first event that opened the bucket
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

/// Point-in-time copy of the aggregate statistics.
///
/// Owns all of its data; nothing in it changes when the aggregator moves on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub top_domains: Vec<(String, u64)>,
    pub top_clients: Vec<(IpAddr, u64)>,
    pub queries_by_type: BTreeMap<u16, u64>,
    pub queries_by_protocol: BTreeMap<String, u64>,
    pub queries_by_port: BTreeMap<u16, u64>,
    pub queries_by_rcode: BTreeMap<String, u64>,
    pub queries_over_time: Vec<TimeBucket>,
    pub recent_queries: Vec<QueryEvent>,
}

#[derive(Debug, Default)]
struct AggregateState {
    total_queries: u64,
    domains: CountTable<String>,
    clients: CountTable<IpAddr>,
    qtypes: CountTable<u16>,
    protocols: CountTable<TransportProtocol>,
    ports: CountTable<u16>,
    rcodes: CountTable<u8>,
    time_series: VecDeque<TimeBucket>,
    recent: VecDeque<QueryEvent>,
    last_bucket_key: Option<i64>,
}

impl AggregateState {
    fn apply(&mut self, event: QueryEvent) {
        self.total_queries += 1;
        self.domains.increment(event.query_name.clone());
        if let Some(src) = event.source_address {
            self.clients.increment(src);
        }
        if event.transport != TransportProtocol::Unknown {
            self.protocols.increment(event.transport);
        }
        if let Some(port) = event.dest_port {
            self.ports.increment(port);
        }
        self.qtypes.increment(event.query_type);
        if let Some(rcode) = event.response_code {
            self.rcodes.increment(rcode);
        }

        self.record_bucket(event.timestamp);

        if self.recent.len() >= MAX_RECENT_EVENTS {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    fn record_bucket(&mut self, timestamp: DateTime<Utc>) {
        let bucket_key = timestamp.timestamp().div_euclid(BUCKET_SECS);

        if self.last_bucket_key == Some(bucket_key)
            && let Some(current) = self.time_series.back_mut()
        {
            current.count += 1;
            return;
        }

        if self.time_series.len() >= MAX_TIME_BUCKETS {
            self.time_series.pop_front();
        }
        self.time_series.push_back(TimeBucket {
            timestamp,
            count: 1,
        });
        self.last_bucket_key = Some(bucket_key);
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut queries_by_rcode = BTreeMap::new();
        for (rcode, count) in self.rcodes.iter() {
            *queries_by_rcode.entry(rcode_name(*rcode)).or_insert(0) += count;
        }

        StatsSnapshot {
            total_queries: self.total_queries,
            top_domains: self.domains.top(TOP_N),
            top_clients: self.clients.top(TOP_N),
            queries_by_type: self.qtypes.iter().map(|(k, c)| (*k, c)).collect(),
            queries_by_protocol: self
                .protocols
                .iter()
                .map(|(k, c)| (k.to_string(), c))
                .collect(),
            queries_by_port: self.ports.iter().map(|(k, c)| (*k, c)).collect(),
            queries_by_rcode,
            queries_over_time: self.time_series.iter().cloned().collect(),
            recent_queries: self.recent.iter().cloned().collect(),
        }
    }
}

/// Running DNS statistics shared between the capture worker and readers.
///
/// Every operation takes the same lock for its whole duration, so a snapshot
/// never sees half of an ingest and a reset never lands in the middle of one.
#[derive(Debug, Default)]
pub struct Aggregator {
    state: Mutex<AggregateState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, event: QueryEvent) {
        self.lock().apply(event);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().snapshot()
    }

    pub fn reset(&self) {
        *self.lock() = AggregateState::default();
    }

    pub fn total_queries(&self) -> u64 {
        self.lock().total_queries
    }

    // Updates leave the state consistent at every step, so a poisoned lock
    // still guards valid data.
    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
