use super::packet::{DecodedPacket, LinkType, decode_frame};
use crate::dns::{Aggregator, QueryEvent};
use crate::error::CaptureError;
use chrono::Utc;
use log::{debug, error, info, warn};
use pcap::{Active, Capture, Device, Error};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default BPF expression: DNS over both transports
pub const DNS_FILTER: &str = "udp port 53 or tcp port 53";

/// Read timeout for live captures, bounds how long `stop` takes to land
const READ_TIMEOUT_MS: i32 = 100;

/// Supplier of decoded frames for one interface.
///
/// `sniff` blocks the calling thread, invoking `on_packet` inline for every
/// frame that matches `filter` until `should_stop` returns true or the
/// source fails.
pub trait PacketSource: Send + Sync + 'static {
    fn list_interfaces(&self) -> Result<Vec<String>, CaptureError>;

    fn sniff(
        &self,
        interface: &str,
        filter: &str,
        on_packet: &mut dyn FnMut(DecodedPacket),
        should_stop: &dyn Fn() -> bool,
    ) -> Result<(), CaptureError>;
}

/// Live capture through libpcap
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapSource;

impl PcapSource {
    pub fn devices() -> Result<Vec<Device>, CaptureError> {
        Ok(Device::list()?)
    }

    /// First up, running, non-loopback device; falls back to any device
    /// that is up.
    pub fn select_default_interface() -> Result<String, CaptureError> {
        let devices = Device::list()?;

        for device in &devices {
            if device.name == "any" {
                continue;
            }
            if !device.flags.is_loopback() && device.flags.is_up() && device.flags.is_running() {
                return Ok(device.name.clone());
            }
        }

        for device in &devices {
            if device.name != "any" && device.flags.is_up() {
                return Ok(device.name.clone());
            }
        }

        Err(CaptureError::NoSuitableInterface)
    }

    fn open(interface: &str) -> Result<Capture<Active>, CaptureError> {
        let device = if interface == "any" {
            Device::from("any")
        } else {
            Device::list()?
                .into_iter()
                .find(|d| d.name == interface)
                .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?
        };

        Ok(Capture::from_device(device)?
            .immediate_mode(true)
            .timeout(READ_TIMEOUT_MS)
            .open()?)
    }
}

impl PacketSource for PcapSource {
    fn list_interfaces(&self) -> Result<Vec<String>, CaptureError> {
        Ok(Self::devices()?.into_iter().map(|d| d.name).collect())
    }

    fn sniff(
        &self,
        interface: &str,
        filter: &str,
        on_packet: &mut dyn FnMut(DecodedPacket),
        should_stop: &dyn Fn() -> bool,
    ) -> Result<(), CaptureError> {
        info!("Opening capture on interface: {interface}");
        let mut cap = Self::open(interface)?;
        cap.filter(filter, true)?;

        let link_type = LinkType::from_dlt(cap.get_datalink().0);
        info!("Capture started on interface: {interface} ({link_type:?}, filter \"{filter}\")");

        while !should_stop() {
            match cap.next_packet() {
                Ok(packet) => match decode_frame(link_type, packet.data) {
                    Some(decoded) => on_packet(decoded),
                    None => debug!("Skipping undecodable frame of {} bytes", packet.data.len()),
                },
                // Expected when the wire is quiet; loop back to the stop check
                Err(Error::TimeoutExpired) => continue,
                Err(Error::NoMorePackets) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

struct Session {
    id: u64,
    interface: String,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ControllerState {
    session: Option<Session>,
    next_id: u64,
    last_error: Option<String>,
}

struct Inner<S> {
    source: S,
    aggregator: Arc<Aggregator>,
    filter: String,
    state: Mutex<ControllerState>,
}

impl<S: PacketSource> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Body of the capture worker: runs the sniff loop to completion and
    /// hands the session slot back.
    fn run_session(&self, id: u64, interface: &str, cancel: &CancellationToken) {
        let _release = SessionRelease { inner: self, id };

        let mut on_packet = |packet: DecodedPacket| {
            if let Some(event) = QueryEvent::from_packet(&packet, Utc::now()) {
                debug!(
                    "DNS {} {} (type {})",
                    if event.is_response { "response" } else { "query" },
                    event.query_name,
                    event.query_type
                );
                self.aggregator.ingest(event);
            }
        };
        let should_stop = || cancel.is_cancelled();

        match self
            .source
            .sniff(interface, &self.filter, &mut on_packet, &should_stop)
        {
            Ok(()) => info!("Packet capture on {interface} terminated"),
            Err(e) => {
                error!("Packet capture on {interface} failed: {e}");
                self.lock_state().last_error = Some(e.to_string());
            }
        }
    }
}

/// Returns the controller to idle when the worker exits, including by panic.
struct SessionRelease<'a, S: PacketSource> {
    inner: &'a Inner<S>,
    id: u64,
}

impl<S: PacketSource> Drop for SessionRelease<'_, S> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.session.as_ref().is_some_and(|s| s.id == self.id) {
            state.session = None;
        }
    }
}

/// Idle/Capturing state machine around a [`PacketSource`].
///
/// At most one sniff loop runs at a time. The loop lives on a blocking
/// worker owned by the controller and feeds every decoded DNS message
/// straight into the shared [`Aggregator`].
pub struct CaptureController<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CaptureController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PacketSource> CaptureController<S> {
    pub fn new(source: S, aggregator: Arc<Aggregator>, filter: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                aggregator,
                filter: filter.into(),
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Begin capturing on `interface`.
    ///
    /// Fails with [`CaptureError::AlreadyCapturing`] while a session is
    /// active. Source failures happen later, on the worker; they end the
    /// session and show up in [`Self::last_error`].
    pub fn start(&self, interface: &str) -> Result<(), CaptureError> {
        let runtime = Handle::try_current().map_err(|_| CaptureError::NoRuntime)?;

        let mut state = self.inner.lock_state();
        if let Some(session) = &state.session {
            return Err(CaptureError::AlreadyCapturing(session.interface.clone()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.last_error = None;

        let cancel = CancellationToken::new();
        let worker = {
            let inner = Arc::clone(&self.inner);
            let interface = interface.to_string();
            let cancel = cancel.clone();
            // The worker's release waits on this lock, so the session below
            // is recorded before the worker can clear it.
            runtime.spawn_blocking(move || inner.run_session(id, &interface, &cancel))
        };

        info!("Starting DNS capture on interface: {interface}");
        state.session = Some(Session {
            id,
            interface: interface.to_string(),
            cancel,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Ask the active loop to end. Returns whether a session was signalled;
    /// the loop exits on its next stop check, not before this returns.
    pub fn stop(&self) -> bool {
        let state = self.inner.lock_state();
        match &state.session {
            Some(session) => {
                info!("Stopping DNS capture on interface: {}", session.interface);
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop and wait for the worker to finish.
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.inner.lock_state();
            state.session.as_mut().and_then(|session| {
                session.cancel.cancel();
                session.worker.take()
            })
        };

        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!("Capture worker ended abnormally: {e}");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.lock_state().session.is_some()
    }

    pub fn interface(&self) -> Option<String> {
        self.inner
            .lock_state()
            .session
            .as_ref()
            .map(|s| s.interface.clone())
    }

    /// Message of the failure that ended the most recent session, cleared
    /// when a new session starts
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock_state().last_error.clone()
    }
}
