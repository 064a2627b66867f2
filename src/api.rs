//! Request/response surface over the capture controller and aggregator.
//!
//! Every result here is plain data with a serde shape, so any transport can
//! hand it to a client unchanged.

use crate::dns::{Aggregator, StatsSnapshot};
use crate::error::{ApiError, CaptureError};
use crate::pcap::{CaptureController, PacketSource};
use log::info;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureStatus {
    CaptureStarted { interface: String },
    AlreadyCapturing,
    Stopping,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub capturing: bool,
    pub interface: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
}

pub struct Monitor<S> {
    aggregator: Arc<Aggregator>,
    capture: CaptureController<S>,
}

impl<S> Clone for Monitor<S> {
    fn clone(&self) -> Self {
        Self {
            aggregator: Arc::clone(&self.aggregator),
            capture: self.capture.clone(),
        }
    }
}

impl<S: PacketSource> Monitor<S> {
    pub fn new(source: S, filter: impl Into<String>) -> Self {
        let aggregator = Arc::new(Aggregator::new());
        let capture = CaptureController::new(source, Arc::clone(&aggregator), filter);
        Self {
            aggregator,
            capture,
        }
    }

    pub fn capture(&self) -> &CaptureController<S> {
        &self.capture
    }

    pub fn list_interfaces(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.capture.source().list_interfaces()?)
    }

    /// Start capturing on `interface`. A capture that is already running is
    /// reported as a status, not an error.
    pub fn start_capture(&self, interface: &str) -> Result<CaptureStatus, ApiError> {
        let interface = interface.trim();
        if interface.is_empty() {
            return Err(ApiError::InterfaceRequired);
        }

        match self.capture.start(interface) {
            Ok(()) => Ok(CaptureStatus::CaptureStarted {
                interface: interface.to_string(),
            }),
            Err(CaptureError::AlreadyCapturing(active)) => {
                info!("Capture requested on {interface} while already capturing on {active}");
                Ok(CaptureStatus::AlreadyCapturing)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn stop_capture(&self) -> CaptureStatus {
        if self.capture.stop() {
            CaptureStatus::Stopping
        } else {
            CaptureStatus::Idle
        }
    }

    pub fn capture_state(&self) -> CaptureInfo {
        CaptureInfo {
            capturing: self.capture.is_capturing(),
            interface: self.capture.interface(),
            last_error: self.capture.last_error(),
        }
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.aggregator.snapshot()
    }

    pub fn reset_stats(&self) {
        info!("Resetting DNS statistics");
        self.aggregator.reset();
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            message: "DNS traffic analyzer",
        }
    }
}
