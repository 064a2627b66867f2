use dns_traffic_analyzer::pcap::PacketSource;
use dns_traffic_analyzer::{CaptureStatus, Monitor, StatsSnapshot};

pub struct App<S> {
    pub monitor: Monitor<S>,
    pub interface: String,
    pub scroll_state: usize,
    pub status_message: Option<String>,
}

impl<S: PacketSource> App<S> {
    pub fn new(monitor: Monitor<S>, interface: String) -> Self {
        Self {
            monitor,
            interface,
            scroll_state: 0,
            status_message: None,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.monitor.get_stats()
    }

    pub fn is_capturing(&self) -> bool {
        self.monitor.capture_state().capturing
    }

    pub fn toggle_capture(&mut self) {
        if self.is_capturing() {
            self.monitor.stop_capture();
            self.status_message = Some("Stopping capture".to_string());
            return;
        }

        self.status_message = Some(match self.monitor.start_capture(&self.interface) {
            Ok(CaptureStatus::CaptureStarted { interface }) => format!("Capturing on {interface}"),
            Ok(CaptureStatus::AlreadyCapturing) => "Already capturing".to_string(),
            Ok(other) => format!("{other:?}"),
            Err(e) => format!("Start failed: {e}"),
        });
    }

    pub fn reset_stats(&mut self) {
        self.monitor.reset_stats();
        self.scroll_state = 0;
        self.status_message = Some("Statistics reset".to_string());
    }

    pub fn scroll_up(&mut self) {
        self.scroll_state = self.scroll_state.saturating_sub(1);
    }

    pub fn scroll_down(&mut self, max: usize) {
        if self.scroll_state < max.saturating_sub(1) {
            self.scroll_state += 1;
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_state = self.scroll_state.saturating_sub(10);
    }

    pub fn page_down(&mut self, max: usize) {
        self.scroll_state = (self.scroll_state + 10).min(max.saturating_sub(1));
    }

    pub fn home(&mut self) {
        self.scroll_state = 0;
    }

    pub fn end(&mut self, max: usize) {
        self.scroll_state = max.saturating_sub(1);
    }
}
