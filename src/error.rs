use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("already capturing on {0}")]
    AlreadyCapturing(String),

    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    #[error("no suitable network interface found")]
    NoSuitableInterface,

    #[error("capture needs a running tokio runtime")]
    NoRuntime,

    #[error("pcap: {0}")]
    Pcap(#[from] pcap::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("interface is required")]
    InterfaceRequired,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
