use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Stats file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Other(String),
}

impl SamplerError {
    /// Process exit code for the CLI. Session failures (the browser never became
    /// usable) and capture failures (anything once the session was up) map to
    /// distinct codes; usage errors exit with clap's code 2 before any of this runs.
    pub fn exit_code(&self) -> i32 {
        if self.is_session_error() {
            3
        } else {
            4
        }
    }

    /// True for errors raised while launching, connecting, or navigating.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::LaunchFailed(_) | Self::NavigationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SamplerError>;
