use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("timeout waiting for measurement")]
    Timeout,
    #[error("channel not settled")]
    NotReady,
    #[error("channel {0} out of range")]
    ChannelOutOfRange(usize),
    #[error("gpio error: {0}")]
    Gpio(String),
}
