use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BalancerError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for measurement")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing voltage source")]
    MissingVoltageSource,
    #[error("missing switch driver")]
    MissingSwitchDriver,
    #[error("missing cell count")]
    MissingCellCount,
    #[error("missing cell model factory")]
    MissingCellModel,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
