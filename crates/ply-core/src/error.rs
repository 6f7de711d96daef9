//! Error taxonomy shared across the workspace, following spec §7's
//! categories: resource-open errors, protocol errors, configuration
//! errors, device errors, and theme-load errors. Each crate may define a
//! narrower error of its own, but converts into this one at its public
//! boundary so the orchestrator and the `plymouthd` binary can classify
//! and log failures uniformly.

use crate::sysexits::Sysexit;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("theme error: {0}")]
    Theme(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Error::Device(msg.into())
    }

    pub fn theme(msg: impl Into<String>) -> Self {
        Error::Theme(msg.into())
    }

    /// Map this error onto the BSD sysexits convention used by the
    /// `plymouthd` CLI (spec §6).
    pub fn exit_code(&self) -> Sysexit {
        match self {
            Error::Io(_) | Error::Device(_) => Sysexit::OsErr,
            Error::Protocol(_) => Sysexit::Protocol,
            Error::Config(_) => Sysexit::Config,
            Error::Theme(_) => Sysexit::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_config_exit_code() {
        let err = Error::config("bad INI");
        assert_eq!(err.exit_code(), Sysexit::Config);
    }

    #[test]
    fn io_error_maps_to_oserr() {
        let err = Error::from(std::io::Error::other("nope"));
        assert_eq!(err.exit_code(), Sysexit::OsErr);
    }
}
