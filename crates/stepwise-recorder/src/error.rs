use crate::dictionary::InternError;
use crate::host::{DescriptorError, HostError};
use crate::options::OptionsError;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use stepwise_types::{InvariantError, LocationFormat};

/// Failures that abort an agent before any event handler is installed.
#[derive(Debug)]
pub enum StartupError {
    Options(OptionsError),
    UnsupportedLocationFormat {
        format: LocationFormat,
    },
    Open {
        path: PathBuf,
        source: io::Error,
    },
    MissingConsumer,
    Host {
        context: &'static str,
        source: HostError,
    },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Options(err) => write!(f, "invalid agent options: {err}"),
            Self::UnsupportedLocationFormat { format } => write!(
                f,
                "unsupported location format {format}; only flat per-method bytecode indices can be recorded"
            ),
            Self::Open { path, source } => {
                write!(f, "failed to open {} for writing: {source}", path.display())
            }
            Self::MissingConsumer => write!(
                f,
                "delegate mode was configured with a trace file but no trace consumer was supplied"
            ),
            Self::Host { context, source } => write!(f, "host refused {context}: {source}"),
        }
    }
}

impl Error for StartupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Options(err) => Some(err),
            Self::Open { source, .. } => Some(source),
            Self::Host { source, .. } => Some(source),
            Self::UnsupportedLocationFormat { .. } | Self::MissingConsumer => None,
        }
    }
}

impl From<OptionsError> for StartupError {
    fn from(value: OptionsError) -> Self {
        Self::Options(value)
    }
}

/// Failures while recording or shutting down. All of them end the run.
#[derive(Debug)]
pub enum RecordError {
    /// The host handed us a method it cannot describe.
    Descriptor(DescriptorError),
    /// The host described a method with a missing piece.
    MalformedMethod(InvariantError),
    TagSpaceExhausted(InvariantError),
    Intern(InternError),
    Io {
        context: &'static str,
        source: io::Error,
    },
    Open {
        path: PathBuf,
        source: io::Error,
    },
    Host {
        context: &'static str,
        source: HostError,
    },
    /// An earlier event already failed; the trace cannot be trusted.
    RunFailed(String),
    /// An event arrived before start or after stop.
    NotRecording,
}

impl RecordError {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn host(context: &'static str, source: HostError) -> Self {
        Self::Host { context, source }
    }

    pub fn is_host_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Descriptor(_) | Self::MalformedMethod(_) | Self::NotRecording
        )
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor(err) => write!(f, "host contract violated: {err}"),
            Self::MalformedMethod(err) => {
                write!(f, "host contract violated: method descriptor invalid: {err}")
            }
            Self::TagSpaceExhausted(err) => write!(f, "entity tag space exhausted: {err}"),
            Self::Intern(err) => write!(f, "{err}"),
            Self::Io { context, source } => write!(f, "i/o failure while {context}: {source}"),
            Self::Open { path, source } => {
                write!(f, "failed to open {} for writing: {source}", path.display())
            }
            Self::Host { context, source } => write!(f, "host refused {context}: {source}"),
            Self::RunFailed(reason) => write!(f, "recording already failed: {reason}"),
            Self::NotRecording => write!(
                f,
                "host contract violated: event delivered while the recorder is not running"
            ),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Descriptor(err) => Some(err),
            Self::MalformedMethod(err) | Self::TagSpaceExhausted(err) => Some(err),
            Self::Intern(err) => Some(err),
            Self::Io { source, .. } | Self::Open { source, .. } => Some(source),
            Self::Host { source, .. } => Some(source),
            Self::RunFailed(_) | Self::NotRecording => None,
        }
    }
}

impl From<DescriptorError> for RecordError {
    fn from(value: DescriptorError) -> Self {
        Self::Descriptor(value)
    }
}

impl From<InternError> for RecordError {
    fn from(value: InternError) -> Self {
        Self::Intern(value)
    }
}
