//! stepwise-recorder - method entry/exit/single-step trace recording
//!
//! A host runtime delivers events from its own threads through
//! [`EventHandlers`]. Every event is admitted through one exclusive region,
//! tagged with a dense per-run entity id, and appended to a line-oriented
//! trace stream. Methods are either written inline or interned into a
//! separate dictionary stream whose line number is the method id.
//!
//! - [`parse_options`] turns an agent option string into an [`AgentConfig`]
//! - [`Agent`] drives a run from start to stop
//! - [`sim`] is an in-process host for tests and demos

mod agent;
mod classes;
mod config;
mod coordinator;
mod dictionary;
mod error;
mod host;
mod options;
mod recorder;
mod registry;
pub mod sim;
mod writer;

pub use agent::Agent;
pub use classes::{ClassCounts, partition_classes, write_class_listing};
pub use config::{
    AgentConfig, AgentMode, ClassListing, DEFAULT_DICTIONARY_FILE, DEFAULT_TRACE_FILE,
    DelegateConfig, MethodNaming, RecordConfig,
};
pub use coordinator::Coordinator;
pub use dictionary::{InternError, MethodDictionary};
pub use error::{RecordError, StartupError};
pub use host::{
    DescriptorError, DynHandlers, EventHandlers, EventKind, HostError, InstrumentationProvider,
    LoadedClass, MethodDescriptor, OpenRequest, TraceConsumer,
};
pub use options::{OptionsError, parse_options};
pub use recorder::{RecordStreams, Recorder};
pub use registry::IdentityRegistry;
pub use stepwise_types as types;
pub use writer::{EventWriter, FlushPolicy, Stream};
