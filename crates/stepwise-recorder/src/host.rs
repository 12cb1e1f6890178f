//! The capability surface the recorder needs from the instrumented runtime.
//!
//! A host adapter (a JVMTI shim, a test double, ...) implements
//! [`InstrumentationProvider`]. The recorder never assumes which thread a
//! handler runs on, or how many run at once.

use facet::Facet;
use std::error::Error;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use stepwise_types::{Location, LocationFormat};

#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum EventKind {
    MethodEntry,
    MethodExit,
    SingleStep,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [Self::MethodEntry, Self::MethodExit, Self::SingleStep];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MethodEntry => write!(f, "method-entry"),
            Self::MethodExit => write!(f, "method-exit"),
            Self::SingleStep => write!(f, "single-step"),
        }
    }
}

/// The three raw strings a host reports for a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub declaring_type: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    DeclaringType { reason: String },
    MethodName { reason: String },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeclaringType { reason } => {
                write!(f, "cannot resolve declaring type of method: {reason}")
            }
            Self::MethodName { reason } => {
                write!(f, "cannot resolve method name and signature: {reason}")
            }
        }
    }
}

impl Error for DescriptorError {}

/// A host call that returned a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub operation: &'static str,
    pub detail: String,
}

impl HostError {
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            operation,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.detail)
    }
}

impl Error for HostError {}

/// One class currently loaded in the host.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    pub signature: String,
    /// True when the class has no defining loader, i.e. it came from the boot path.
    pub boot: bool,
}

impl LoadedClass {
    pub fn is_array(&self) -> bool {
        self.signature.starts_with('[')
    }
}

/// Handlers invoked by the host, possibly concurrently, from the
/// instrumented program's own threads.
pub trait EventHandlers: Send + Sync {
    type Entity;
    type Method;

    fn method_entry(&self, entity: &Self::Entity, method: &Self::Method);

    fn method_exit(
        &self,
        entity: &Self::Entity,
        method: &Self::Method,
        was_popped_by_exception: bool,
    );

    fn single_step(&self, entity: &Self::Entity, method: &Self::Method, location: Location);
}

pub type DynHandlers<P> = Arc<
    dyn EventHandlers<
            Entity = <P as InstrumentationProvider>::Entity,
            Method = <P as InstrumentationProvider>::Method,
        >,
>;

pub trait InstrumentationProvider: Send + Sync + 'static {
    /// Opaque thread/object handle, valid for the duration of a callback.
    type Entity: 'static;
    type Method: 'static;
    /// Host-defined identity of an entity. Two handles the host considers
    /// the same entity must map to equal keys.
    type EntityKey: Eq + Hash + Send + 'static;

    fn entity_key(&self, entity: &Self::Entity) -> Self::EntityKey;

    fn method_descriptor(&self, method: &Self::Method) -> Result<MethodDescriptor, DescriptorError>;

    fn location_format(&self) -> Result<LocationFormat, HostError>;

    fn install_handlers(&self, handlers: DynHandlers<Self>) -> Result<(), HostError>;

    /// Drops the installed handlers. Called once the run is over.
    fn uninstall_handlers(&self) -> Result<(), HostError>;

    fn set_event_enabled(&self, kind: EventKind, enabled: bool) -> Result<(), HostError>;

    fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError>;
}

/// Request passed to an embedded trace consumer when it is opened.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub trace_file: String,
    pub instr_scheme_file: Option<String>,
    pub num_meths: i32,
    pub num_loops: i32,
    pub instr_bound: i32,
}

/// A runtime-side consumer that owns persistence in delegating setups.
/// Called exactly at the two lifecycle boundaries.
pub trait TraceConsumer: Send + Sync {
    fn open(&self, request: &OpenRequest) -> Result<(), HostError>;

    fn close(&self) -> Result<(), HostError>;
}
