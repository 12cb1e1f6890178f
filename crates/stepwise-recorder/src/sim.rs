//! An in-process host for driving the recorder without a real runtime.
//!
//! [`SimHost`] behaves like an instrumentation interface: handlers are
//! installed once, events are delivered only while enabled, and delivery
//! happens synchronously on whichever thread calls [`SimHost::enter`],
//! [`SimHost::exit`] or [`SimHost::step`].

use crate::host::{
    DescriptorError, DynHandlers, EventKind, HostError, InstrumentationProvider, LoadedClass,
    MethodDescriptor, OpenRequest, TraceConsumer,
};
use parking_lot::{Mutex, RwLock};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stepwise_types::{Location, LocationFormat};

/// Cloneable in-memory stream. All clones share the same bytes.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<BufferState>>,
}

#[derive(Default)]
struct BufferState {
    bytes: Vec<u8>,
    flushes: usize,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flushes += 1;
        Ok(())
    }
}

/// Stream that accepts a fixed number of lines, then fails every write.
/// Accepted bytes land in the wrapped buffer.
pub struct FailingStream {
    sink: SharedBuffer,
    lines_left: usize,
}

impl FailingStream {
    pub fn after_lines(sink: SharedBuffer, lines: usize) -> Self {
        Self {
            sink,
            lines_left: lines,
        }
    }
}

impl Write for FailingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.lines_left == 0 {
            return Err(io::Error::other("no space left on device"));
        }
        let written = self.sink.write(buf)?;
        let newlines = buf.iter().filter(|&&byte| byte == b'\n').count();
        self.lines_left = self.lines_left.saturating_sub(newlines);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// A simulated thread. Handles with the same id are the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimThread {
    id: u64,
}

impl SimThread {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A simulated method handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMethod {
    declaring_type: Option<String>,
    name: Option<String>,
    descriptor: String,
}

impl SimMethod {
    pub fn new(declaring_type: &str, name: &str, descriptor: &str) -> Self {
        Self {
            declaring_type: Some(declaring_type.to_owned()),
            name: Some(name.to_owned()),
            descriptor: descriptor.to_owned(),
        }
    }

    /// A method whose declaring class the host cannot resolve.
    pub fn orphaned(name: &str, descriptor: &str) -> Self {
        Self {
            declaring_type: None,
            name: Some(name.to_owned()),
            descriptor: descriptor.to_owned(),
        }
    }

    /// A method whose name and signature the host cannot resolve.
    pub fn unnamed(declaring_type: &str) -> Self {
        Self {
            declaring_type: Some(declaring_type.to_owned()),
            name: None,
            descriptor: String::new(),
        }
    }
}

pub struct SimHost {
    handlers: RwLock<Option<DynHandlers<SimHost>>>,
    enabled: [AtomicBool; 3],
    refused: Option<EventKind>,
    location_format: LocationFormat,
    loaded_classes: Vec<LoadedClass>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(None),
            enabled: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
            refused: None,
            location_format: LocationFormat::BytecodeIndex,
            loaded_classes: Vec::new(),
        }
    }

    /// Makes the host refuse to enable notifications for `kind`.
    pub fn refusing_to_enable(mut self, kind: EventKind) -> Self {
        self.refused = Some(kind);
        self
    }

    pub fn with_location_format(mut self, format: LocationFormat) -> Self {
        self.location_format = format;
        self
    }

    pub fn with_loaded_classes(mut self, classes: Vec<LoadedClass>) -> Self {
        self.loaded_classes = classes;
        self
    }

    pub fn has_handlers(&self) -> bool {
        self.handlers.read().is_some()
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    /// Delivers a method-entry event. Returns whether a handler ran.
    pub fn enter(&self, thread: &SimThread, method: &SimMethod) -> bool {
        let Some(handlers) = self.handlers_for(EventKind::MethodEntry) else {
            return false;
        };
        handlers.method_entry(thread, method);
        true
    }

    pub fn exit(&self, thread: &SimThread, method: &SimMethod, was_popped_by_exception: bool) -> bool {
        let Some(handlers) = self.handlers_for(EventKind::MethodExit) else {
            return false;
        };
        handlers.method_exit(thread, method, was_popped_by_exception);
        true
    }

    pub fn step(&self, thread: &SimThread, method: &SimMethod, location: i64) -> bool {
        let Some(handlers) = self.handlers_for(EventKind::SingleStep) else {
            return false;
        };
        handlers.single_step(thread, method, Location::new(location));
        true
    }

    // The handler is cloned out so no host lock is held while it runs.
    fn handlers_for(&self, kind: EventKind) -> Option<DynHandlers<SimHost>> {
        if !self.is_enabled(kind) {
            return None;
        }
        self.handlers.read().clone()
    }

    fn flag(&self, kind: EventKind) -> &AtomicBool {
        match kind {
            EventKind::MethodEntry => &self.enabled[0],
            EventKind::MethodExit => &self.enabled[1],
            EventKind::SingleStep => &self.enabled[2],
        }
    }
}

impl InstrumentationProvider for SimHost {
    type Entity = SimThread;
    type Method = SimMethod;
    type EntityKey = u64;

    fn entity_key(&self, entity: &SimThread) -> u64 {
        entity.id
    }

    fn method_descriptor(&self, method: &SimMethod) -> Result<MethodDescriptor, DescriptorError> {
        let name = method
            .name
            .clone()
            .ok_or_else(|| DescriptorError::MethodName {
                reason: "method handle is no longer valid".to_owned(),
            })?;
        let declaring_type =
            method
                .declaring_type
                .clone()
                .ok_or_else(|| DescriptorError::DeclaringType {
                    reason: format!("method {name} has no declaring class"),
                })?;
        Ok(MethodDescriptor {
            declaring_type,
            name,
            descriptor: method.descriptor.clone(),
        })
    }

    fn location_format(&self) -> Result<LocationFormat, HostError> {
        Ok(self.location_format.clone())
    }

    fn install_handlers(&self, handlers: DynHandlers<Self>) -> Result<(), HostError> {
        let mut slot = self.handlers.write();
        if slot.is_some() {
            return Err(HostError::new(
                "install_handlers",
                "handlers are already installed",
            ));
        }
        *slot = Some(handlers);
        Ok(())
    }

    fn uninstall_handlers(&self) -> Result<(), HostError> {
        *self.handlers.write() = None;
        Ok(())
    }

    fn set_event_enabled(&self, kind: EventKind, enabled: bool) -> Result<(), HostError> {
        if enabled && self.refused == Some(kind) {
            return Err(HostError::new(
                "set_event_enabled",
                format!("{kind} notifications are not available"),
            ));
        }
        self.flag(kind).store(enabled, Ordering::Release);
        Ok(())
    }

    fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError> {
        Ok(self.loaded_classes.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerCall {
    Open(OpenRequest),
    Close,
}

/// A trace consumer that remembers every call it receives.
#[derive(Default)]
pub struct RecordingConsumer {
    calls: Mutex<Vec<ConsumerCall>>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ConsumerCall> {
        self.calls.lock().clone()
    }
}

impl TraceConsumer for RecordingConsumer {
    fn open(&self, request: &OpenRequest) -> Result<(), HostError> {
        self.calls.lock().push(ConsumerCall::Open(request.clone()));
        Ok(())
    }

    fn close(&self) -> Result<(), HostError> {
        self.calls.lock().push(ConsumerCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_methods_report_which_piece_is_missing() {
        let host = SimHost::new();
        assert!(matches!(
            host.method_descriptor(&SimMethod::orphaned("run", "()V")),
            Err(DescriptorError::DeclaringType { .. })
        ));
        assert!(matches!(
            host.method_descriptor(&SimMethod::unnamed("LMain;")),
            Err(DescriptorError::MethodName { .. })
        ));
    }

    #[test]
    fn failing_stream_keeps_whole_lines_only() {
        let sink = SharedBuffer::new();
        let mut out = FailingStream::after_lines(sink.clone(), 1);
        writeln!(out, "1 E {}", 0).expect("first line fits");
        assert!(writeln!(out, "1 X {}", 0).is_err());
        assert_eq!(sink.contents(), "1 E 0\n");
    }
}
