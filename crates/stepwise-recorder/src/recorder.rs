use crate::coordinator::Coordinator;
use crate::dictionary::MethodDictionary;
use crate::error::RecordError;
use crate::host::{DynHandlers, EventHandlers, EventKind, InstrumentationProvider};
use crate::registry::IdentityRegistry;
use crate::writer::{EventWriter, FlushPolicy, Stream};
use std::hash::Hash;
use std::sync::Arc;
use stepwise_types::{EntityTag, Location, MethodKey, MethodRef, RunStats, Trailer};
use tracing::error;

/// Output streams for one recording run.
pub struct RecordStreams {
    pub trace: Stream,
    /// Present when methods are interned; absent for inline signatures.
    pub dictionary: Option<Stream>,
}

struct OpenStreams {
    trace: EventWriter,
    dictionary: Option<MethodDictionary>,
}

struct RecorderState<K> {
    registry: IdentityRegistry<K>,
    streams: Option<OpenStreams>,
    failure: Option<String>,
    final_stats: Option<RunStats>,
}

impl<K: Eq + Hash> RecorderState<K> {
    fn stats(&self) -> RunStats {
        let Some(streams) = &self.streams else {
            return self.final_stats.unwrap_or_default();
        };
        let mut stats = RunStats {
            entities: self.registry.len(),
            methods: streams.dictionary.as_ref().map_or(0, MethodDictionary::len),
            ..RunStats::default()
        };
        streams.trace.fill_stats(&mut stats);
        stats
    }
}

#[derive(Clone, Copy)]
enum MethodEvent {
    Enter,
    Exit,
}

/// Owns the registry, dictionary and trace writer of one run, and funnels
/// every event through a single [`Coordinator`].
pub struct Recorder<P: InstrumentationProvider> {
    host: Arc<P>,
    coordinator: Coordinator<RecorderState<P::EntityKey>>,
}

impl<P: InstrumentationProvider> Recorder<P> {
    pub fn new(host: Arc<P>, streams: RecordStreams, flush: FlushPolicy) -> Self {
        let open = OpenStreams {
            trace: EventWriter::new(streams.trace, flush),
            dictionary: streams
                .dictionary
                .map(|out| MethodDictionary::new(out, flush)),
        };
        Self {
            host,
            coordinator: Coordinator::new(RecorderState {
                registry: IdentityRegistry::new(),
                streams: Some(open),
                failure: None,
                final_stats: None,
            }),
        }
    }

    /// This recorder as the handler set a host installs.
    pub fn handlers(self: &Arc<Self>) -> DynHandlers<P> {
        Arc::clone(self) as DynHandlers<P>
    }

    pub fn record_entry(&self, entity: &P::Entity, method: &P::Method) -> Result<(), RecordError> {
        self.record_method(entity, method, MethodEvent::Enter)
    }

    pub fn record_exit(&self, entity: &P::Entity, method: &P::Method) -> Result<(), RecordError> {
        self.record_method(entity, method, MethodEvent::Exit)
    }

    pub fn record_step(&self, entity: &P::Entity, location: Location) -> Result<(), RecordError> {
        self.admit(|host, state| {
            let streams = state.streams.as_mut().ok_or(RecordError::NotRecording)?;
            let tag = state
                .registry
                .resolve(host.entity_key(entity))
                .map_err(RecordError::TagSpaceExhausted)?;
            streams
                .trace
                .step(tag, location)
                .map_err(|err| RecordError::io("appending step record", err))
        })
    }

    fn record_method(
        &self,
        entity: &P::Entity,
        method: &P::Method,
        event: MethodEvent,
    ) -> Result<(), RecordError> {
        self.admit(|host, state| {
            let streams = state.streams.as_mut().ok_or(RecordError::NotRecording)?;
            let tag = state
                .registry
                .resolve(host.entity_key(entity))
                .map_err(RecordError::TagSpaceExhausted)?;

            let descriptor = host.method_descriptor(method)?;
            let key = MethodKey::new(
                &descriptor.declaring_type,
                &descriptor.name,
                &descriptor.descriptor,
            )
            .map_err(RecordError::MalformedMethod)?;

            match streams.dictionary.as_mut() {
                Some(dictionary) => {
                    let id = dictionary.intern(key)?;
                    write_method(&mut streams.trace, event, tag, MethodRef::Id(id))
                }
                None => write_method(
                    &mut streams.trace,
                    event,
                    tag,
                    MethodRef::Signature(key.as_str()),
                ),
            }
        })
    }

    /// Runs one event body inside the exclusive region. A failed body
    /// poisons the run: every later admission is refused.
    fn admit(
        &self,
        body: impl FnOnce(&P, &mut RecorderState<P::EntityKey>) -> Result<(), RecordError>,
    ) -> Result<(), RecordError> {
        self.coordinator.with_lock(|state| {
            if let Some(reason) = &state.failure {
                return Err(RecordError::RunFailed(reason.clone()));
            }
            let result = body(self.host.as_ref(), state);
            if let Err(err) = &result {
                state.failure = Some(err.to_string());
            }
            result
        })
    }

    pub fn stats(&self) -> RunStats {
        self.coordinator.with_lock(|state| state.stats())
    }

    /// Turns off event delivery from inside the exclusive region, so no
    /// callback is admitted once shutdown has begun.
    pub fn quiesce(&self) -> Result<(), RecordError> {
        self.coordinator.with_lock(|_| {
            for kind in EventKind::ALL {
                self.host
                    .set_event_enabled(kind, false)
                    .map_err(|err| RecordError::host("disabling event notifications", err))?;
            }
            Ok(())
        })
    }

    /// Appends the trailer and closes both streams.
    ///
    /// A run that already failed gets no trailer; its streams are dropped
    /// and the original failure is reported.
    pub fn finish(&self) -> Result<RunStats, RecordError> {
        self.coordinator.with_lock(|state| {
            let stats = state.stats();
            let streams = state.streams.take().ok_or(RecordError::NotRecording)?;
            state.final_stats = Some(stats);
            if let Some(reason) = &state.failure {
                return Err(RecordError::RunFailed(reason.clone()));
            }

            if let Some(dictionary) = streams.dictionary {
                dictionary
                    .close()
                    .map_err(|err| RecordError::io("closing dictionary stream", err))?;
            }
            streams
                .trace
                .close(Trailer {
                    entities: state.registry.len(),
                })
                .map_err(|err| RecordError::io("writing trace trailer", err))?;
            Ok(stats)
        })
    }
}

fn write_method(
    trace: &mut EventWriter,
    event: MethodEvent,
    tag: EntityTag,
    method: MethodRef<'_>,
) -> Result<(), RecordError> {
    match event {
        MethodEvent::Enter => trace
            .enter(tag, method)
            .map_err(|err| RecordError::io("appending method entry record", err)),
        MethodEvent::Exit => trace
            .exit(tag, method)
            .map_err(|err| RecordError::io("appending method exit record", err)),
    }
}

fn fatal(kind: EventKind, err: &RecordError) -> ! {
    error!(
        event = %kind,
        error = %err,
        host_contract_violation = err.is_host_contract_violation(),
        "recording failed; trace is incomplete"
    );
    panic!("fatal error during {kind} event: {err}");
}

impl<P: InstrumentationProvider> EventHandlers for Recorder<P> {
    type Entity = P::Entity;
    type Method = P::Method;

    fn method_entry(&self, entity: &P::Entity, method: &P::Method) {
        if let Err(err) = self.record_entry(entity, method) {
            fatal(EventKind::MethodEntry, &err);
        }
    }

    fn method_exit(&self, entity: &P::Entity, method: &P::Method, _was_popped_by_exception: bool) {
        if let Err(err) = self.record_exit(entity, method) {
            fatal(EventKind::MethodExit, &err);
        }
    }

    fn single_step(&self, entity: &P::Entity, _method: &P::Method, location: Location) {
        if let Err(err) = self.record_step(entity, location) {
            fatal(EventKind::SingleStep, &err);
        }
    }
}
