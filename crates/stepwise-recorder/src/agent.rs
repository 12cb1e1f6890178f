//! Lifecycle controller: owns the recorder (or the delegating consumer)
//! between the host's load and unload notifications.

use crate::classes::write_class_listing;
use crate::config::{AgentConfig, AgentMode, DelegateConfig, MethodNaming, RecordConfig};
use crate::error::{RecordError, StartupError};
use crate::host::{EventKind, InstrumentationProvider, OpenRequest, TraceConsumer};
use crate::options::parse_options;
use crate::recorder::{RecordStreams, Recorder};
use crate::writer::{FlushPolicy, Stream};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use stepwise_types::RunStats;
use tracing::{debug, info, warn};

enum Role<P: InstrumentationProvider> {
    Record(Arc<Recorder<P>>),
    Delegate {
        config: DelegateConfig,
        consumer: Option<Arc<dyn TraceConsumer>>,
    },
}

pub struct Agent<P: InstrumentationProvider> {
    host: Arc<P>,
    role: Role<P>,
}

impl<P: InstrumentationProvider> Agent<P> {
    pub fn start(host: Arc<P>, config: AgentConfig) -> Result<Self, StartupError> {
        Self::start_with_consumer(host, config, None)
    }

    /// Parses a raw agent option string and starts from it.
    pub fn start_from_options(
        host: Arc<P>,
        options: Option<&str>,
        consumer: Option<Arc<dyn TraceConsumer>>,
    ) -> Result<Self, StartupError> {
        let config = parse_options(options)?;
        Self::start_with_consumer(host, config, consumer)
    }

    /// Starts an agent. `consumer` is only consulted in delegate mode, where
    /// it is required as soon as a trace file is configured.
    pub fn start_with_consumer(
        host: Arc<P>,
        config: AgentConfig,
        consumer: Option<Arc<dyn TraceConsumer>>,
    ) -> Result<Self, StartupError> {
        match config.mode {
            AgentMode::Record(record) => Self::start_recording(host, record, config.flush),
            AgentMode::Delegate(delegate) => {
                if delegate.trace.is_some() && consumer.is_none() {
                    return Err(StartupError::MissingConsumer);
                }
                info!(
                    trace = ?delegate.trace,
                    instr_scheme = ?delegate.instr_scheme,
                    class_listing = delegate.class_listing.is_some(),
                    "stepwise agent started in delegate mode"
                );
                Ok(Self {
                    host,
                    role: Role::Delegate {
                        config: delegate,
                        consumer,
                    },
                })
            }
        }
    }

    /// Starts recording into caller-supplied streams instead of files.
    pub fn start_with_streams(
        host: Arc<P>,
        streams: RecordStreams,
        flush: FlushPolicy,
    ) -> Result<Self, StartupError> {
        check_location_format(host.as_ref())?;
        let interned = streams.dictionary.is_some();
        let agent = Self::install(host, streams, flush)?;
        info!(interned, ?flush, "stepwise agent started on supplied streams");
        Ok(agent)
    }

    fn start_recording(
        host: Arc<P>,
        config: RecordConfig,
        flush: FlushPolicy,
    ) -> Result<Self, StartupError> {
        check_location_format(host.as_ref())?;

        let trace = open_stream(&config.trace)?;
        let dictionary = match &config.naming {
            MethodNaming::Inline => None,
            MethodNaming::Interned { dictionary } => Some(open_stream(dictionary)?),
        };
        let agent = Self::install(host, RecordStreams { trace, dictionary }, flush)?;

        match &config.naming {
            MethodNaming::Inline => info!(
                trace = %config.trace.display(),
                ?flush,
                "stepwise agent recording with inline signatures"
            ),
            MethodNaming::Interned { dictionary } => info!(
                trace = %config.trace.display(),
                dictionary = %dictionary.display(),
                ?flush,
                "stepwise agent recording with interned methods"
            ),
        }
        Ok(agent)
    }

    fn install(
        host: Arc<P>,
        streams: RecordStreams,
        flush: FlushPolicy,
    ) -> Result<Self, StartupError> {
        let recorder = Arc::new(Recorder::new(Arc::clone(&host), streams, flush));
        host.install_handlers(recorder.handlers())
            .map_err(|source| StartupError::Host {
                context: "installing event handlers",
                source,
            })?;
        for kind in EventKind::ALL {
            if let Err(source) = host.set_event_enabled(kind, true) {
                rollback_install(host.as_ref());
                return Err(StartupError::Host {
                    context: "enabling event notifications",
                    source,
                });
            }
        }
        Ok(Self {
            host,
            role: Role::Record(recorder),
        })
    }

    pub fn recorder(&self) -> Option<&Arc<Recorder<P>>> {
        match &self.role {
            Role::Record(recorder) => Some(recorder),
            Role::Delegate { .. } => None,
        }
    }

    pub fn vm_start(&self) {
        info!("VM started");
    }

    /// Opens the embedded consumer in delegate mode.
    pub fn vm_init(&self) -> Result<(), RecordError> {
        info!("VM initialized");
        let Role::Delegate { config, consumer } = &self.role else {
            return Ok(());
        };
        let (Some(trace), Some(consumer)) = (&config.trace, consumer) else {
            return Ok(());
        };

        let request = OpenRequest {
            trace_file: trace.display().to_string(),
            instr_scheme_file: config
                .instr_scheme
                .as_ref()
                .map(|path| path.display().to_string()),
            num_meths: config.num_meths,
            num_loops: config.num_loops,
            instr_bound: config.instr_bound,
        };
        consumer
            .open(&request)
            .map_err(|err| RecordError::host("opening trace consumer", err))?;
        info!(
            trace_file = %request.trace_file,
            num_meths = request.num_meths,
            num_loops = request.num_loops,
            instr_bound = request.instr_bound,
            "trace consumer opened"
        );
        Ok(())
    }

    /// Shutdown has begun: stop admitting events, or in delegate mode
    /// write the class listing and close the consumer.
    pub fn vm_death(&self) -> Result<(), RecordError> {
        info!("VM death");
        match &self.role {
            Role::Record(recorder) => {
                recorder.quiesce()?;
                debug!("event notifications disabled");
                Ok(())
            }
            Role::Delegate { config, consumer } => {
                if let Some(listing) = &config.class_listing {
                    let classes = self
                        .host
                        .loaded_classes()
                        .map_err(|err| RecordError::host("listing loaded classes", err))?;
                    let counts = write_class_listing(&classes, listing)?;
                    info!(
                        user = counts.user,
                        boot = counts.boot,
                        skipped_arrays = counts.skipped_arrays,
                        "wrote loaded class listing"
                    );
                }
                if let (Some(_), Some(consumer)) = (&config.trace, consumer) {
                    consumer
                        .close()
                        .map_err(|err| RecordError::host("closing trace consumer", err))?;
                    info!("trace consumer closed");
                }
                Ok(())
            }
        }
    }

    /// Writes the trailer, closes every stream and detaches from the host.
    /// Returns the run's statistics when this agent was recording.
    pub fn stop(self) -> Result<Option<RunStats>, RecordError> {
        let Role::Record(recorder) = &self.role else {
            info!("stepwise agent stopped");
            return Ok(None);
        };

        let finished = recorder.finish();
        self.host
            .uninstall_handlers()
            .map_err(|err| RecordError::host("uninstalling event handlers", err))?;
        let stats = finished?;
        info!(
            entities = stats.entities,
            methods = stats.methods,
            records = stats.records(),
            "stepwise agent stopped"
        );
        Ok(Some(stats))
    }
}

/// Undoes a partial install so no handler outlives a failed start.
fn rollback_install<P: InstrumentationProvider>(host: &P) {
    for kind in EventKind::ALL {
        if let Err(err) = host.set_event_enabled(kind, false) {
            warn!(event = %kind, %err, "failed to disable notifications after aborted start");
        }
    }
    if let Err(err) = host.uninstall_handlers() {
        warn!(%err, "failed to uninstall handlers after aborted start");
    }
}

fn check_location_format<P: InstrumentationProvider>(host: &P) -> Result<(), StartupError> {
    let format = host
        .location_format()
        .map_err(|source| StartupError::Host {
            context: "querying location format",
            source,
        })?;
    if !format.is_flat_per_method() {
        return Err(StartupError::UnsupportedLocationFormat { format });
    }
    Ok(())
}

fn open_stream(path: &Path) -> Result<Stream, StartupError> {
    let file = File::create(path).map_err(|source| StartupError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(BufWriter::new(file)))
}
