use crate::writer::FlushPolicy;
use std::path::PathBuf;

pub const DEFAULT_TRACE_FILE: &str = "trace.txt";
pub const DEFAULT_DICTIONARY_FILE: &str = "M.dynamic.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub flush: FlushPolicy,
}

impl AgentConfig {
    /// Trace lines carry the full method signature.
    pub fn inline(trace: impl Into<PathBuf>) -> Self {
        Self {
            mode: AgentMode::Record(RecordConfig {
                trace: trace.into(),
                naming: MethodNaming::Inline,
            }),
            flush: FlushPolicy::default(),
        }
    }

    /// Trace lines carry method ids; signatures go to the dictionary file.
    pub fn interned(trace: impl Into<PathBuf>, dictionary: impl Into<PathBuf>) -> Self {
        Self {
            mode: AgentMode::Record(RecordConfig {
                trace: trace.into(),
                naming: MethodNaming::Interned {
                    dictionary: dictionary.into(),
                },
            }),
            flush: FlushPolicy::default(),
        }
    }

    pub fn delegate(config: DelegateConfig) -> Self {
        Self {
            mode: AgentMode::Delegate(config),
            flush: FlushPolicy::default(),
        }
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMode {
    /// Install event handlers and write trace files directly.
    Record(RecordConfig),
    /// Install no handlers; hand the run to an embedded trace consumer.
    Delegate(DelegateConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConfig {
    pub trace: PathBuf,
    pub naming: MethodNaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodNaming {
    Inline,
    Interned { dictionary: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateConfig {
    /// When absent the consumer is never opened or closed.
    pub trace: Option<PathBuf>,
    pub instr_scheme: Option<PathBuf>,
    pub num_meths: i32,
    pub num_loops: i32,
    pub instr_bound: i32,
    pub class_listing: Option<ClassListing>,
}

/// Where loaded classes are written at VM death, split by defining loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassListing {
    pub classes: PathBuf,
    pub boot_classes: PathBuf,
}
