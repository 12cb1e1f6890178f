//! Parsing of the agent option string, e.g.
//! `t_file_name=/tmp/t.txt,m_file_name=/tmp/m.txt,flush=close`.
//!
//! Tokens are separated by runs of `,` and `=`; every recognized key takes
//! exactly one value token.

use crate::config::{
    AgentConfig, AgentMode, ClassListing, DEFAULT_DICTIONARY_FILE, DEFAULT_TRACE_FILE,
    DelegateConfig, MethodNaming, RecordConfig,
};
use crate::writer::FlushPolicy;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

const SEPARATORS: &[char] = &[',', '='];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    Missing,
    MissingValue { key: &'static str },
    UnknownOption { key: String },
    InvalidNumber { key: &'static str, value: String },
    InvalidMode { value: String },
    InvalidFlush { value: String },
    IncompleteClassListing { missing: &'static str },
    ModeConflict { mode: &'static str, key: &'static str },
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "expected options to agent"),
            Self::MissingValue { key } => write!(f, "cannot parse option {key}=<value>"),
            Self::UnknownOption { key } => write!(f, "unknown option: {key}"),
            Self::InvalidNumber { key, value } => {
                write!(f, "cannot parse option {key}=<num>: {value:?} is not a number")
            }
            Self::InvalidMode { value } => write!(
                f,
                "unknown mode {value:?}; expected one of inline, interned, delegate"
            ),
            Self::InvalidFlush { value } => {
                write!(f, "unknown flush policy {value:?}; expected line or close")
            }
            Self::IncompleteClassListing { missing } => write!(
                f,
                "class listing needs both classes_file_name and boot_classes_file_name; {missing} is missing"
            ),
            Self::ModeConflict { mode, key } => {
                write!(f, "option {key} cannot be used in {mode} mode")
            }
        }
    }
}

impl Error for OptionsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeName {
    Inline,
    Interned,
    Delegate,
}

impl ModeName {
    fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Interned => "interned",
            Self::Delegate => "delegate",
        }
    }
}

#[derive(Default)]
struct RawOptions {
    trace_file_name: Option<String>,
    t_file_name: Option<String>,
    m_file_name: Option<String>,
    instr_scheme_file_name: Option<String>,
    classes_file_name: Option<String>,
    boot_classes_file_name: Option<String>,
    num_meths: Option<i32>,
    num_loops: Option<i32>,
    instr_bound: Option<i32>,
    mode: Option<ModeName>,
    flush: Option<FlushPolicy>,
}

impl RawOptions {
    fn dictionary_keys(&self) -> Option<&'static str> {
        if self.t_file_name.is_some() {
            Some("t_file_name")
        } else if self.m_file_name.is_some() {
            Some("m_file_name")
        } else {
            None
        }
    }

    fn delegate_keys(&self) -> Option<&'static str> {
        [
            ("instr_scheme_file_name", self.instr_scheme_file_name.is_some()),
            ("classes_file_name", self.classes_file_name.is_some()),
            ("boot_classes_file_name", self.boot_classes_file_name.is_some()),
            ("num_meths", self.num_meths.is_some()),
            ("num_loops", self.num_loops.is_some()),
            ("instr_bound", self.instr_bound.is_some()),
        ]
        .into_iter()
        .find_map(|(key, present)| present.then_some(key))
    }

    fn inferred_mode(&self) -> ModeName {
        if self.dictionary_keys().is_some() {
            ModeName::Interned
        } else if self.delegate_keys().is_some() {
            ModeName::Delegate
        } else {
            ModeName::Inline
        }
    }
}

/// Splits on runs of separators, skipping leading ones.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.rest.trim_start_matches(SEPARATORS);
        if start.is_empty() {
            self.rest = start;
            return None;
        }
        let end = start.find(SEPARATORS).unwrap_or(start.len());
        let (token, rest) = start.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

pub fn parse_options(options: Option<&str>) -> Result<AgentConfig, OptionsError> {
    let Some(options) = options else {
        return Err(OptionsError::Missing);
    };

    let mut raw = RawOptions::default();
    let mut tokens = Tokens { rest: options };
    while let Some(token) = tokens.next() {
        match token {
            "trace_file_name" => raw.trace_file_name = Some(value(&mut tokens, "trace_file_name")?),
            "t_file_name" => raw.t_file_name = Some(value(&mut tokens, "t_file_name")?),
            "m_file_name" => raw.m_file_name = Some(value(&mut tokens, "m_file_name")?),
            "instr_scheme_file_name" => {
                raw.instr_scheme_file_name = Some(value(&mut tokens, "instr_scheme_file_name")?)
            }
            "classes_file_name" => {
                raw.classes_file_name = Some(value(&mut tokens, "classes_file_name")?)
            }
            "boot_classes_file_name" => {
                raw.boot_classes_file_name = Some(value(&mut tokens, "boot_classes_file_name")?)
            }
            "num_meths" => raw.num_meths = Some(number(&mut tokens, "num_meths")?),
            "num_loops" => raw.num_loops = Some(number(&mut tokens, "num_loops")?),
            "instr_bound" => raw.instr_bound = Some(number(&mut tokens, "instr_bound")?),
            "mode" => {
                let mode = value(&mut tokens, "mode")?;
                raw.mode = Some(match mode.as_str() {
                    "inline" => ModeName::Inline,
                    "interned" => ModeName::Interned,
                    "delegate" => ModeName::Delegate,
                    _ => return Err(OptionsError::InvalidMode { value: mode }),
                });
            }
            "flush" => {
                let flush = value(&mut tokens, "flush")?;
                raw.flush = Some(match flush.as_str() {
                    "line" => FlushPolicy::Line,
                    "close" => FlushPolicy::Close,
                    _ => return Err(OptionsError::InvalidFlush { value: flush }),
                });
            }
            other => {
                return Err(OptionsError::UnknownOption {
                    key: other.to_owned(),
                });
            }
        }
    }

    let mode_name = raw.mode.unwrap_or_else(|| raw.inferred_mode());
    let mode = match mode_name {
        ModeName::Inline => {
            if let Some(key) = raw.dictionary_keys().or(raw.delegate_keys()) {
                return Err(OptionsError::ModeConflict {
                    mode: mode_name.as_str(),
                    key,
                });
            }
            AgentMode::Record(RecordConfig {
                trace: path_or_default(raw.trace_file_name, DEFAULT_TRACE_FILE),
                naming: MethodNaming::Inline,
            })
        }
        ModeName::Interned => {
            // interned traces are named by t_file_name only
            let trace_key = raw.trace_file_name.is_some().then_some("trace_file_name");
            if let Some(key) = trace_key.or(raw.delegate_keys()) {
                return Err(OptionsError::ModeConflict {
                    mode: mode_name.as_str(),
                    key,
                });
            }
            AgentMode::Record(RecordConfig {
                trace: path_or_default(raw.t_file_name, DEFAULT_TRACE_FILE),
                naming: MethodNaming::Interned {
                    dictionary: path_or_default(raw.m_file_name, DEFAULT_DICTIONARY_FILE),
                },
            })
        }
        ModeName::Delegate => {
            if let Some(key) = raw.dictionary_keys() {
                return Err(OptionsError::ModeConflict {
                    mode: mode_name.as_str(),
                    key,
                });
            }
            let class_listing = match (raw.classes_file_name, raw.boot_classes_file_name) {
                (Some(classes), Some(boot_classes)) => Some(ClassListing {
                    classes: PathBuf::from(classes),
                    boot_classes: PathBuf::from(boot_classes),
                }),
                (Some(_), None) => {
                    return Err(OptionsError::IncompleteClassListing {
                        missing: "boot_classes_file_name",
                    });
                }
                (None, Some(_)) => {
                    return Err(OptionsError::IncompleteClassListing {
                        missing: "classes_file_name",
                    });
                }
                (None, None) => None,
            };
            AgentMode::Delegate(DelegateConfig {
                trace: raw.trace_file_name.map(PathBuf::from),
                instr_scheme: raw.instr_scheme_file_name.map(PathBuf::from),
                num_meths: raw.num_meths.unwrap_or(0),
                num_loops: raw.num_loops.unwrap_or(0),
                instr_bound: raw.instr_bound.unwrap_or(0),
                class_listing,
            })
        }
    };

    Ok(AgentConfig {
        mode,
        flush: raw.flush.unwrap_or_default(),
    })
}

fn value(tokens: &mut Tokens<'_>, key: &'static str) -> Result<String, OptionsError> {
    let value = tokens
        .next()
        .ok_or(OptionsError::MissingValue { key })?
        .to_owned();
    debug!(key, value = %value, "agent option");
    Ok(value)
}

fn number(tokens: &mut Tokens<'_>, key: &'static str) -> Result<i32, OptionsError> {
    let raw = value(tokens, key)?;
    raw.parse()
        .map_err(|_| OptionsError::InvalidNumber { key, value: raw })
}

fn path_or_default(value: Option<String>, default: &str) -> PathBuf {
    PathBuf::from(value.unwrap_or_else(|| default.to_owned()))
}
