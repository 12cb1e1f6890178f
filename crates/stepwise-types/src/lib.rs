//! Value types shared by the stepwise recorder and its consumers.
//!
//! Everything here is plain data: identities handed out by the recorder,
//! the content key used to intern methods, and the line shapes written to
//! the trace stream.

use facet::Facet;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    EmptyField(&'static str),
    Overflow(&'static str),
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::EmptyField(field) => write!(f, "{field} must be non-empty"),
            Self::Overflow(field) => write!(f, "{field} overflowed"),
        }
    }
}

impl Error for InvariantError {}

/// Stable identity of a thread or object, dense from 1 in first-seen order.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct EntityTag(u64);

impl EntityTag {
    pub const FIRST: Self = Self(1);

    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("entity_tag"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Result<Self, InvariantError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(InvariantError::Overflow("entity_tag"))
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense method identity, assigned from 0 in first-interned order.
///
/// Doubles as the line index of the method in the dictionary stream.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct MethodId(u32);

impl MethodId {
    pub const FIRST: Self = Self(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn next(self) -> Result<Self, InvariantError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(InvariantError::Overflow("method_id"))
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-supplied program location inside a method.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct Location(i64);

impl Location {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the host numbers program locations.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum LocationFormat {
    /// Flat, monotonically addressable index into each method's bytecode.
    BytecodeIndex,
    MachinePc,
    Other(String),
}

impl LocationFormat {
    pub fn is_flat_per_method(&self) -> bool {
        matches!(self, Self::BytecodeIndex)
    }
}

impl fmt::Display for LocationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BytecodeIndex => write!(f, "bytecode-index"),
            Self::MachinePc => write!(f, "machine-pc"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Content identity of a method: declaring-type signature, name and
/// parameter/return signature, concatenated in that order.
///
/// Equality and hashing only look at the concatenation, so two keys whose
/// pieces split differently but render the same are the same method.
#[derive(Debug, Clone)]
pub struct MethodKey {
    signature: String,
    name_at: usize,
    descriptor_at: usize,
}

impl MethodKey {
    pub fn new(declaring_type: &str, name: &str, descriptor: &str) -> Result<Self, InvariantError> {
        if declaring_type.is_empty() {
            return Err(InvariantError::EmptyField("declaring_type"));
        }
        if name.is_empty() {
            return Err(InvariantError::EmptyField("method_name"));
        }
        if descriptor.is_empty() {
            return Err(InvariantError::EmptyField("method_descriptor"));
        }

        let mut signature =
            String::with_capacity(declaring_type.len() + name.len() + descriptor.len());
        signature.push_str(declaring_type);
        signature.push_str(name);
        signature.push_str(descriptor);

        Ok(Self {
            signature,
            name_at: declaring_type.len(),
            descriptor_at: declaring_type.len() + name.len(),
        })
    }

    /// The rendered dictionary line for this method.
    pub fn as_str(&self) -> &str {
        &self.signature
    }

    pub fn declaring_type(&self) -> &str {
        &self.signature[..self.name_at]
    }

    pub fn name(&self) -> &str {
        &self.signature[self.name_at..self.descriptor_at]
    }

    pub fn descriptor(&self) -> &str {
        &self.signature[self.descriptor_at..]
    }
}

impl PartialEq for MethodKey {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for MethodKey {}

impl std::hash::Hash for MethodKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature)
    }
}

/// How a method event names its method on the trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRef<'a> {
    Id(MethodId),
    Signature(&'a str),
}

impl fmt::Display for MethodRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Signature(signature) => f.write_str(signature),
        }
    }
}

/// One trace line, without its terminating newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRecord<'a> {
    Enter {
        tag: EntityTag,
        method: MethodRef<'a>,
    },
    Exit {
        tag: EntityTag,
        method: MethodRef<'a>,
    },
    Step {
        tag: EntityTag,
        location: Location,
    },
}

impl fmt::Display for EventRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter { tag, method } => write!(f, "{tag} E {method}"),
            Self::Exit { tag, method } => write!(f, "{tag} X {method}"),
            Self::Step { tag, location } => write!(f, "{tag} {location}"),
        }
    }
}

/// Final trace line: the number of distinct entities observed.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub entities: u64,
}

impl fmt::Display for Trailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entities)
    }
}

/// Counters describing a recording run.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub entities: u64,
    pub methods: u32,
    pub entries: u64,
    pub exits: u64,
    pub steps: u64,
}

impl RunStats {
    pub fn records(&self) -> u64 {
        self.entries + self.exits + self.steps
    }
}
