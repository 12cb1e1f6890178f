use crate::writer::{FlushPolicy, Stream};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use stepwise_types::{InvariantError, MethodId, MethodKey};

#[derive(Debug)]
pub enum InternError {
    Io(io::Error),
    IdSpaceExhausted(InvariantError),
}

impl fmt::Display for InternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to append to dictionary stream: {err}"),
            Self::IdSpaceExhausted(err) => write!(f, "method id space exhausted: {err}"),
        }
    }
}

impl Error for InternError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::IdSpaceExhausted(err) => Some(err),
        }
    }
}

/// Interns method keys into dense ids, writing each newly seen key as the
/// next line of the dictionary stream. Line `i` of the stream is method `i`.
pub struct MethodDictionary {
    ids: HashMap<MethodKey, MethodId>,
    next_id: MethodId,
    out: Stream,
    flush: FlushPolicy,
}

impl MethodDictionary {
    pub fn new(out: Stream, flush: FlushPolicy) -> Self {
        Self {
            ids: HashMap::new(),
            next_id: MethodId::FIRST,
            out,
            flush,
        }
    }

    pub fn intern(&mut self, key: MethodKey) -> Result<MethodId, InternError> {
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }

        let id = self.next_id;
        let next_id = id.next().map_err(InternError::IdSpaceExhausted)?;
        // id becomes visible only once its line is written
        writeln!(self.out, "{key}").map_err(InternError::Io)?;
        if self.flush == FlushPolicy::Line {
            self.out.flush().map_err(InternError::Io)?;
        }
        self.ids.insert(key, id);
        self.next_id = next_id;
        Ok(id)
    }

    pub fn get(&self, key: &MethodKey) -> Option<MethodId> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> u32 {
        self.next_id.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FailingStream, SharedBuffer};

    fn key(declaring_type: &str, name: &str, descriptor: &str) -> MethodKey {
        MethodKey::new(declaring_type, name, descriptor).expect("valid key")
    }

    fn intern(dictionary: &mut MethodDictionary, key: MethodKey) -> u32 {
        match dictionary.intern(key) {
            Ok(id) => id.get(),
            Err(err) => panic!("intern failed: {err}"),
        }
    }

    #[test]
    fn interning_twice_returns_same_id_and_writes_once() {
        let buffer = SharedBuffer::new();
        let mut dictionary = MethodDictionary::new(Box::new(buffer.clone()), FlushPolicy::Line);

        assert_eq!(intern(&mut dictionary, key("LC;", "f", "()V")), 0);
        assert_eq!(intern(&mut dictionary, key("LC;", "f", "()V")), 0);
        assert_eq!(intern(&mut dictionary, key("LC;", "f", "()V")), 0);

        assert_eq!(buffer.contents(), "LC;f()V\n");
        assert_eq!(dictionary.len(), 1);
    }

    #[test]
    fn line_index_matches_method_id() {
        let buffer = SharedBuffer::new();
        let mut dictionary = MethodDictionary::new(Box::new(buffer.clone()), FlushPolicy::Close);
        let keys = [
            key("LA;", "run", "()V"),
            key("LB;", "<init>", "(I)V"),
            key("LA;", "run", "()V"),
            key("LA;", "get", "()Ljava/lang/Object;"),
            key("LB;", "<init>", "(I)V"),
        ];
        let ids: Vec<u32> = keys
            .iter()
            .cloned()
            .map(|k| intern(&mut dictionary, k))
            .collect();
        assert_eq!(ids, vec![0, 1, 0, 2, 1]);
        dictionary.close().expect("close");

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for (k, id) in keys.iter().zip(&ids) {
            assert_eq!(lines[MethodId::new(*id).index()], k.as_str());
        }
    }

    #[test]
    fn content_equal_keys_share_an_id() {
        let buffer = SharedBuffer::new();
        let mut dictionary = MethodDictionary::new(Box::new(buffer.clone()), FlushPolicy::Line);
        let a = intern(&mut dictionary, key("LA;", "bc", "()V"));
        let b = intern(&mut dictionary, key("LA;b", "c", "()V"));
        assert_eq!(a, b);
        assert_eq!(dictionary.get(&key("LA;", "bc", "()V")), Some(MethodId::new(0)));
    }

    #[test]
    fn failed_write_publishes_no_id() {
        let buffer = SharedBuffer::new();
        let out = FailingStream::after_lines(buffer.clone(), 1);
        let mut dictionary = MethodDictionary::new(Box::new(out), FlushPolicy::Line);
        assert_eq!(intern(&mut dictionary, key("LA;", "f", "()V")), 0);

        let err = dictionary.intern(key("LA;", "g", "()V")).expect_err("stream is full");
        assert!(matches!(err, InternError::Io(_)));
        assert_eq!(dictionary.len(), 1);
        assert_eq!(dictionary.get(&key("LA;", "g", "()V")), None);
        assert_eq!(buffer.contents(), "LA;f()V\n");
    }
}
