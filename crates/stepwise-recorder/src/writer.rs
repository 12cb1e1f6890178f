use facet::Facet;
use std::io::{self, Write};
use stepwise_types::{EntityTag, EventRecord, Location, MethodRef, RunStats, Trailer};

/// Append-only output sink for a trace or dictionary stream.
pub type Stream = Box<dyn Write + Send>;

#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush after every line, so a killed process leaves whole lines behind.
    #[default]
    Line,
    /// Buffer until the stream is closed.
    Close,
}

/// Writes one line per event to the trace stream.
pub struct EventWriter {
    out: Stream,
    flush: FlushPolicy,
    entries: u64,
    exits: u64,
    steps: u64,
}

impl EventWriter {
    pub fn new(out: Stream, flush: FlushPolicy) -> Self {
        Self {
            out,
            flush,
            entries: 0,
            exits: 0,
            steps: 0,
        }
    }

    pub fn enter(&mut self, tag: EntityTag, method: MethodRef<'_>) -> io::Result<()> {
        self.append(EventRecord::Enter { tag, method })?;
        self.entries += 1;
        Ok(())
    }

    pub fn exit(&mut self, tag: EntityTag, method: MethodRef<'_>) -> io::Result<()> {
        self.append(EventRecord::Exit { tag, method })?;
        self.exits += 1;
        Ok(())
    }

    pub fn step(&mut self, tag: EntityTag, location: Location) -> io::Result<()> {
        self.append(EventRecord::Step { tag, location })?;
        self.steps += 1;
        Ok(())
    }

    /// Writes the trailer and flushes; the writer is consumed.
    pub fn close(mut self, trailer: Trailer) -> io::Result<()> {
        writeln!(self.out, "{trailer}")?;
        self.out.flush()
    }

    /// Fills in the per-kind record counters of `stats`.
    pub fn fill_stats(&self, stats: &mut RunStats) {
        stats.entries = self.entries;
        stats.exits = self.exits;
        stats.steps = self.steps;
    }

    fn append(&mut self, record: EventRecord<'_>) -> io::Result<()> {
        writeln!(self.out, "{record}")?;
        if self.flush == FlushPolicy::Line {
            self.out.flush()?;
        }
        Ok(())
    }
}
