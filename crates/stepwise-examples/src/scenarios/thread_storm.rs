use crate::scenarios::{Session, shutdown};
use std::sync::Arc;
use std::thread;
use stepwise_recorder::sim::{SimHost, SimMethod, SimThread};
use stepwise_types::RunStats;
use tracing::info;

const CALLS_PER_THREAD: usize = 1_000;

/// Many threads hammering a handful of methods. Every trace line must come
/// out whole.
pub fn run(session: &Session, threads: usize) -> Result<Option<RunStats>, String> {
    let host = Arc::new(SimHost::new());
    let agent = session.start(&host)?;
    let methods = Arc::new([
        SimMethod::new("LQueue;", "push", "(Ljava/lang/Object;)V"),
        SimMethod::new("LQueue;", "pop", "()Ljava/lang/Object;"),
        SimMethod::new("LQueue;", "len", "()I"),
    ]);

    info!(threads, calls = CALLS_PER_THREAD, "starting thread storm");
    let workers: Vec<_> = (0..threads as u64)
        .map(|id| {
            let host = Arc::clone(&host);
            let methods = Arc::clone(&methods);
            thread::spawn(move || {
                let me = SimThread::new(id);
                for call in 0..CALLS_PER_THREAD {
                    let method = &methods[call % methods.len()];
                    host.enter(&me, method);
                    host.step(&me, method, (call % 8) as i64);
                    host.exit(&me, method, call % 97 == 0);
                }
            })
        })
        .collect();
    for worker in workers {
        worker
            .join()
            .map_err(|_| "thread-storm worker panicked".to_owned())?;
    }

    let stats = shutdown(agent)?;
    if let Some(stats) = &stats {
        println!(
            "thread-storm: {} records from {} threads",
            stats.records(),
            stats.entities
        );
    }
    Ok(stats)
}
