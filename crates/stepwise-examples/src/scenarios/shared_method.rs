use crate::scenarios::{Session, shutdown};
use std::sync::{Arc, Barrier};
use std::thread;
use stepwise_recorder::sim::{SimHost, SimMethod, SimThread};
use stepwise_types::RunStats;

/// Several threads enter the same method at once. It is interned exactly once.
pub fn run(session: &Session) -> Result<Option<RunStats>, String> {
    const WORKERS: u64 = 4;

    let host = Arc::new(SimHost::new());
    let agent = session.start(&host)?;
    let method = SimMethod::new("LService;", "handle", "(Ljava/lang/Object;)V");
    let start_line = Arc::new(Barrier::new(WORKERS as usize));

    let workers: Vec<_> = (1..=WORKERS)
        .map(|id| {
            let host = Arc::clone(&host);
            let method = method.clone();
            let start_line = Arc::clone(&start_line);
            thread::spawn(move || {
                let me = SimThread::new(id);
                start_line.wait();
                host.enter(&me, &method);
                host.exit(&me, &method, false);
            })
        })
        .collect();
    for worker in workers {
        worker
            .join()
            .map_err(|_| "shared-method worker panicked".to_owned())?;
    }

    let stats = shutdown(agent)?;
    if let Some(stats) = &stats {
        println!(
            "shared-method: {} threads, {} distinct method(s)",
            stats.entities, stats.methods
        );
    }
    Ok(stats)
}
