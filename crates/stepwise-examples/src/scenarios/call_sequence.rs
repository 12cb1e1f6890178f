use crate::scenarios::{Session, shutdown};
use std::sync::Arc;
use std::thread;
use stepwise_recorder::sim::{SimHost, SimMethod, SimThread};
use stepwise_types::RunStats;

/// One thread calls into a helper and returns; a second thread then enters
/// a method of its own.
pub fn run(session: &Session) -> Result<Option<RunStats>, String> {
    let host = Arc::new(SimHost::new());
    let agent = session.start(&host)?;

    let f = SimMethod::new("C", "f", "()V");
    let g = SimMethod::new("C", "g", "(I)V");

    let first = {
        let host = Arc::clone(&host);
        let f = f.clone();
        thread::spawn(move || {
            let me = SimThread::new(1);
            host.enter(&me, &f);
            host.exit(&me, &f, false);
        })
    };
    first
        .join()
        .map_err(|_| "call-sequence worker panicked".to_owned())?;

    let second = {
        let host = Arc::clone(&host);
        thread::spawn(move || {
            host.enter(&SimThread::new(2), &g);
        })
    };
    second
        .join()
        .map_err(|_| "call-sequence worker panicked".to_owned())?;

    println!("call-sequence: two threads, two methods");
    shutdown(agent)
}
