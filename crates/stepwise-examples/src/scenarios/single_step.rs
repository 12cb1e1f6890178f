use crate::scenarios::{Session, shutdown};
use std::sync::Arc;
use stepwise_recorder::sim::{SimHost, SimMethod, SimThread};
use stepwise_types::RunStats;

/// Steps through a small loop body, bytecode index by bytecode index.
pub fn run(session: &Session) -> Result<Option<RunStats>, String> {
    let host = Arc::new(SimHost::new());
    let agent = session.start(&host)?;

    let me = SimThread::new(1);
    let sum = SimMethod::new("LLoop;", "sum", "([I)I");
    host.enter(&me, &sum);
    for _ in 0..3 {
        for location in [4, 5, 6, 7, 10, 13] {
            host.step(&me, &sum, location);
        }
    }
    host.step(&me, &sum, 16);
    host.exit(&me, &sum, false);

    println!("single-step: one method, 19 steps");
    shutdown(agent)
}
