use parking_lot::Mutex;

/// The single exclusive region guarding all recorder state.
///
/// Every callback body runs inside [`Coordinator::with_lock`], so trace
/// lines appear in admission order and never interleave. The guard is
/// released on every exit path, unwinding included.
pub struct Coordinator<S> {
    region: Mutex<S>,
}

impl<S> Coordinator<S> {
    pub fn new(state: S) -> Self {
        Self {
            region: Mutex::new(state),
        }
    }

    pub fn with_lock<R>(&self, body: impl FnOnce(&mut S) -> R) -> R {
        let mut state = self.region.lock();
        body(&mut state)
    }

    pub fn into_inner(self) -> S {
        self.region.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bodies_run_one_at_a_time() {
        let coordinator = Arc::new(Coordinator::new(Vec::<(usize, usize)>::new()));
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let coordinator = Arc::clone(&coordinator);
                thread::spawn(move || {
                    for step in 0..200 {
                        coordinator.with_lock(|log| {
                            // two pushes per admission must stay adjacent
                            log.push((worker, step));
                            log.push((worker, step));
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        let coordinator = Arc::try_unwrap(coordinator)
            .unwrap_or_else(|_| panic!("coordinator still shared"));
        let log = coordinator.into_inner();
        assert_eq!(log.len(), 8 * 200 * 2);
        for pair in log.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn region_is_released_when_body_panics() {
        let coordinator = Coordinator::new(0u32);
        let result = catch_unwind(AssertUnwindSafe(|| {
            coordinator.with_lock(|count| {
                *count += 1;
                panic!("body failed");
            })
        }));
        assert!(result.is_err());
        assert_eq!(coordinator.with_lock(|count| *count), 1);
    }
}
