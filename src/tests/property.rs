//! Property-based tests for verifying scheduler invariants.

#[cfg(test)]
mod property_tests {
    use crate::mem::StackSizeClass;
    use crate::sched::{
        Blocking, RoundRobinScheduler, Scheduler, SchedulerState, Termination, MAX_THREAD_NUM,
    };
    use crate::thread::{ThreadId, ThreadState};

    /// Simple linear congruential generator for property testing.
    struct SimpleRng {
        state: u64,
    }

    impl SimpleRng {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_u64(&mut self) -> u64 {
            self.state = self
                .state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.state
        }

        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            min + (self.next_u64() % (max - min))
        }

        fn gen_bool(&mut self) -> bool {
            self.next_u64() & 1 == 0
        }
    }

    unsafe extern "C" fn never_started() -> ! {
        std::process::abort()
    }

    type State = SchedulerState<RoundRobinScheduler>;

    fn spawn(state: &mut State) -> Option<ThreadId> {
        state
            .spawn(Box::new(|| {}), StackSizeClass::Small, None, never_started)
            .ok()
    }

    fn random_id(rng: &mut SimpleRng) -> ThreadId {
        // Slightly past the table so out-of-range ids come up too.
        ThreadId::new(rng.gen_range(0, MAX_THREAD_NUM as u64 + 5) as usize)
    }

    /// End the running thread's quantum the way the preemption handler does.
    fn preempt(state: &mut State) {
        state.requeue_running();
        state.dispatch().unwrap();
    }

    #[test]
    fn property_invariants_survive_random_operations() {
        let mut rng = SimpleRng::new(0x5EED_0001);
        let mut state = SchedulerState::new(RoundRobinScheduler::new());

        for _ in 0..5000 {
            match rng.gen_range(0, 7) {
                0 | 1 => {
                    let expected = state.table().lowest_free();
                    assert_eq!(spawn(&mut state), expected);
                }
                2 => {
                    let id = random_id(&mut rng);
                    if !id.is_main() {
                        match state.terminate(id) {
                            Ok(Termination::RemovedRunning) => {
                                state.dispatch().unwrap();
                                assert_eq!(state.take_zombie().map(|t| t.id()), Some(id));
                            }
                            Ok(Termination::Removed) => {}
                            Ok(Termination::Shutdown) => unreachable!(),
                            Err(_) => assert!(!state.table().contains(id)),
                        }
                    }
                }
                3 => {
                    let id = random_id(&mut rng);
                    if let Ok(Blocking::BlockedRunning) = state.block(id) {
                        state.dispatch().unwrap();
                    }
                }
                4 => {
                    let id = random_id(&mut rng);
                    let was_blocked = state
                        .table()
                        .get(id)
                        .map(|t| t.state() == ThreadState::Blocked);
                    match state.resume(id) {
                        Ok(changed) => assert_eq!(Some(changed), was_blocked),
                        Err(_) => assert!(was_blocked.is_none()),
                    }
                }
                _ => preempt(&mut state),
            }
            state.assert_consistent();
            assert!(state.table().contains(ThreadId::MAIN));
        }
    }

    #[test]
    fn property_round_robin_is_fair() {
        let mut rng = SimpleRng::new(0xFA1E_0002);

        for _ in 0..20 {
            let mut state = SchedulerState::new(RoundRobinScheduler::new());
            let threads = rng.gen_range(1, 12) as usize;
            for _ in 0..threads {
                spawn(&mut state).unwrap();
            }

            let rounds = rng.gen_range(1, 50);
            for _ in 0..rounds * (threads as u64 + 1) {
                preempt(&mut state);
            }

            // Every thread, main included, got exactly one quantum per round.
            let report = state.status();
            let spawned: Vec<u64> = report.threads.iter().skip(1).map(|t| t.quanta).collect();
            assert!(spawned.iter().all(|&q| q == rounds));
            assert_eq!(report.threads[0].quanta, rounds + 1);
        }
    }

    #[test]
    fn property_total_is_sum_of_dispatches() {
        let mut rng = SimpleRng::new(0x7074_0003);
        let mut state = SchedulerState::new(RoundRobinScheduler::new());
        for _ in 0..rng.gen_range(1, 20) {
            spawn(&mut state).unwrap();
        }

        for _ in 0..1000 {
            if rng.gen_bool() {
                preempt(&mut state);
            } else {
                let id = random_id(&mut rng);
                if rng.gen_bool() {
                    if let Ok(Blocking::BlockedRunning) = state.block(id) {
                        state.dispatch().unwrap();
                    }
                } else {
                    let _ = state.resume(id);
                }
            }

            let sum: u64 = state.table().iter().map(|t| t.quantum_count()).sum();
            assert_eq!(state.total_quanta(), sum);
        }
    }

    #[test]
    fn property_resumed_threads_keep_fifo_order() {
        let mut rng = SimpleRng::new(0xF1F0_0004);

        for _ in 0..50 {
            let mut state = SchedulerState::new(RoundRobinScheduler::new());
            let count = rng.gen_range(2, 30) as usize;
            let ids: Vec<ThreadId> = (0..count).filter_map(|_| spawn(&mut state)).collect();
            for &id in &ids {
                state.block(id).unwrap();
            }
            assert!(state.ready().is_empty());

            // Resume in a random order; the queue must follow that order.
            let mut order = ids.clone();
            for i in (1..order.len()).rev() {
                let j = rng.gen_range(0, i as u64 + 1) as usize;
                order.swap(i, j);
            }
            for &id in &order {
                state.resume(id).unwrap();
            }
            assert_eq!(state.ready().ready_ids(), order);
            state.assert_consistent();
        }
    }
}
