//! Quantum accounting under preemption.

mod common;

use common::{finish, init_logging, spin, wait_for};
use preemptive_uthreads::{self as uthreads, Config, StackSizeClass, ThreadBuilder, ThreadId};

fn main() {
    init_logging();
    let config = Config::new(2000).unwrap().stack_size(StackSizeClass::Small);
    uthreads::init_with(config).unwrap();

    let (a, b) = {
        let _guard = uthreads::disable_preemption();
        let a = ThreadBuilder::new().name("spinner-a").spawn(spin).unwrap();
        let b = ThreadBuilder::new()
            .name("spinner-b")
            .stack_size(StackSizeClass::Medium)
            .spawn(spin)
            .unwrap();
        (a, b)
    };

    // The spinners never yield, so only the timer moves them along.
    let mut rounds = 0;
    wait_for("twenty quanta each", || {
        rounds += 1;
        let _guard = uthreads::disable_preemption();
        uthreads::quantums(a).unwrap() >= 20 && uthreads::quantums(b).unwrap() >= 20
    });
    assert!(rounds > 0);

    {
        let _guard = uthreads::disable_preemption();
        let report = uthreads::status().unwrap();
        let qa = uthreads::quantums(a).unwrap();
        let qb = uthreads::quantums(b).unwrap();
        assert!(qa.abs_diff(qb) <= 1, "unfair split: {} vs {}", qa, qb);

        let sum: u64 = report.threads.iter().map(|t| t.quanta).sum();
        assert_eq!(report.total_quanta, sum);
        assert_eq!(uthreads::total_quantums().unwrap(), sum);
        assert_eq!(report.running, ThreadId::MAIN);

        let names: Vec<_> = report.threads.iter().map(|t| t.name.clone()).collect();
        assert_eq!(
            names,
            [
                Some("main".to_string()),
                Some("spinner-a".to_string()),
                Some("spinner-b".to_string())
            ]
        );
    }

    // Terminating a spinner leaves the survivor alone with main.
    uthreads::terminate(a).unwrap();
    let before = uthreads::quantums(b).unwrap();
    wait_for("the survivor to keep running", || {
        uthreads::quantums(b).unwrap() >= before + 5
    });

    finish()
}
