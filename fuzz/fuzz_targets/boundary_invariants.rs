//! Fuzzing the multi-def boundary computation.
//!
//! 1. Generate an arbitrary CFG with arbitrary defs and uses of a root
//!    value's leaves.
//! 2. Record the uses, compute the boundary, and check the analysis
//!    invariants (monotone block states, a boundary fact in every
//!    live-within block, a stable boundary).

#![no_main]
use libfuzzer_sys::fuzz_target;

use fieldlive::fuzzing::{check_invariants, LivenessCase};

fuzz_target!(|case: LivenessCase| {
    let _ = env_logger::try_init();
    log::debug!("case:\n{}", case.body.display("", Some(&case.module)));
    check_invariants(&case);
});
