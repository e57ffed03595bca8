//! The mandated per-state-transition output stream.
//!
//! This is the simulator's *product*, not a diagnostic: every line is
//! written unconditionally to stdout, serialized by a single
//! process-wide lock so that lines from different node threads never
//! interleave mid-line. It is deliberately independent of the `log`
//! crate (§13) used for internal diagnostics — gating this output behind
//! `RUST_LOG` would break the documented trace format.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::context::ProcState;

static STDOUT_LOCK: Mutex<()> = Mutex::new(());

/// `[NN] TTTTT: process P STATE`, matching the original's
/// `printf("[%2.2d] %5.5d: process %d %s\n", ...)`.
pub fn log_transition(node_id: i64, clock_time: u64, pid: i64, state: ProcState) {
    let _guard = STDOUT_LOCK.lock().unwrap();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "[{node_id:02}] {clock_time:05}: process {pid} {state}");
}

/// One line of the final statistics table, under the same lock so it
/// never interleaves with a straggling transition line either.
pub fn log_stats_line(line: &str) {
    let _guard = STDOUT_LOCK.lock().unwrap();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{line}");
}
