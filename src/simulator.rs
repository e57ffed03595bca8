//! Ties the barrier, the rendezvous fabric, the finished queue and the
//! configured quantum into one shared object, and drives the worker
//! threads that each own a [`NodeScheduler`].
//!
//! Per the design notes: the quantum, finished queue, barrier and fabric
//! are effectively process-wide state. Rather than reach for `static`s,
//! this crate bundles them into a `Simulator` and hands every node
//! worker an `Arc` clone of it — the same shape the teacher crate uses
//! for its own shared-between-threads state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use log::info;

use crate::barrier::PhasedBarrier;
use crate::context::Context;
use crate::loader::Workload;
use crate::priority_queue::PriorityQueue;
use crate::rendezvous::Fabric;
use crate::scheduler::NodeScheduler;

type SharedContext = Arc<Mutex<Context>>;

pub struct Simulator {
    pub(crate) quantum: i64,
    pub(crate) fabric: Arc<Fabric>,
    pub(crate) barrier: Arc<PhasedBarrier>,
    pub(crate) finished: Arc<Mutex<PriorityQueue<SharedContext>>>,
}

impl Simulator {
    fn new(quantum: i64, num_threads: i64) -> Self {
        Simulator {
            quantum,
            fabric: Arc::new(Fabric::new()),
            barrier: Arc::new(PhasedBarrier::new(num_threads as usize)),
            finished: Arc::new(Mutex::new(PriorityQueue::new())),
        }
    }
}

/// Run a workload to completion: one OS thread per node, joined at the
/// end. Returns the finished processes in the global completion order
/// `(finish_time, node_id, pid)`.
pub fn run(workload: Workload) -> Vec<SharedContext> {
    let num_threads = workload.num_threads;
    let sim = Arc::new(Simulator::new(workload.quantum, num_threads));

    let mut by_node: HashMap<i64, Vec<Context>> = HashMap::new();
    for proc in workload.processes {
        by_node.entry(proc.node_id).or_default().push(proc);
    }

    info!(
        "starting simulation: {} node(s), quantum={}",
        num_threads, workload.quantum
    );

    let handles: Vec<_> = (1..=num_threads)
        .map(|node_id| {
            let sim = sim.clone();
            let procs = by_node.remove(&node_id).unwrap_or_default();
            thread::spawn(move || {
                let mut scheduler = NodeScheduler::new(node_id);
                for proc in procs {
                    scheduler.admit(proc, &sim);
                }
                scheduler.run(&sim);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("node worker thread panicked");
    }

    let mut finished = sim.finished.lock().unwrap();
    let mut out = Vec::new();
    while let Some(ctx) = finished.remove() {
        out.push(ctx);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load;

    fn run_str(input: &str) -> Vec<SharedContext> {
        let workload = load(input).expect("workload should parse");
        run(workload)
    }

    /// Smoke test for the wiring between `Simulator::new`, the per-node
    /// threads and the finished queue; the scenario matrix lives in
    /// `tests/scenarios.rs` against the public API.
    #[test]
    fn run_drains_every_process_to_the_finished_queue() {
        let done = run_str("2 5 1\nA 0 1\nDOOP 1\nHALT\nB 0 1\nDOOP 1\nHALT\n");
        assert_eq!(done.len(), 2);
    }
}
