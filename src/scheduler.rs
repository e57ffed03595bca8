//! The per-node scheduler: a tick loop that advances whichever process
//! owns the node's CPU, reinjects rendezvous completions and timed
//! wakeups, and dispatches the next ready process — synchronized against
//! every other node by the shared [`PhasedBarrier`] four times per tick.

use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::context::{Context, ProcState};
use crate::logger;
use crate::opcode::Opcode;
use crate::priority_queue::PriorityQueue;
use crate::simulator::Simulator;

type SharedContext = Arc<Mutex<Context>>;

/// How many completions we'll drain from the fabric in one pass of
/// Phase A. Generous relative to the `[1,100]` pid space.
const MAX_COMPLETIONS_PER_TICK: usize = 256;

pub struct NodeScheduler {
    node_id: i64,
    ready: PriorityQueue<SharedContext>,
    blocked: PriorityQueue<SharedContext>,
    running: Option<SharedContext>,
    remaining_quantum: i64,
    clock_time: u64,
    next_pid: i64,
}

impl NodeScheduler {
    pub fn new(node_id: i64) -> Self {
        NodeScheduler {
            node_id,
            ready: PriorityQueue::new(),
            blocked: PriorityQueue::new(),
            running: None,
            remaining_quantum: 0,
            clock_time: 0,
            next_pid: 1,
        }
    }

    /// Admit a freshly loaded process onto this node: assign it a pid,
    /// register its address with the rendezvous fabric, and queue it.
    pub fn admit(&mut self, mut proc: Context, sim: &Simulator) {
        proc.pid = self.next_pid;
        self.next_pid += 1;
        proc.state = ProcState::New;
        let (node_id, pid) = (proc.node_id, proc.pid);
        logger::log_transition(node_id, self.clock_time, pid, ProcState::New);

        let ctx = Arc::new(Mutex::new(proc));
        sim.fabric.register(node_id, pid, ctx.clone());
        self.insert_in_queue(ctx, true, sim);
    }

    /// Dispatch by the (possibly just-advanced) current op: queue for
    /// CPU/rendezvous, queue for a timed wakeup, or finish.
    fn insert_in_queue(&mut self, ctx: SharedContext, next_op: bool, sim: &Simulator) {
        let mut c = ctx.lock().unwrap();
        if next_op {
            c.advance();
        }

        match c.cur_op() {
            Opcode::Doop(_) => {
                c.state = ProcState::Ready;
                // Only a freshly-entered DOOP (next_op, i.e. just advanced
                // here from the prior opcode) starts at its full argument.
                // A process requeued mid-DOOP by quantum exhaustion keeps
                // whatever remaining duration Phase B already decremented
                // it to -- resetting here would erase that progress and
                // the process would never finish.
                if next_op {
                    c.duration = c.cur_arg();
                }
                c.wait_count += 1;
                c.enqueue_time = self.clock_time;
                let priority = c.actual_priority();
                let (node_id, pid, state) = (c.node_id, c.pid, c.state);
                drop(c);
                self.ready.add(ctx, priority);
                logger::log_transition(node_id, self.clock_time, pid, state);
            }
            Opcode::Send(_) | Opcode::Recv(_) => {
                c.state = ProcState::Ready;
                c.duration = 1; // not starved by SJF: see "Duration overload"
                c.wait_count += 1;
                c.enqueue_time = self.clock_time;
                let priority = c.actual_priority();
                let (node_id, pid, state) = (c.node_id, c.pid, c.state);
                drop(c);
                self.ready.add(ctx, priority);
                logger::log_transition(node_id, self.clock_time, pid, state);
            }
            Opcode::Block(_) => {
                let arg = c.cur_arg();
                c.state = ProcState::Blocked;
                c.duration = self.clock_time as i64 + arg;
                c.block_count += 1;
                c.block_time += arg;
                let wake_at = c.duration;
                let (node_id, pid, state) = (c.node_id, c.pid, c.state);
                drop(c);
                self.blocked.add(ctx, wake_at);
                logger::log_transition(node_id, self.clock_time, pid, state);
            }
            Opcode::Halt => {
                c.state = ProcState::Finished;
                c.finish_time = self.clock_time;
                let (node_id, pid, state) = (c.node_id, c.pid, c.state);
                let order = (self.clock_time as i64) * 10_000 + node_id * 100 + pid;
                drop(c);
                logger::log_transition(node_id, self.clock_time, pid, state);
                let mut finished = sim.finished.lock().unwrap();
                finished.add(ctx, order);
            }
            Opcode::Loop(_) | Opcode::End => {
                unreachable!("advance() never leaves the IP on a structural op")
            }
        }
    }

    /// Returns `true` iff there's still work for this node to do:
    /// something ready, something blocked, something running, or the
    /// fabric still owes this node a completion or reports a live waiter.
    fn has_work(&self, sim: &Simulator) -> bool {
        !self.ready.is_empty()
            || !self.blocked.is_empty()
            || self.running.is_some()
            || sim.fabric.has_blocked_or_ready(self.node_id)
    }

    /// Run this node's tick loop to completion, then leave the barrier.
    pub fn run(&mut self, sim: &Simulator) {
        sim.barrier.wait(); // start every node's tick 0 together

        while self.has_work(sim) {
            let preempt = self.phase_a_reintegrate(sim);
            sim.barrier.wait(); // Barrier 1

            self.phase_b_advance_running(sim, preempt);
            sim.barrier.wait(); // Barrier 2

            self.phase_c_dispatch(sim);
            sim.barrier.wait(); // Barrier 3

            self.clock_time += 1; // Phase D
        }

        debug!("node {} leaving the simulation at t={}", self.node_id, self.clock_time);
        sim.barrier.done();
    }

    /// Phase A: reinject rendezvous completions, then anything whose
    /// timed BLOCK has expired. Returns whether a higher-priority process
    /// just became ready while something else is running.
    fn phase_a_reintegrate(&mut self, sim: &Simulator) -> bool {
        let mut preempt = false;

        for done in sim.fabric.collect_ready(self.node_id, MAX_COMPLETIONS_PER_TICK) {
            self.insert_in_queue(done.clone(), true, sim);
            preempt |= self.just_became_higher_priority(&done);
        }

        loop {
            let due = match self.blocked.peek() {
                Some(head) => head.lock().unwrap().duration <= self.clock_time as i64,
                None => false,
            };
            if !due {
                break;
            }
            let proc = self.blocked.remove().expect("peeked Some above");
            self.insert_in_queue(proc.clone(), true, sim);
            preempt |= self.just_became_higher_priority(&proc);
        }

        preempt
    }

    fn just_became_higher_priority(&self, reinjected: &SharedContext) -> bool {
        let Some(cur) = &self.running else {
            return false;
        };
        let r = reinjected.lock().unwrap();
        if r.state != ProcState::Ready {
            return false;
        }
        let c = cur.lock().unwrap();
        c.actual_priority() > r.actual_priority()
    }

    /// Phase B: advance the running process by exactly one tick.
    fn phase_b_advance_running(&mut self, sim: &Simulator, preempt: bool) {
        let Some(cur) = self.running.take() else {
            return;
        };

        let op = cur.lock().unwrap().cur_op();
        match op {
            Opcode::Doop(_) => {
                let finished_doop = {
                    let mut c = cur.lock().unwrap();
                    c.duration -= 1;
                    c.doop_time += 1;
                    self.remaining_quantum -= 1;
                    c.duration == 0
                };
                if finished_doop {
                    cur.lock().unwrap().doop_count += 1;
                }
                if finished_doop || self.remaining_quantum == 0 || preempt {
                    self.insert_in_queue(cur, finished_doop, sim);
                } else {
                    self.running = Some(cur);
                }
            }
            Opcode::Send(_) => {
                self.remaining_quantum -= 1;
                let target = cur.lock().unwrap().cur_arg();
                {
                    let mut c = cur.lock().unwrap();
                    c.doop_time += 1;
                    c.state = ProcState::BlockedSend;
                }
                let self_addr = crate::context::address_of(self.node_id, cur.lock().unwrap().pid);
                sim.fabric.send(cur.clone(), self_addr, target);
                let (node_id, pid, state) = {
                    let c = cur.lock().unwrap();
                    (c.node_id, c.pid, c.state)
                };
                logger::log_transition(node_id, self.clock_time, pid, state);
                trace!("node {node_id} pid {pid} blocked on SEND to {target}");
            }
            Opcode::Recv(_) => {
                self.remaining_quantum -= 1;
                let source = cur.lock().unwrap().cur_arg();
                {
                    let mut c = cur.lock().unwrap();
                    c.doop_time += 1;
                    c.state = ProcState::BlockedRecv;
                }
                let self_addr = crate::context::address_of(self.node_id, cur.lock().unwrap().pid);
                sim.fabric.recv(cur.clone(), self_addr, source);
                let (node_id, pid, state) = {
                    let c = cur.lock().unwrap();
                    (c.node_id, c.pid, c.state)
                };
                logger::log_transition(node_id, self.clock_time, pid, state);
                trace!("node {node_id} pid {pid} blocked on RECV from {source}");
            }
            Opcode::Block(_) | Opcode::Halt | Opcode::Loop(_) | Opcode::End => {
                unreachable!("BLOCK/HALT/LOOP/END can never be the running op")
            }
        }
    }

    /// Phase C: if nothing is running and the ready queue is non-empty,
    /// dispatch the highest-priority process.
    fn phase_c_dispatch(&mut self, sim: &Simulator) {
        if self.running.is_some() || self.ready.is_empty() {
            return;
        }
        let next = self.ready.remove().expect("checked non-empty above");
        let (node_id, pid, state) = {
            let mut c = next.lock().unwrap();
            c.wait_time += self.clock_time - c.enqueue_time;
            self.remaining_quantum = sim.quantum;
            c.state = ProcState::Running;
            (c.node_id, c.pid, c.state)
        };
        logger::log_transition(node_id, self.clock_time, pid, state);
        self.running = Some(next);
    }
}
