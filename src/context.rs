//! The per-process state vector and opcode-stream interpreter.

use std::fmt;

use crate::opcode::Opcode;

/// Lifecycle state of a process, matching the distilled spec's six tags
/// plus `New` for the pre-admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    New,
    Ready,
    Running,
    Blocked,
    BlockedSend,
    BlockedRecv,
    Finished,
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcState::New => "new",
            ProcState::Ready => "ready",
            ProcState::Running => "running",
            ProcState::Blocked => "blocked",
            ProcState::BlockedSend => "blocked (send)",
            ProcState::BlockedRecv => "blocked (recv)",
            ProcState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// The address namespace is `node_id * 100 + pid`, with both components
/// in `[1, 100]`.
pub const ADDR_NODE_SCALE: i64 = 100;
pub const MAX_NODE_ID: i64 = 100;
pub const MAX_PID: i64 = 100;

pub fn address_of(node_id: i64, pid: i64) -> i64 {
    node_id * ADDR_NODE_SCALE + pid
}

pub fn is_valid_address(addr: i64) -> bool {
    let node_id = addr / ADDR_NODE_SCALE;
    let pid = addr % ADDR_NODE_SCALE;
    (1..=MAX_NODE_ID).contains(&node_id) && (1..=MAX_PID).contains(&pid)
}

/// One process: its program, its cursor through that program, and every
/// scheduling/statistics field the spec tracks.
#[derive(Debug, Clone)]
pub struct Context {
    pub code: Vec<Opcode>,
    /// Loop-nesting stack: remaining-iteration counts for each open `LOOP`.
    stack: Vec<(usize, i64)>,
    pub name: String,
    pub ip: usize,
    pub node_id: i64,
    /// Assigned on admission; `0` beforehand.
    pub pid: i64,
    /// Declared priority; negative is the SJF sentinel.
    pub priority: i64,
    /// Overloaded: remaining DOOP ticks, `1` for a ready SEND/RECV, or an
    /// absolute wake-up tick while `Blocked`.
    pub duration: i64,
    pub state: ProcState,
    pub enqueue_time: u64,

    pub doop_count: u64,
    pub doop_time: u64,
    pub block_count: u64,
    pub block_time: u64,
    pub wait_count: u64,
    pub wait_time: u64,
    pub send_count: u64,
    pub recv_count: u64,

    pub finish_time: u64,
}

/// Result of advancing the instruction pointer to the next primitive
/// that consumes simulated effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// IP now rests on a `DOOP`/`BLOCK`/`SEND`/`RECV`.
    Effort,
    /// IP now rests on `HALT`.
    Halt,
}

impl Context {
    pub fn new(name: String, priority: i64, node_id: i64, code: Vec<Opcode>) -> Self {
        Context {
            code,
            stack: Vec::new(),
            name,
            ip: 0,
            node_id,
            pid: 0,
            priority,
            duration: 0,
            state: ProcState::New,
            enqueue_time: 0,
            doop_count: 0,
            doop_time: 0,
            block_count: 0,
            block_time: 0,
            wait_count: 0,
            wait_time: 0,
            send_count: 0,
            recv_count: 0,
            finish_time: 0,
        }
    }

    /// `true` iff the declared priority selects SJF scheduling.
    pub fn is_sjf(&self) -> bool {
        self.priority < 0
    }

    /// The priority actually used for ready-queue ordering: the declared
    /// priority, or (SJF mode) the remaining effort of the current op.
    pub fn actual_priority(&self) -> i64 {
        if self.is_sjf() {
            self.duration
        } else {
            self.priority
        }
    }

    pub fn cur_op(&self) -> Opcode {
        self.code[self.ip]
    }

    /// The integer argument of the current opcode. Panics on `Halt`/`End`,
    /// which carry none and are never queried for one — a programming
    /// invariant violation if it happens.
    pub fn cur_arg(&self) -> i64 {
        match self.cur_op() {
            Opcode::Doop(n) | Opcode::Block(n) | Opcode::Send(n) | Opcode::Recv(n) => n,
            Opcode::Loop(n) => n,
            Opcode::Halt | Opcode::End => {
                unreachable!("cur_arg queried on an opcode with no argument")
            }
        }
    }

    /// Advance the instruction pointer past any structural `LOOP`/`END`
    /// bookkeeping until it rests on an effort op or `HALT`.
    ///
    /// `LOOP(k)` pushes `k` on the loop stack; `END` decrements the top
    /// entry and either jumps back to the matching `LOOP` (if non-zero)
    /// or pops and falls through (if exhausted).
    pub fn advance(&mut self) -> Advance {
        loop {
            match self.code[self.ip] {
                Opcode::Loop(k) => {
                    self.stack.push((self.ip, k));
                    self.ip += 1;
                }
                Opcode::End => {
                    let (loop_ip, remaining) = self
                        .stack
                        .last_mut()
                        .expect("END with no matching LOOP (loader should have rejected this)");
                    *remaining -= 1;
                    if *remaining > 0 {
                        self.ip = *loop_ip + 1;
                    } else {
                        self.stack.pop();
                        self.ip += 1;
                    }
                }
                Opcode::Halt => return Advance::Halt,
                Opcode::Doop(_) | Opcode::Block(_) | Opcode::Send(_) | Opcode::Recv(_) => {
                    return Advance::Effort
                }
            }
        }
    }

    /// One line of the final per-process statistics table.
    pub fn stats_line(&self) -> String {
        format!(
            "process {name} (node {node}, pid {pid}): finish={finish} doop_count={dc} doop_time={dt} \
             block_count={bc} block_time={bt} wait_count={wc} wait_time={wt} send_count={sc} recv_count={rc}",
            name = self.name,
            node = self.node_id,
            pid = self.pid,
            finish = self.finish_time,
            dc = self.doop_count,
            dt = self.doop_time,
            bc = self.block_count,
            bt = self.block_time,
            wc = self.wait_count,
            wt = self.wait_time,
            sc = self.send_count,
            rc = self.recv_count,
        )
    }
}
