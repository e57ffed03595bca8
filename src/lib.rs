/*! A discrete-event simulator for a small multi-node operating-system kernel.

`prosim` models a fleet of independent processing nodes, each running its
own local scheduler with preemption and a configurable time quantum,
while processes on any node exchange data through rendezvous
(synchronous) message passing with processes on any other node. Nodes
advance through shared logical time in lockstep using a phased barrier,
so cross-node interactions are deterministic regardless of how the OS
schedules the underlying threads.

```
use prosim::loader;
use prosim::simulator;

let workload = loader::load("1 5 1\nA 0 1\nDOOP 3\nHALT\n").unwrap();
let finished = simulator::run(workload);
assert_eq!(finished.len(), 1);
assert_eq!(finished[0].lock().unwrap().finish_time, 3);
```

The three subsystems that make this more than a toy are:

- [`scheduler`] — the per-node state machine driving each process through
  READY/RUNNING/BLOCKED/BLOCKED-SEND/BLOCKED-RECV/FINISHED.
- [`barrier`] — the phased barrier that synchronizes all node workers
  four times per tick and supports a node permanently departing mid-run.
- [`rendezvous`] — the fabric that pairs SEND/RECV across nodes without
  deadlock and hands completions back to the owning node's scheduler.
*/

pub mod barrier;
pub mod context;
pub mod error;
pub mod loader;
pub mod logger;
pub mod opcode;
pub mod priority_queue;
pub mod rendezvous;
pub mod scheduler;
pub mod simulator;
