//! The program loader: parses workload text into [`Context`]s.
//!
//! Grammar (whitespace/newline-delimited, as the original's
//! `scanf`/`fscanf`-based reader treats it): a header line of three
//! integers, then one process description per process — a `name
//! priority node` header followed by opcode lines, ending at `HALT`.
//! See §11 of `SPEC_FULL.md` for the exact contract.

use crate::context::Context;
use crate::error::ProsimError;
use crate::opcode::Opcode;

pub struct Workload {
    pub quantum: i64,
    pub num_threads: i64,
    pub processes: Vec<Context>,
}

struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        Tokens {
            iter: input.split_whitespace(),
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.iter.next()
    }

    fn next_int(&mut self) -> Option<i64> {
        self.next().and_then(|t| t.parse::<i64>().ok())
    }
}

/// Parse a complete workload from `input`.
pub fn load(input: &str) -> Result<Workload, ProsimError> {
    let mut toks = Tokens::new(input);

    let num_procs = toks.next_int();
    let quantum = toks.next_int();
    let num_threads = toks.next_int();
    let (num_procs, quantum, num_threads) = match (num_procs, quantum, num_threads) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => return Err(ProsimError::BadHeader(input.lines().next().unwrap_or("").to_string())),
    };
    if num_procs < 0 || quantum <= 0 || num_threads <= 0 {
        return Err(ProsimError::BadHeader(format!(
            "{num_procs} {quantum} {num_threads}"
        )));
    }

    let mut processes = Vec::with_capacity(num_procs as usize);
    for index in 0..num_procs as usize {
        processes.push(load_one_process(&mut toks, index)?);
    }

    Ok(Workload {
        quantum,
        num_threads,
        processes,
    })
}

fn load_one_process(toks: &mut Tokens<'_>, index: usize) -> Result<Context, ProsimError> {
    let name = toks
        .next()
        .ok_or(ProsimError::BadProcessDescription { index })?
        .to_string();
    if name.len() > 10 {
        return Err(ProsimError::NameTooLong(name));
    }
    let priority = toks
        .next_int()
        .ok_or(ProsimError::BadProcessDescription { index })?;
    let node_id = toks
        .next_int()
        .ok_or(ProsimError::BadProcessDescription { index })?;
    if !(1..=crate::context::MAX_NODE_ID).contains(&node_id) {
        return Err(ProsimError::NodeOutOfRange(node_id));
    }

    let mut code = Vec::new();
    loop {
        let op = toks.next().ok_or(ProsimError::UnexpectedEof { index })?;
        let needs_arg = matches!(op, "DOOP" | "LOOP" | "BLOCK" | "SEND" | "RECV");
        let arg = if needs_arg {
            Some(toks.next().ok_or(ProsimError::UnexpectedEof { index })?)
        } else {
            None
        };
        let opcode = Opcode::parse(op, arg)?;
        if let Opcode::Send(addr) | Opcode::Recv(addr) = opcode {
            if !crate::context::is_valid_address(addr) {
                return Err(ProsimError::AddressOutOfRange(addr));
            }
        }
        let is_halt = matches!(opcode, Opcode::Halt);
        code.push(opcode);
        if is_halt {
            break;
        }
    }

    Ok(Context::new(name, priority, node_id, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_header_and_single_process() {
        let w = load("1 5 1\nA 0 1\nDOOP 3\nHALT\n").unwrap();
        assert_eq!(w.quantum, 5);
        assert_eq!(w.num_threads, 1);
        assert_eq!(w.processes.len(), 1);
        assert_eq!(w.processes[0].name, "A");
        assert_eq!(
            w.processes[0].code,
            vec![Opcode::Doop(3), Opcode::Halt]
        );
    }

    #[test]
    fn loads_loop_bracketed_program() {
        let w = load("1 2 1\nB 0 1\nLOOP 2\nDOOP 1\nEND\nHALT\n").unwrap();
        assert_eq!(
            w.processes[0].code,
            vec![Opcode::Loop(2), Opcode::Doop(1), Opcode::End, Opcode::Halt]
        );
    }

    #[test]
    fn rejects_bad_header() {
        assert!(load("not a header").is_err());
    }

    #[test]
    fn rejects_name_too_long() {
        assert!(load("1 5 1\nWAYTOOLONGNAME 0 1\nHALT\n").is_err());
    }

    #[test]
    fn rejects_missing_halt() {
        assert!(load("1 5 1\nA 0 1\nDOOP 3\n").is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(load("1 5 1\nA 0 1\nNOPE\nHALT\n").is_err());
    }

    #[test]
    fn rejects_node_id_out_of_range() {
        assert!(matches!(
            load("1 5 1\nA 0 101\nHALT\n"),
            Err(ProsimError::NodeOutOfRange(101))
        ));
        assert!(matches!(
            load("1 5 1\nA 0 0\nHALT\n"),
            Err(ProsimError::NodeOutOfRange(0))
        ));
    }

    #[test]
    fn rejects_send_recv_address_out_of_range() {
        assert!(matches!(
            load("1 5 1\nA 0 1\nSEND 99999\nHALT\n"),
            Err(ProsimError::AddressOutOfRange(99999))
        ));
        assert!(matches!(
            load("1 5 1\nA 0 1\nRECV 0\nHALT\n"),
            Err(ProsimError::AddressOutOfRange(0))
        ));
    }
}
