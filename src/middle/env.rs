//! The lowering environment: the register file, name↔register bindings, the
//! functions directory, and the logical stack-size counter, threaded through
//! every lowering operation explicitly rather than as process-wide globals
//! (per the Design Notes in `SPEC_FULL.md`).
//!
//! Constant tracking (`known`) is kept separate from register occupancy
//! (`in_use`) rather than folded into one array, since conflating "last
//! known value" with "register occupied" was identified as the likely
//! source of the original implementation's function-boundary bugs.

use crate::common::{Id, Line, Map, Register};
use crate::error::{Error, Result};

/// Total addressable registers.
pub const NUM_REGISTERS: usize = 32;
/// Return-value register.
pub const X0: Register = 0;
/// Argument registers are `1..MAX_ARGS` (exclusive); at most `MAX_ARGS - 1`
/// arguments are passed in registers.
pub const MAX_ARGS: usize = 8;
/// Return-address register (akin to AArch64's link register, x30).
pub const RP: Register = 30;
/// Stack-pointer register.
pub const SP: Register = 31;

/// The lowering environment for a single scope (top-level, or one function
/// body). Bindings are not inherited across scopes; the functions directory
/// is.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    bindings: Map<Id, Register>,
    in_use: [bool; NUM_REGISTERS],
    known: Map<Register, Option<i64>>,
    functions: Vec<(Id, Line)>,
    stack_size: i64,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// A fresh environment for a callee body, carrying the enclosing scope's
    /// functions directory forward (so mutually recursive definitions
    /// resolve) but none of its bindings or register occupancy — see the
    /// `FunctionDef` note in `SPEC_FULL.md`.
    pub fn child(&self) -> Environment {
        Environment {
            functions: self.functions.clone(),
            ..Environment::default()
        }
    }

    fn reserved(reg: Register) -> bool {
        reg == X0 || reg == SP || reg == RP
    }

    /// Record a name→register binding. Fails if the register already holds
    /// a live binding under a different name.
    pub fn bind(&mut self, name: Id, reg: Register) -> Result<()> {
        if self.in_use[reg as usize] && self.bindings.get(&name) != Some(&reg) {
            return Err(Error::NoFreeRegister);
        }
        self.bindings.insert(name, reg);
        self.in_use[reg as usize] = true;
        Ok(())
    }

    pub fn lookup(&self, name: Id) -> Result<Register> {
        self.bindings.get(&name).copied().ok_or(Error::UnknownName(name))
    }

    /// Like `lookup`, but binds `name` to a fresh register first if it has
    /// no binding yet (used by plain assignment, which both declares and
    /// updates variables).
    pub fn lookup_or_bind(&mut self, name: Id) -> Result<Register> {
        if let Some(reg) = self.bindings.get(&name) {
            return Ok(*reg);
        }
        let reg = self.fresh_register()?;
        self.bind(name, reg)?;
        Ok(reg)
    }

    /// The lowest-indexed register that is not reserved and not currently
    /// holding a live binding or scratch value.
    pub fn fresh_register(&self) -> Result<Register> {
        (0..NUM_REGISTERS as Register)
            .find(|&r| !Self::reserved(r) && !self.in_use[r as usize])
            .ok_or(Error::NoFreeRegister)
    }

    /// Mark `reg` as in use without binding it to a name (a scratch/call
    /// register). Pairs with [`Environment::free_if_temporary`].
    pub fn reserve(&mut self, reg: Register) {
        self.in_use[reg as usize] = true;
    }

    /// Release `reg` iff it is not bound to a named variable. A no-op on
    /// variable-holding registers.
    pub fn free_if_temporary(&mut self, reg: Register) {
        let bound_to_name = self.bindings.values().any(|&r| r == reg);
        if !bound_to_name {
            self.in_use[reg as usize] = false;
            self.known.remove(&reg);
        }
    }

    pub fn remember(&mut self, reg: Register, value: i64) {
        self.known.insert(reg, Some(value));
    }

    pub fn remember_unknown(&mut self, reg: Register) {
        self.known.insert(reg, None);
    }

    /// The statically known value last written to `reg`, if any.
    pub fn known_value(&self, reg: Register) -> Option<i64> {
        self.known.get(&reg).copied().flatten()
    }

    /// At most one entry per function name. Recording the same name at the
    /// same line twice is a no-op; recording it again at a *different* line
    /// is rejected, since the functions directory is meant to be append-only
    /// per definition and a silently-overwritten entry would make calls
    /// ambiguous about which body they reach.
    pub fn record_function(&mut self, name: Id, line: Line) -> Result<()> {
        if let Some(existing) = self.functions.iter().find(|(n, _)| *n == name) {
            if existing.1 != line {
                return Err(Error::DuplicateFunction(name));
            }
            return Ok(());
        }
        log::debug!("recording function '{name}' at line {line}");
        self.functions.push((name, line));
        Ok(())
    }

    pub fn find_function(&self, name: Id) -> Result<Line> {
        self.functions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, line)| *line)
            .ok_or(Error::UnknownFunction(name))
    }

    pub fn stack_size(&self) -> i64 {
        self.stack_size
    }

    /// Grow the logical stack by one word; returns the new size (used as
    /// the immediate in the call protocol's `MOVZ SP, ...`, see
    /// [`crate::middle::eval`]).
    pub fn grow_stack(&mut self) -> i64 {
        self.stack_size += 1;
        self.stack_size
    }

    pub fn shrink_stack(&mut self) {
        self.stack_size -= 1;
    }
}
