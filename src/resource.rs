//! Instruction-budget tracking.
//!
//! A single limit this language exposes to hosts: a per-run instruction
//! quota. The trait is generic so a quota-free VM configuration
//! (`NoLimitTracker`) costs nothing at the call site — no branch, no
//! counter increment compiles away.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub limit: u64,
    pub count: u64,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instruction quota exceeded: {} > {}", self.count, self.limit)
    }
}

impl std::error::Error for QuotaExceeded {}

/// Counts executed instructions and enforces an optional quota.
///
/// Implementors are invoked once per dispatched opcode from the VM's main
/// loop.
pub trait ResourceTracker: fmt::Debug {
    fn on_instruction(&mut self) -> Result<(), QuotaExceeded>;

    fn instruction_count(&self) -> u64 {
        0
    }
}

/// The default tracker: counts instructions but never rejects them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker {
    count: u64,
}

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_instruction(&mut self) -> Result<(), QuotaExceeded> {
        self.count += 1;
        Ok(())
    }

    fn instruction_count(&self) -> u64 {
        self.count
    }
}

/// Enforces `setMaxInstructions(n)`.
#[derive(Debug, Clone, Copy)]
pub struct QuotaTracker {
    limit: u64,
    count: u64,
}

impl QuotaTracker {
    pub fn new(limit: u64) -> Self {
        Self { limit, count: 0 }
    }

    /// Changes the quota without resetting the instructions already
    /// counted. Callable mid-session.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }
}

impl ResourceTracker for QuotaTracker {
    #[inline]
    fn on_instruction(&mut self) -> Result<(), QuotaExceeded> {
        self.count += 1;
        if self.count > self.limit {
            return Err(QuotaExceeded {
                limit: self.limit,
                count: self.count,
            });
        }
        Ok(())
    }

    fn instruction_count(&self) -> u64 {
        self.count
    }
}
