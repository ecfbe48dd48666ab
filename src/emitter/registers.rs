//! The register file: emission-time bookkeeping for machine registers
//!
//! A fixed set of general-purpose registers, each independently free or
//! allocated. Allocation takes the first free register; when none is free
//! the file spills round-robin and the matching release restores it, so
//! spills and restores pair LIFO as long as allocate/release calls nest.
//!
//! [`RegisterFile::allocate`] and [`RegisterFile::release`] return the
//! spill and restore effects explicitly — the caller decides where the
//! `push`/`pop` instructions land, so the side effect is visible at the
//! call site instead of hidden inside the allocator.

use std::fmt;

/// Number of allocatable general-purpose registers.
pub const REGISTER_COUNT: usize = 4;

const NAMES_32: [&str; REGISTER_COUNT] = ["%eax", "%edx", "%ecx", "%ebx"];
const NAMES_8: [&str; REGISTER_COUNT] = ["%al", "%dl", "%cl", "%bl"];

/// One of the allocatable registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg(usize);

impl Reg {
    pub const EAX: Reg = Reg(0);
    pub const EDX: Reg = Reg(1);
    pub const ECX: Reg = Reg(2);
    pub const EBX: Reg = Reg(3);

    /// The 32-bit register name.
    pub fn name(self) -> &'static str {
        NAMES_32[self.0]
    }

    /// The low-byte name, used by `setcc` and byte-sized stores.
    pub fn byte_name(self) -> &'static str {
        NAMES_8[self.0]
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an allocation asks the caller to emit.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    pub register: Reg,
    /// When set, the register's old value must be pushed before use.
    pub spilled: Option<Reg>,
}

/// What a release asks the caller to emit.
#[derive(Debug, PartialEq, Eq)]
pub struct Release {
    /// When set, the most recent spill must be popped back into this
    /// register.
    pub restored: Option<Reg>,
}

/// Free/allocated state of the register set, plus the outstanding spill
/// count.
#[derive(Debug)]
pub struct RegisterFile {
    free: [bool; REGISTER_COUNT],
    spills: usize,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            free: [true; REGISTER_COUNT],
            spills: 0,
        }
    }

    /// First free register wins; with none free, the round-robin victim is
    /// spilled and handed out again.
    pub fn allocate(&mut self) -> Allocation {
        for index in 0..REGISTER_COUNT {
            if self.free[index] {
                self.free[index] = false;
                return Allocation {
                    register: Reg(index),
                    spilled: None,
                };
            }
        }

        let victim = Reg(self.spills % REGISTER_COUNT);
        self.spills += 1;
        Allocation {
            register: victim,
            spilled: Some(victim),
        }
    }

    /// Release an allocated register. While spills are outstanding the
    /// most recent one is restored instead (LIFO), regardless of which
    /// register is being released.
    ///
    /// Releasing a free register is an emitter bug, not a user-facing
    /// condition, and panics.
    pub fn release(&mut self, register: Reg) -> Release {
        if self.free[register.0] {
            panic!("released register {} that was already free", register);
        }

        if self.spills > 0 {
            self.spills -= 1;
            Release {
                restored: Some(Reg(self.spills % REGISTER_COUNT)),
            }
        } else {
            self.free[register.0] = true;
            Release { restored: None }
        }
    }

    pub fn is_allocated(&self, register: Reg) -> bool {
        !self.free[register.0]
    }

    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|&&f| f).count()
    }

    pub fn allocated_count(&self) -> usize {
        REGISTER_COUNT - self.free_count()
    }

    pub fn spill_count(&self) -> usize {
        self.spills
    }

    /// Registers currently allocated, in register order.
    pub fn allocated(&self) -> Vec<Reg> {
        (0..REGISTER_COUNT)
            .filter(|&i| !self.free[i])
            .map(Reg)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_free_register_wins() {
        let mut file = RegisterFile::new();
        assert_eq!(file.allocate().register, Reg::EAX);
        assert_eq!(file.allocate().register, Reg::EDX);

        file.release(Reg::EAX);
        // EAX is free again and is the first choice.
        assert_eq!(file.allocate().register, Reg::EAX);
    }

    #[test]
    fn test_allocated_count_invariant() {
        let mut file = RegisterFile::new();
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(file.allocate().register);
            assert_eq!(file.allocated_count(), REGISTER_COUNT - file.free_count());
        }
        for reg in held {
            file.release(reg);
            assert_eq!(file.allocated_count(), REGISTER_COUNT - file.free_count());
        }
        assert_eq!(file.free_count(), REGISTER_COUNT);
    }

    #[test]
    fn test_spill_and_restore_pair_lifo() {
        let mut file = RegisterFile::new();
        let regs: Vec<Reg> = (0..REGISTER_COUNT).map(|_| file.allocate().register).collect();

        // Exhausted: the next two allocations spill round-robin.
        let fifth = file.allocate();
        assert_eq!(fifth.spilled, Some(Reg::EAX));
        let sixth = file.allocate();
        assert_eq!(sixth.spilled, Some(Reg::EDX));
        assert_eq!(file.spill_count(), 2);

        // Releases restore in reverse spill order.
        assert_eq!(file.release(sixth.register).restored, Some(Reg::EDX));
        assert_eq!(file.release(fifth.register).restored, Some(Reg::EAX));
        assert_eq!(file.spill_count(), 0);

        // Back to plain frees.
        for reg in regs {
            assert_eq!(file.release(reg).restored, None);
        }
        assert_eq!(file.free_count(), REGISTER_COUNT);
    }

    #[test]
    #[should_panic(expected = "already free")]
    fn test_double_release_panics() {
        let mut file = RegisterFile::new();
        let reg = file.allocate().register;
        file.release(reg);
        file.release(reg);
    }

    #[test]
    fn test_byte_names() {
        assert_eq!(Reg::EAX.byte_name(), "%al");
        assert_eq!(Reg::EBX.byte_name(), "%bl");
    }
}
