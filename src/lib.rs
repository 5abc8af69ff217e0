//! A single-hart RISC-V teaching kernel
//!
//! Processes enter the kernel only through traps. [`Kernel::handle_trap`]
//! classifies each trap and routes it to the syscall table, the scheduler or
//! the page-fault path, then delivers pending signals before the selected
//! process resumes. The process table, `fork` with copy-on-write address
//! spaces, round-robin scheduling, signals and the per-process descriptor
//! table are all portable and tested on the host; the riscv64 board glue lives
//! in [`board`] and the `os6` binary.
//!
//! [`Kernel::handle_trap`]: kernel::Kernel::handle_trap

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

extern crate alloc;

#[cfg(target_arch = "riscv64")]
pub mod board;
pub mod config;
pub mod errno;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod sbi;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod timer;
pub mod trap;

#[cfg(test)]
mod testutil;
