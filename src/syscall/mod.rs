//! Implementation of syscalls
//!
//! The single entry point to all system calls, [`syscall()`], is called
//! whenever userspace wishes to perform a system call using the `ecall`
//! instruction. The syscall number arrives in a7 and up to six arguments in
//! a0~a5; every handler reads them from the caller's [`TrapContext`].
//!
//! A handler returns a non-negative result on success and `-errno` on failure.
//! [`user`] holds the other half of the convention: the wrapper that turns a
//! negative result into `-1` plus a stored error code.

mod device;
mod fs;
mod process;
mod signal;
pub mod user;

use crate::config::NR_TASKS;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::trap::TrapContext;
use device::*;
use fs::*;
use num_enum::TryFromPrimitive;
use process::*;
use signal::*;

/// 对于系统调用而言， syscall 函数并不会实际处理系统调用，而只是根据 syscall ID 分发到具体的处理函数
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum SyscallId {
    Fork = 1,
    TestFork = 2,
    GetPid = 3,
    GetPPid = 4,
    Char = 5,
    Open = 7,
    Close = 8,
    Stat = 9,
    Read = 10,
    Reset = 11,
    Brk = 12,
    SigAction = 13,
    Kill = 14,
    Exit = 15,
    SigReturn = 16,
    Wait = 17,
    Yield = 18,
}

/// 每个处理函数都从调用者的 Trap 上下文中取参数
type SyscallHandler = fn(&mut Kernel, &TrapContext) -> isize;

impl SyscallId {
    fn handler(self) -> SyscallHandler {
        match self {
            SyscallId::Fork => sys_fork,
            SyscallId::TestFork => sys_test_fork,
            SyscallId::GetPid => sys_getpid,
            SyscallId::GetPPid => sys_getppid,
            SyscallId::Char => sys_char,
            SyscallId::Open => sys_open,
            SyscallId::Close => sys_close,
            SyscallId::Stat => sys_stat,
            SyscallId::Read => sys_read,
            SyscallId::Reset => sys_reset,
            SyscallId::Brk => sys_brk,
            SyscallId::SigAction => sys_sigaction,
            SyscallId::Kill => sys_kill,
            SyscallId::Exit => sys_exit,
            SyscallId::SigReturn => sys_sigreturn,
            SyscallId::Wait => sys_wait,
            SyscallId::Yield => sys_yield,
        }
    }
}

/// 调用号必须落在 (0, NR_TASKS) 内，否则说明分发出了问题，内核直接 panic；
/// 区间内没有处理函数的调用号返回 -ENOSYS
pub fn syscall(kernel: &mut Kernel, syscall_id: usize, cx: &TrapContext) -> isize {
    if !(syscall_id > 0 && syscall_id < NR_TASKS) {
        panic!("Try to call unknown system call {}", syscall_id);
    }
    match SyscallId::try_from(syscall_id) {
        Ok(id) => {
            trace!("[kernel] syscall {:?} from pid {}", id, kernel.tasks.current_task().pid);
            (id.handler())(kernel, cx)
        }
        Err(_) => {
            warn!("[kernel] unassigned syscall {}", syscall_id);
            Errno::ENOSYS.as_ret()
        }
    }
}
