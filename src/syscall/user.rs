//! User-side system call wrapper.
//!
//! Every call goes through [`invoke`]: the number must lie in `(0, NR_TASKS)`,
//! arguments go to a0~a5 and the number to a7. A negative result is turned
//! into `-1` with the error code stored for [`errno`]. On riscv64 the trap is
//! a real `ecall`; the argument marshalling is target independent.

#[cfg(target_arch = "riscv64")]
use super::SyscallId;
use crate::config::NR_TASKS;
use core::sync::atomic::{AtomicIsize, Ordering};

/// 最近一次失败的系统调用的错误码
static ERRNO: AtomicIsize = AtomicIsize::new(0);

pub fn errno() -> isize {
    ERRNO.load(Ordering::Relaxed)
}

/// 系统调用的 6 个参数 a0~a5，未使用的为 0
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyscallArgs(pub [usize; 6]);

impl SyscallArgs {
    pub fn new(args: &[usize]) -> Self {
        assert!(args.len() <= 6, "too many syscall arguments: {}", args.len());
        let mut regs = [0; 6];
        regs[..args.len()].copy_from_slice(args);
        Self(regs)
    }
}

/// 通用的系统调用入口：检查调用号，通过 trap 陷入内核，再按负数错误码约定处理返回值
pub fn invoke<F>(number: isize, args: SyscallArgs, trap: F) -> isize
where
    F: FnOnce(usize, SyscallArgs) -> isize,
{
    if !(number > 0 && (number as usize) < NR_TASKS) {
        panic!("Try to call unknown system call {}", number);
    }
    let ret = trap(number as usize, args);
    if ret < 0 {
        ERRNO.store(-ret, Ordering::Relaxed);
        return -1;
    }
    ret
}

#[cfg(target_arch = "riscv64")]
fn ecall(id: usize, args: SyscallArgs) -> isize {
    let mut ret: isize;
    unsafe {
        core::arch::asm!(
            "ecall",
            inlateout("x10") args.0[0] => ret, // `a0` 保存系统调用的返回值
            in("x11") args.0[1],
            in("x12") args.0[2],
            in("x13") args.0[3],
            in("x14") args.0[4],
            in("x15") args.0[5],
            in("x17") id, // `a7` 用来传递 syscall ID
        );
    }
    ret
}

#[cfg(target_arch = "riscv64")]
pub fn syscall(number: isize, args: &[usize]) -> isize {
    invoke(number, SyscallArgs::new(args), ecall)
}

#[cfg(target_arch = "riscv64")]
pub fn sys_test_fork(local: usize) -> isize {
    syscall(SyscallId::TestFork as isize, &[local])
}

#[cfg(target_arch = "riscv64")]
pub fn sys_getpid() -> isize {
    syscall(SyscallId::GetPid as isize, &[])
}

#[cfg(target_arch = "riscv64")]
pub fn sys_wait(pid: isize, status: &mut i32) -> isize {
    syscall(SyscallId::Wait as isize, &[pid as usize, status as *mut i32 as usize])
}

#[cfg(target_arch = "riscv64")]
pub fn sys_yield() -> isize {
    syscall(SyscallId::Yield as isize, &[])
}
