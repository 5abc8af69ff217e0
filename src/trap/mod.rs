//! Trap handling functionality
//!
//! Every trap from user mode ends up in [`Kernel::handle_trap`] with the
//! interrupted registers already saved in the current process's
//! [`TrapContext`]. The handler classifies the cause and routes it: system
//! calls to the syscall table, timer interrupts to the scheduler, page faults
//! to the memory set. Before returning, pending signals of whichever process is
//! about to resume are delivered.
//!
//! The board glue (CSR access, `trap.S`) lives in `crate::board`.

mod context;

use crate::kernel::Kernel;
use crate::syscall::syscall;
use crate::task::TaskStatus;
use crate::timer::{get_time_us, set_next_trigger};

pub use context::TrapContext;

/// scause 最高位为 1 表示中断
const INTERRUPT_BIT: usize = 1 << (usize::BITS - 1);

/// 陷入原因，由 scause 的值解码得到
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapCause {
    /// ecall from U-mode
    UserEnvCall,
    SupervisorTimer,
    LoadPageFault,
    StorePageFault,
    IllegalInstruction,
    /// 其他已知的异常，异常号见 RISC-V 特权级手册
    Exception(usize),
    /// 没有定义或内核不处理的原因
    Unknown(usize),
}

impl TrapCause {
    pub const USER_ENV_CALL: usize = 8;
    pub const SUPERVISOR_TIMER: usize = INTERRUPT_BIT | 5;

    pub fn from_scause(bits: usize) -> Self {
        if bits & INTERRUPT_BIT != 0 {
            return match bits & !INTERRUPT_BIT {
                5 => TrapCause::SupervisorTimer,
                _ => TrapCause::Unknown(bits),
            };
        }
        match bits {
            2 => TrapCause::IllegalInstruction,
            8 => TrapCause::UserEnvCall,
            13 => TrapCause::LoadPageFault,
            15 => TrapCause::StorePageFault,
            0 | 1 | 3 | 4 | 5 | 6 | 7 | 12 => TrapCause::Exception(bits),
            _ => TrapCause::Unknown(bits),
        }
    }
}

impl Kernel {
    /// 处理当前进程的一次陷入，结束后 current 指向即将返回用户态的进程
    pub fn handle_trap(&mut self) {
        let cx = self.tasks.current_task().trap_cx;
        match TrapCause::from_scause(cx.scause) {
            TrapCause::UserEnvCall => self.handle_syscall(),
            TrapCause::SupervisorTimer => {
                trace!("[kernel] timer interrupt at {}us", get_time_us(&*self.firmware));
                // 重新设置一个 10ms 的计时器，然后切换到下一个进程
                set_next_trigger(&*self.firmware);
                self.tasks.suspend_current_and_run_next();
            }
            cause @ (TrapCause::LoadPageFault | TrapCause::StorePageFault) => {
                let write = cause == TrapCause::StorePageFault;
                if let Err(err) = self.tasks.current_task_mut().handle_page_fault(cx.stval, write) {
                    error!(
                        "[kernel] {:?} in application, bad addr = {:#x}, bad instruction = {:#x}: {}, core dumped.",
                        cause, cx.stval, cx.sepc, err
                    );
                    self.exit_current(-2);
                }
            }
            TrapCause::IllegalInstruction => {
                error!(
                    "[kernel] IllegalInstruction in application, bad addr = {:#x}, core dumped.",
                    cx.stval
                );
                self.exit_current(-3);
            }
            TrapCause::Exception(code) => {
                error!(
                    "[kernel] Exception {} in application, bad addr = {:#x}, bad instruction = {:#x}, core dumped.",
                    code, cx.stval, cx.sepc
                );
                self.exit_current(-2);
            }
            TrapCause::Unknown(bits) => {
                panic!(
                    "[kernel] Unhandled trap: scause = {:#x}, stval: {:#x}, core dumped.",
                    bits, cx.stval
                );
            }
        }
        self.tasks.handle_signals(&*self.vfs);
    }

    /// 系统调用：a7 是调用号，返回值写回发起调用的进程的 a0
    fn handle_syscall(&mut self) {
        let caller = self.tasks.current();
        // 跳过 ecall 指令，返回后从下一条指令继续执行
        let cx = {
            let task = self.tasks.current_task_mut();
            task.trap_cx.sepc += 4;
            task.trap_cx
        };
        let ret = syscall(self, cx.syscall_id(), &cx);
        // 调用者可能已经退出 (exit) 或被回收
        if let Some(task) = self.tasks.get_mut(caller) {
            if task.task_status != TaskStatus::Zombie {
                task.trap_cx.set_ret(ret);
            }
        }
    }
}
