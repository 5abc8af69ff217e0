//! Board glue for qemu virt
//!
//! The single global [`Kernel`], the trap vector and the first jump into user
//! mode. `trap.S` saves the user registers on the kernel stack and calls
//! [`trap_handler`], which copies them into the current process, runs
//! [`Kernel::handle_trap`] and hands back whichever frame should resume.
//!
//! Processes run with `satp` in Bare mode; the per-process [`MemorySet`] is
//! the kernel's view of their data pages.
//!
//! [`MemorySet`]: crate::mm::MemorySet

use crate::config::{KERNEL_STACK_SIZE, USER_END_DATA, USER_STACK_SIZE};
use crate::fs::EmptyVfs;
use crate::kernel::Kernel;
use crate::sbi::SbiFirmware;
use crate::sync::UPSafeCell;
use crate::syscall::user::{sys_getpid, sys_test_fork, sys_wait, sys_yield};
use crate::trap::TrapContext;
use alloc::boxed::Box;
use lazy_static::*;
use riscv::register::{mtvec::TrapMode, scause, sie, stval, stvec};

core::arch::global_asm!(include_str!("trap/trap.S"));

#[repr(align(4096))]
struct KernelStack {
    data: [u8; KERNEL_STACK_SIZE],
}

#[repr(align(4096))]
struct UserStack {
    data: [u8; USER_STACK_SIZE],
}

static KERNEL_STACK: KernelStack = KernelStack {
    data: [0; KERNEL_STACK_SIZE],
};

static INIT_STACK: UserStack = UserStack {
    data: [0; USER_STACK_SIZE],
};

impl KernelStack {
    fn get_sp(&self) -> usize {
        self.data.as_ptr() as usize + KERNEL_STACK_SIZE
    }

    // 返回值是内核栈压入 Trap 上下文之后的栈顶，它会被作为 __restore 的参数
    fn push_context(&self, cx: TrapContext) -> usize {
        let cx_ptr = (self.get_sp() - core::mem::size_of::<TrapContext>()) as *mut TrapContext;
        unsafe {
            *cx_ptr = cx;
        }
        cx_ptr as usize
    }
}

impl UserStack {
    fn get_sp(&self) -> usize {
        self.data.as_ptr() as usize + USER_STACK_SIZE
    }
}

lazy_static! {
    pub static ref KERNEL: UPSafeCell<Kernel> = unsafe {
        UPSafeCell::new(
            match Kernel::new(
                init_main as usize,
                INIT_STACK.get_sp(),
                USER_END_DATA,
                Box::new(EmptyVfs),
                Box::new(SbiFirmware),
            ) {
                Ok(kernel) => kernel,
                Err(err) => panic!("[kernel] cannot create init: {}", err),
            },
        )
    };
}

/// init 进程，在 U 模式下运行：回收被托付给它的僵尸进程，没有可回收的就让出 CPU
fn init_main() -> ! {
    let pid = sys_getpid();
    sys_test_fork(pid as usize);
    loop {
        let mut exit_code = 0;
        if sys_wait(-1, &mut exit_code) < 0 {
            sys_yield();
        }
    }
}

/// 设置 stvec 为 Direct 模式，指向 __alltraps
pub fn init() {
    extern "C" {
        fn __alltraps();
    }
    unsafe {
        stvec::write(__alltraps as usize, TrapMode::Direct);
    }
}

pub fn enable_timer_interrupt() {
    unsafe {
        sie::set_stimer();
    }
}

#[no_mangle]
/// 参数 cx 使用 a0 传参，返回的上下文也通过 a0 交给 __restore
pub fn trap_handler(cx: &mut TrapContext) -> &mut TrapContext {
    cx.scause = scause::read().bits();
    cx.stval = stval::read();
    let mut kernel = KERNEL.exclusive_access();
    kernel.tasks.current_task_mut().trap_cx = *cx;
    kernel.handle_trap();
    // 可能已经切换到了另一个进程
    *cx = kernel.tasks.current_task().trap_cx;
    cx
}

/// 第一次进入用户态，运行 init
pub fn run_first_task() -> ! {
    extern "C" {
        fn __restore(cx_addr: usize);
    }
    let cx = KERNEL.exclusive_access().tasks.current_task().trap_cx;
    unsafe {
        __restore(KERNEL_STACK.push_context(cx));
    }
    panic!("Unreachable in run_first_task!");
}
