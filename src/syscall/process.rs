use crate::errno::into_ret;
use crate::kernel::Kernel;
use crate::trap::TrapContext;

/// 复制当前进程；父进程得到子进程的 pid，子进程得到 0
pub fn sys_fork(kernel: &mut Kernel, _cx: &TrapContext) -> isize {
    into_ret(kernel.tasks.fork().map(|pid| pid as isize))
}

/// 打印调用者的 pid 和它传入的局部变量，用来观察 fork 之后两边的状态
pub fn sys_test_fork(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    info!(
        "process {}: local - {}",
        kernel.tasks.current_task().pid,
        cx.a0() as isize
    );
    0
}

pub fn sys_getpid(kernel: &mut Kernel, _cx: &TrapContext) -> isize {
    kernel.tasks.current_task().pid as isize
}

pub fn sys_getppid(kernel: &mut Kernel, _cx: &TrapContext) -> isize {
    kernel.tasks.parent_pid(kernel.tasks.current()) as isize
}

/// 越界的请求被忽略，总是返回调整之后的 brk
pub fn sys_brk(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    kernel.tasks.current_task_mut().set_brk(cx.a0()) as isize
}

/// 不会返回到调用者
pub fn sys_exit(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    kernel.exit_current(cx.a0() as i32);
    0
}

/// wait(pid, status_ptr)：pid 为 -1 时等待任意子进程
///
/// 还没有子进程退出时调用者进入 Blocked 状态，sepc 退回到 ecall 指令，
/// 被唤醒后重新执行这次系统调用。
pub fn sys_wait(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let pid = cx.a(0) as isize;
    let status_ptr = cx.a(1);
    match kernel.tasks.waitpid(pid) {
        Ok(Some((child, exit_code))) => {
            if status_ptr != 0 {
                let task = kernel.tasks.current_task_mut();
                if let Err(err) = task.copy_to_user(status_ptr, &exit_code.to_ne_bytes()) {
                    return err.as_ret();
                }
            }
            child as isize
        }
        Ok(None) => {
            kernel.tasks.current_task_mut().trap_cx.sepc -= 4;
            kernel.tasks.block_current_and_run_next();
            // 写回原来的 a0，重新执行时参数不变
            cx.a0() as isize
        }
        Err(err) => err.as_ret(),
    }
}

/// current task give up cpu
pub fn sys_yield(kernel: &mut Kernel, _cx: &TrapContext) -> isize {
    kernel.tasks.suspend_current_and_run_next();
    0
}
