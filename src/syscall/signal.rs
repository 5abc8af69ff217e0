use crate::errno::{into_ret, Errno};
use crate::kernel::Kernel;
use crate::task::signal::{
    is_catchable, SigActionRaw, SignalAction, SignalFlags, SIGACTION_RAW_SIZE,
};
use crate::trap::TrapContext;

/// sigaction(signum, new, old)
///
/// new 不为 0 时安装新的处理方式；old 不为 0 时先把原来的处理方式写到 old。
pub fn sys_sigaction(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let (signum, new_ptr, old_ptr) = (cx.a(0), cx.a(1), cx.a(2));
    into_ret(sigaction(kernel, signum, new_ptr, old_ptr).map(|_| 0))
}

fn sigaction(kernel: &mut Kernel, signum: usize, new_ptr: usize, old_ptr: usize) -> Result<(), Errno> {
    if SignalFlags::from_signum(signum).is_none() || !is_catchable(signum) {
        return Err(Errno::EINVAL);
    }
    let task = kernel.tasks.current_task_mut();
    let new = if new_ptr != 0 {
        let mut bytes = [0u8; SIGACTION_RAW_SIZE];
        task.copy_from_user(new_ptr, &mut bytes)?;
        Some(SignalAction::from(SigActionRaw::from_bytes(&bytes)))
    } else {
        None
    };
    if old_ptr != 0 {
        let old = SigActionRaw::from(task.signal_actions.get(signum));
        task.copy_to_user(old_ptr, &old.to_bytes())?;
    }
    if let Some(action) = new {
        task.signal_actions.swap(signum, action)?;
    }
    Ok(())
}

/// kill(pid, signum)
pub fn sys_kill(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    into_ret(kernel.tasks.kill(cx.a(0), cx.a(1)).map(|_| 0))
}

/// 信号处理函数返回时调用，恢复被打断的现场
pub fn sys_sigreturn(kernel: &mut Kernel, _cx: &TrapContext) -> isize {
    into_ret(kernel.tasks.sigreturn())
}
