//! Signal numbers, per-process handler table and the user ABI of `sigaction`.

use super::{SignalContext, TaskControlBlock, TaskHandle, TaskManager};
use crate::config::MAX_SIG;
use crate::errno::Errno;
use crate::fs::Vfs;
use bitflags::*;

pub const SIGHUP: usize = 1;
pub const SIGINT: usize = 2;
pub const SIGILL: usize = 4;
pub const SIGABRT: usize = 6;
pub const SIGKILL: usize = 9;
pub const SIGUSR1: usize = 10;
pub const SIGSEGV: usize = 11;
pub const SIGUSR2: usize = 12;
pub const SIGTERM: usize = 15;
pub const SIGCHLD: usize = 17;
pub const SIGCONT: usize = 18;
pub const SIGSTOP: usize = 19;
pub const SIGTSTP: usize = 20;
pub const SIGTTIN: usize = 21;
pub const SIGTTOU: usize = 22;
pub const SIGURG: usize = 23;
pub const SIGWINCH: usize = 28;

/// handler 取值：默认动作
pub const SIG_DFL: usize = 0;
/// handler 取值：忽略
pub const SIG_IGN: usize = 1;

bitflags! {
    /// 信号集合，第 n 位对应信号 n
    pub struct SignalFlags: u32 {
        const SIGHUP = 1 << 1;
        const SIGINT = 1 << 2;
        const SIGQUIT = 1 << 3;
        const SIGILL = 1 << 4;
        const SIGTRAP = 1 << 5;
        const SIGABRT = 1 << 6;
        const SIGBUS = 1 << 7;
        const SIGFPE = 1 << 8;
        const SIGKILL = 1 << 9;
        const SIGUSR1 = 1 << 10;
        const SIGSEGV = 1 << 11;
        const SIGUSR2 = 1 << 12;
        const SIGPIPE = 1 << 13;
        const SIGALRM = 1 << 14;
        const SIGTERM = 1 << 15;
        const SIGSTKFLT = 1 << 16;
        const SIGCHLD = 1 << 17;
        const SIGCONT = 1 << 18;
        const SIGSTOP = 1 << 19;
        const SIGTSTP = 1 << 20;
        const SIGTTIN = 1 << 21;
        const SIGTTOU = 1 << 22;
        const SIGURG = 1 << 23;
        const SIGXCPU = 1 << 24;
        const SIGXFSZ = 1 << 25;
        const SIGVTALRM = 1 << 26;
        const SIGPROF = 1 << 27;
        const SIGWINCH = 1 << 28;
        const SIGIO = 1 << 29;
        const SIGPWR = 1 << 30;
        const SIGSYS = 1 << 31;
    }
}

impl SignalFlags {
    /// 单个信号对应的集合；signum 不合法时返回 None
    pub fn from_signum(signum: usize) -> Option<Self> {
        if (1..=MAX_SIG).contains(&signum) {
            Self::from_bits(1 << signum)
        } else {
            None
        }
    }

    /// 编号最小的信号
    pub fn lowest(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.bits().trailing_zeros() as usize)
        }
    }
}

/// 能否为 signum 设置处理函数
pub fn is_catchable(signum: usize) -> bool {
    signum != SIGKILL && signum != SIGSTOP
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigHandler {
    Default,
    Ignore,
    /// 用户态处理函数入口
    User(usize),
}

impl SigHandler {
    pub fn from_raw(handler: usize) -> Self {
        match handler {
            SIG_DFL => SigHandler::Default,
            SIG_IGN => SigHandler::Ignore,
            addr => SigHandler::User(addr),
        }
    }

    pub fn to_raw(self) -> usize {
        match self {
            SigHandler::Default => SIG_DFL,
            SigHandler::Ignore => SIG_IGN,
            SigHandler::User(addr) => addr,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// 一个信号的处理方式；mask 中的信号在处理函数运行期间被屏蔽
pub struct SignalAction {
    pub handler: SigHandler,
    pub mask: SignalFlags,
}

impl Default for SignalAction {
    fn default() -> Self {
        Self {
            handler: SigHandler::Default,
            mask: SignalFlags::empty(),
        }
    }
}

/// Raw representation of struct sigaction for userspace
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigActionRaw {
    pub handler: usize,
    pub mask: u32,
}

pub const SIGACTION_RAW_SIZE: usize = 16;

impl SigActionRaw {
    pub fn to_bytes(&self) -> [u8; SIGACTION_RAW_SIZE] {
        let mut bytes = [0u8; SIGACTION_RAW_SIZE];
        bytes[0..8].copy_from_slice(&(self.handler as u64).to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.mask.to_ne_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; SIGACTION_RAW_SIZE]) -> Self {
        let mut handler = [0u8; 8];
        let mut mask = [0u8; 4];
        handler.copy_from_slice(&bytes[0..8]);
        mask.copy_from_slice(&bytes[8..12]);
        Self {
            handler: u64::from_ne_bytes(handler) as usize,
            mask: u32::from_ne_bytes(mask),
        }
    }
}

impl From<SignalAction> for SigActionRaw {
    fn from(action: SignalAction) -> Self {
        Self {
            handler: action.handler.to_raw(),
            mask: action.mask.bits(),
        }
    }
}

impl From<SigActionRaw> for SignalAction {
    fn from(raw: SigActionRaw) -> Self {
        Self {
            handler: SigHandler::from_raw(raw.handler),
            mask: SignalFlags::from_bits_truncate(raw.mask),
        }
    }
}

/// 每个进程的信号处理表，下标是信号编号
#[derive(Clone)]
pub struct SignalActions {
    table: [SignalAction; MAX_SIG + 1],
}

impl SignalActions {
    pub fn new() -> Self {
        Self {
            table: [SignalAction::default(); MAX_SIG + 1],
        }
    }

    pub fn get(&self, signum: usize) -> SignalAction {
        self.table[signum]
    }

    /// 换入新的处理方式，返回旧的
    pub fn swap(&mut self, signum: usize, action: SignalAction) -> Result<SignalAction, Errno> {
        if SignalFlags::from_signum(signum).is_none() || !is_catchable(signum) {
            return Err(Errno::EINVAL);
        }
        Ok(core::mem::replace(&mut self.table[signum], action))
    }
}

impl Default for SignalActions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Ignore,
}

/// 没有注册处理函数时的默认动作
pub fn default_action(signum: usize) -> DefaultAction {
    match signum {
        SIGCHLD | SIGURG | SIGWINCH => DefaultAction::Ignore,
        // 不支持作业控制，停止/继续类信号按忽略处理
        SIGCONT | SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU => DefaultAction::Ignore,
        _ => DefaultAction::Terminate,
    }
}

/// 当前可以投递的编号最小的信号
///
/// SIGKILL 和 SIGSTOP 不能被屏蔽；处理函数正在运行时，需要用户处理函数的信号继续挂起。
fn next_signal(task: &TaskControlBlock) -> Option<usize> {
    let blockable = task.signal_mask - (SignalFlags::SIGKILL | SignalFlags::SIGSTOP);
    let mut deliverable = task.signals - blockable;
    if task.signal_backup.is_some() {
        for signum in 1..=MAX_SIG {
            if let (SigHandler::User(_), Some(flag)) = (
                task.signal_actions.get(signum).handler,
                SignalFlags::from_signum(signum),
            ) {
                deliverable.remove(flag);
            }
        }
    }
    deliverable.lowest()
}

impl TaskManager {
    /// 向 pid 发送信号：只做标记，投递发生在目标进程返回用户态之前
    pub fn kill(&mut self, pid: usize, signum: usize) -> Result<(), Errno> {
        let handle = self.find_by_pid(pid).ok_or(Errno::ESRCH)?;
        let task = self.get_mut(handle).ok_or(Errno::ESRCH)?;
        if task.is_zombie() {
            return Err(Errno::ESRCH);
        }
        let flag = SignalFlags::from_signum(signum).ok_or(Errno::EINVAL)?;
        task.signals |= flag;
        debug!("kill: signal {} pending for process {}", signum, pid);
        self.wakeup(handle);
        Ok(())
    }

    /// 返回用户态前处理当前进程的信号
    ///
    /// 进入用户处理函数时保存当前现场，`sepc` 指向处理函数、`a0` 为信号编号；
    /// 默认动作为终止时当前进程退出，然后继续处理新的当前进程。
    pub fn handle_signals(&mut self, vfs: &dyn Vfs) {
        loop {
            let task = self.current_task_mut();
            let signum = match next_signal(task) {
                Some(signum) => signum,
                None => return,
            };
            let flag = SignalFlags::from_signum(signum).unwrap_or(SignalFlags::empty());
            task.signals.remove(flag);
            let action = task.signal_actions.get(signum);
            match action.handler {
                SigHandler::User(entry) => {
                    task.signal_backup = Some(SignalContext {
                        trap_cx: task.trap_cx,
                        mask: task.signal_mask,
                    });
                    task.signal_mask |= action.mask | flag;
                    task.trap_cx.sepc = entry;
                    task.trap_cx.set_a(0, signum);
                    debug!("process {}: enter handler {:#x} for signal {}", task.pid, entry, signum);
                    return;
                }
                SigHandler::Ignore => {}
                SigHandler::Default => {
                    if default_action(signum) == DefaultAction::Ignore {
                        continue;
                    }
                    if self.current() == TaskHandle::INIT {
                        warn!("init ignores fatal signal {}", signum);
                        continue;
                    }
                    if let Err(err) = self.exit_current_and_run_next(-(signum as i32), vfs) {
                        error!("failed to terminate on signal {}: {}", signum, err);
                        return;
                    }
                }
            }
        }
    }

    /// 从信号处理函数返回：恢复进入处理函数前的现场和屏蔽字
    ///
    /// 返回值是恢复后的 a0，系统调用的返回值写回时不会改变它。
    pub fn sigreturn(&mut self) -> Result<isize, Errno> {
        let task = self.current_task_mut();
        let saved = task.signal_backup.take().ok_or(Errno::EINVAL)?;
        task.trap_cx = saved.trap_cx;
        task.signal_mask = saved.mask;
        Ok(task.trap_cx.a0() as isize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{STACK_TOP, USER_END_DATA};
    use crate::fs::EmptyVfs;
    use crate::task::TaskStatus;
    use crate::testutil;

    fn manager() -> TaskManager {
        testutil::init();
        TaskManager::new(0x1000, STACK_TOP, USER_END_DATA).unwrap()
    }

    #[test]
    fn test_from_signum() {
        assert_eq!(SignalFlags::from_signum(SIGUSR1), Some(SignalFlags::SIGUSR1));
        assert_eq!(SignalFlags::from_signum(31), Some(SignalFlags::SIGSYS));
        assert_eq!(SignalFlags::from_signum(0), None);
        assert_eq!(SignalFlags::from_signum(32), None);
    }

    #[test]
    fn test_lowest() {
        let set = SignalFlags::SIGTERM | SignalFlags::SIGUSR1;
        assert_eq!(set.lowest(), Some(SIGUSR1));
        assert_eq!(SignalFlags::empty().lowest(), None);
    }

    #[test]
    fn test_swap_returns_previous() {
        let mut actions = SignalActions::new();
        let action = SignalAction {
            handler: SigHandler::User(0x8000),
            mask: SignalFlags::SIGUSR2,
        };
        assert_eq!(actions.swap(SIGUSR1, action), Ok(SignalAction::default()));
        assert_eq!(actions.get(SIGUSR1), action);
        assert_eq!(actions.swap(SIGKILL, action), Err(Errno::EINVAL));
        assert_eq!(actions.swap(0, action), Err(Errno::EINVAL));
        assert_eq!(actions.swap(MAX_SIG + 1, action), Err(Errno::EINVAL));
    }

    #[test]
    fn test_raw_abi() {
        let raw = SigActionRaw {
            handler: 0xdead_0000,
            mask: SignalFlags::SIGINT.bits(),
        };
        assert_eq!(SigActionRaw::from_bytes(&raw.to_bytes()), raw);
        let action = SignalAction::from(raw);
        assert_eq!(action.handler, SigHandler::User(0xdead_0000));
        assert_eq!(SignalAction::from(SigActionRaw { handler: 1, mask: 0 }).handler, SigHandler::Ignore);
    }

    #[test]
    fn test_default_actions() {
        assert_eq!(default_action(SIGCHLD), DefaultAction::Ignore);
        assert_eq!(default_action(SIGTERM), DefaultAction::Terminate);
        assert_eq!(default_action(SIGSEGV), DefaultAction::Terminate);
        for signum in [SIGHUP, SIGILL, SIGABRT] {
            assert_eq!(default_action(signum), DefaultAction::Terminate);
        }
        assert_eq!(default_action(SIGTSTP), DefaultAction::Ignore);
    }

    #[test]
    fn test_kill_validates_target() {
        let mut tm = manager();
        assert_eq!(tm.kill(42, SIGUSR1), Err(Errno::ESRCH));
        assert_eq!(tm.kill(0, 0), Err(Errno::EINVAL));
        assert_eq!(tm.kill(0, MAX_SIG + 1), Err(Errno::EINVAL));
        let child = tm.fork().unwrap();
        let handle = tm.find_by_pid(child).unwrap();
        tm.exit_process(handle, 0, &EmptyVfs).unwrap();
        assert_eq!(tm.kill(child, SIGUSR1), Err(Errno::ESRCH));
    }

    #[test]
    fn test_handler_and_sigreturn() {
        let mut tm = manager();
        let action = SignalAction {
            handler: SigHandler::User(0x8000),
            mask: SignalFlags::SIGUSR2,
        };
        tm.current_task_mut().signal_actions.swap(SIGUSR1, action).unwrap();
        tm.current_task_mut().trap_cx.sepc = 0x1234;
        tm.current_task_mut().trap_cx.set_a(0, 77);
        let before = tm.current_task().trap_cx;

        tm.kill(0, SIGUSR1).unwrap();
        tm.handle_signals(&EmptyVfs);
        let task = tm.current_task();
        assert_eq!(task.trap_cx.sepc, 0x8000);
        assert_eq!(task.trap_cx.a0(), SIGUSR1);
        assert!(task.signals.is_empty());
        assert_eq!(task.signal_mask, SignalFlags::SIGUSR1 | SignalFlags::SIGUSR2);

        // a second SIGUSR1 waits until the handler returns
        tm.kill(0, SIGUSR1).unwrap();
        tm.handle_signals(&EmptyVfs);
        assert_eq!(tm.current_task().trap_cx.sepc, 0x8000);
        assert!(tm.current_task().signals.contains(SignalFlags::SIGUSR1));

        assert_eq!(tm.sigreturn(), Ok(77));
        assert_eq!(tm.current_task().trap_cx, before);
        assert!(tm.current_task().signal_mask.is_empty());
        assert_eq!(tm.sigreturn(), Err(Errno::EINVAL));
    }

    #[test]
    fn test_default_terminate_switches_away() {
        let mut tm = manager();
        let child = tm.fork().unwrap();
        tm.suspend_current_and_run_next();
        tm.kill(child, SIGTERM).unwrap();
        tm.handle_signals(&EmptyVfs);
        assert_eq!(tm.current(), TaskHandle::INIT);
        let handle = tm.find_by_pid(child).unwrap();
        assert_eq!(tm.status(handle), TaskStatus::Zombie);
        assert_eq!(tm.get(handle).unwrap().exit_code, -(SIGTERM as i32));
    }

    #[test]
    fn test_ignored_and_init_immune() {
        let mut tm = manager();
        tm.kill(0, SIGCHLD).unwrap();
        tm.kill(0, SIGKILL).unwrap();
        tm.handle_signals(&EmptyVfs);
        assert!(tm.current_task().signals.is_empty());
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Running);
    }

    #[test]
    fn test_masked_signal_stays_pending() {
        let mut tm = manager();
        tm.current_task_mut().signal_mask = SignalFlags::SIGTERM;
        tm.kill(0, SIGTERM).unwrap();
        tm.handle_signals(&EmptyVfs);
        assert!(tm.current_task().signals.contains(SignalFlags::SIGTERM));
    }

    #[test]
    fn test_kill_wakes_blocked_target() {
        let mut tm = manager();
        let child = tm.fork().unwrap();
        tm.block_current_and_run_next();
        assert_eq!(tm.current_task().pid, child);
        tm.kill(0, SIGUSR2).unwrap();
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Ready);
    }
}
