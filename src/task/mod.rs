//! Task management implementation
//!
//! Everything about processes, like creating, forking, scheduling, exiting and
//! reaping them, is implemented here.
//!
//! All processes live in a fixed table of [`NR_TASKS`] slots owned by
//! [`TaskManager`]. A process is addressed by its slot, a [`TaskHandle`]; the
//! parent link is a handle too, so no process ever owns another one. Slot 0 is
//! always `init` (pid 0), which adopts every orphan.
//!
//! Control transfer is a pure state change here: [`TaskManager::run_next_task`]
//! only moves `current`. The trap return path resumes whatever `current`
//! points at afterwards.

pub mod signal;
#[allow(clippy::module_inception)] // 允许有与其父模块同名的子模块
mod task;

use crate::config::NR_TASKS;
use crate::errno::Errno;
use crate::fs::Vfs;
use alloc::vec::Vec;
use signal::SignalFlags;
pub use task::{SignalContext, TaskControlBlock, TaskStatus};

/// 进程在进程表中的槽位号
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskHandle(usize);

impl TaskHandle {
    /// init 进程固定在 0 号槽位
    pub const INIT: Self = Self(0);
}

pub struct TaskManager {
    /// 进程表，None 表示空槽位
    tasks: Vec<Option<TaskControlBlock>>,
    /// 当前正在运行的进程
    current: TaskHandle,
    /// 下一个尝试分配的 pid
    next_pid: usize,
}

impl TaskManager {
    /// 创建只含 init 进程的进程表，init 处于 Running 状态
    pub fn new(entry: usize, user_sp: usize, end_data: usize) -> Result<Self, Errno> {
        let mut init = TaskControlBlock::new_init(entry, user_sp, end_data)?;
        init.task_status = TaskStatus::Running;
        let mut tasks: Vec<Option<TaskControlBlock>> = Vec::with_capacity(NR_TASKS);
        tasks.push(Some(init));
        tasks.resize_with(NR_TASKS, || None);
        info!("init process created, entry = {:#x}", entry);
        Ok(Self {
            tasks,
            current: TaskHandle::INIT,
            next_pid: 1,
        })
    }

    pub fn current(&self) -> TaskHandle {
        self.current
    }

    pub fn get(&self, handle: TaskHandle) -> Option<&TaskControlBlock> {
        self.tasks.get(handle.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: TaskHandle) -> Option<&mut TaskControlBlock> {
        self.tasks.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// 当前进程的 PCB；current 总是指向一个存在的进程
    pub fn current_task(&self) -> &TaskControlBlock {
        self.tasks[self.current.0]
            .as_ref()
            .expect("current slot is empty")
    }

    pub fn current_task_mut(&mut self) -> &mut TaskControlBlock {
        self.tasks[self.current.0]
            .as_mut()
            .expect("current slot is empty")
    }

    pub fn status(&self, handle: TaskHandle) -> TaskStatus {
        self.get(handle)
            .map_or(TaskStatus::Unused, |task| task.task_status)
    }

    /// 按 pid 查找进程，僵尸进程也能找到
    pub fn find_by_pid(&self, pid: usize) -> Option<TaskHandle> {
        self.tasks
            .iter()
            .position(|slot| slot.as_ref().map_or(false, |task| task.pid == pid))
            .map(TaskHandle)
    }

    /// 父进程的 pid；init 没有父进程，返回 0
    pub fn parent_pid(&self, handle: TaskHandle) -> usize {
        self.get(handle)
            .and_then(|task| task.parent)
            .and_then(|parent| self.get(parent))
            .map_or(0, |parent| parent.pid)
    }

    /// handle 的所有子进程（包括僵尸进程）
    pub fn children(&self, handle: TaskHandle) -> impl Iterator<Item = TaskHandle> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .filter(move |(_, slot)| slot.as_ref().map_or(false, |task| task.parent == Some(handle)))
            .map(|(i, _)| TaskHandle(i))
    }

    /// 单调递增地分配 pid，跳过仍被占用的；0 只属于 init
    fn alloc_pid(&mut self) -> usize {
        loop {
            let pid = self.next_pid;
            self.next_pid = match self.next_pid.wrapping_add(1) {
                0 => 1,
                next => next,
            };
            if self.find_by_pid(pid).is_none() {
                return pid;
            }
        }
    }

    /// 复制当前进程，返回子进程的 pid
    ///
    /// 进程表满时返回 EAGAIN，页帧不足时返回 ENOMEM。
    pub fn fork(&mut self) -> Result<usize, Errno> {
        let slot = self
            .tasks
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::EAGAIN)?;
        let pid = self.alloc_pid();
        let parent = self.current;
        let child = self.current_task_mut().fork(pid, parent)?;
        self.tasks[slot] = Some(child);
        debug!("fork: pid {} -> child pid {} in slot {}", self.current_task().pid, pid, slot);
        Ok(pid)
    }

    /// 把 handle 的所有子进程交给 init；如果其中有僵尸进程就唤醒 init
    pub fn reparent_children(&mut self, handle: TaskHandle) {
        let orphans: Vec<TaskHandle> = self.children(handle).collect();
        let mut zombie_adopted = false;
        for orphan in orphans {
            if let Some(task) = self.get_mut(orphan) {
                task.parent = Some(TaskHandle::INIT);
                zombie_adopted |= task.is_zombie();
            }
        }
        if zombie_adopted {
            self.wakeup(TaskHandle::INIT);
        }
    }

    /// 把进程变为僵尸进程
    ///
    /// 关闭它的所有文件描述符，释放它的数据页，子进程交给 init，
    /// 并向父进程发送 SIGCHLD。init 不能以这种方式退出。
    pub fn exit_process(&mut self, handle: TaskHandle, exit_code: i32, vfs: &dyn Vfs) -> Result<(), Errno> {
        if handle == TaskHandle::INIT {
            return Err(Errno::EPERM);
        }
        let task = self.get_mut(handle).ok_or(Errno::ESRCH)?;
        if task.is_zombie() {
            return Err(Errno::ESRCH);
        }
        task.task_status = TaskStatus::Zombie;
        task.exit_code = exit_code;
        task.fd_table.close_all(vfs);
        task.memory_set.recycle_data_pages();
        task.signals = SignalFlags::empty();
        task.signal_backup = None;
        let parent = task.parent;
        info!("process {} exited with code {}", task.pid, exit_code);

        self.reparent_children(handle);
        if let Some(parent) = parent.and_then(|parent| self.get_mut(parent)) {
            parent.signals |= SignalFlags::SIGCHLD;
        }
        if let Some(parent) = parent {
            self.wakeup(parent);
        }
        Ok(())
    }

    /// 回收僵尸进程，释放它的槽位，返回 (pid, exit_code)
    pub fn reap(&mut self, handle: TaskHandle) -> Option<(usize, i32)> {
        match self.tasks.get(handle.0) {
            Some(Some(task)) if task.is_zombie() => {}
            _ => return None,
        }
        let task = self.tasks[handle.0].take()?;
        debug!("reap process {}", task.pid);
        Some((task.pid, task.exit_code))
    }

    /// 在当前进程的子进程中回收一个僵尸进程
    ///
    /// pid 为 -1 时匹配任意子进程。没有匹配的子进程时返回 ECHILD，
    /// 有匹配的子进程但都还没退出时返回 `Ok(None)`。
    pub fn waitpid(&mut self, pid: isize) -> Result<Option<(usize, i32)>, Errno> {
        let matching: Vec<TaskHandle> = self
            .children(self.current)
            .filter(|&child| pid == -1 || self.get(child).map_or(false, |task| task.pid as isize == pid))
            .collect();
        if matching.is_empty() {
            return Err(Errno::ECHILD);
        }
        let zombie = matching
            .into_iter()
            .find(|&child| self.status(child) == TaskStatus::Zombie);
        Ok(zombie.and_then(|child| self.reap(child)))
    }

    /// 唤醒处于 Blocked 状态的进程
    pub fn wakeup(&mut self, handle: TaskHandle) {
        if let Some(task) = self.get_mut(handle) {
            if task.task_status == TaskStatus::Blocked {
                task.task_status = TaskStatus::Ready;
            }
        }
    }

    /// find the next task to run and return its handle
    ///
    /// 从 current 的下一个槽位开始轮转查找 Ready 的进程，current 自身最后被检查
    fn find_next_task(&self) -> Option<TaskHandle> {
        let current = self.current.0;
        (current + 1..current + NR_TASKS + 1)
            .map(|id| id % NR_TASKS) // 保证 id 一定在 [0, NR_TASKS) 范围内
            .find(|&id| self.status(TaskHandle(id)) == TaskStatus::Ready)
            .map(TaskHandle)
    }

    /// 切换到下一个 Ready 的进程
    ///
    /// 调用者需要先把当前进程改为 Ready、Blocked 或 Zombie。
    pub fn run_next_task(&mut self) {
        if let Some(next) = self.find_next_task() {
            if let Some(task) = self.get_mut(next) {
                task.task_status = TaskStatus::Running;
            }
            if next != self.current {
                trace!("switch: slot {} -> slot {}", self.current.0, next.0);
            }
            self.current = next;
        } else {
            panic!("no task to run");
        }
    }

    /// 时钟中断或 yield：当前进程让出 CPU
    pub fn suspend_current_and_run_next(&mut self) {
        self.current_task_mut().task_status = TaskStatus::Ready;
        self.run_next_task();
    }

    /// 当前进程进入等待，直到被 [`TaskManager::wakeup`] 唤醒
    pub fn block_current_and_run_next(&mut self) {
        self.current_task_mut().task_status = TaskStatus::Blocked;
        self.run_next_task();
    }

    /// 当前进程退出并切换到下一个进程
    pub fn exit_current_and_run_next(&mut self, exit_code: i32, vfs: &dyn Vfs) -> Result<(), Errno> {
        self.exit_process(self.current, exit_code, vfs)?;
        self.run_next_task();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{STACK_TOP, USER_END_DATA};
    use crate::fs::EmptyVfs;
    use crate::testutil;

    fn manager() -> TaskManager {
        testutil::init();
        TaskManager::new(0x1000, STACK_TOP, USER_END_DATA).unwrap()
    }

    #[test]
    fn test_init_is_running() {
        let tm = manager();
        assert_eq!(tm.current(), TaskHandle::INIT);
        assert_eq!(tm.current_task().pid, 0);
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Running);
        assert_eq!(tm.status(TaskHandle(1)), TaskStatus::Unused);
        assert_eq!(tm.parent_pid(TaskHandle::INIT), 0);
    }

    #[test]
    fn test_fork_until_table_full() {
        let mut tm = manager();
        for expected in 1..NR_TASKS {
            assert_eq!(tm.fork(), Ok(expected));
        }
        assert_eq!(tm.fork(), Err(Errno::EAGAIN));
    }

    #[test]
    fn test_round_robin_order() {
        let mut tm = manager();
        tm.fork().unwrap();
        tm.fork().unwrap();
        let mut order = Vec::new();
        for _ in 0..4 {
            tm.suspend_current_and_run_next();
            order.push(tm.current_task().pid);
        }
        assert_eq!(order, [1, 2, 0, 1]);
    }

    #[test]
    fn test_suspend_alone_keeps_running() {
        let mut tm = manager();
        tm.suspend_current_and_run_next();
        assert_eq!(tm.current(), TaskHandle::INIT);
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Running);
    }

    #[test]
    #[should_panic(expected = "no task to run")]
    fn test_nothing_runnable() {
        let mut tm = manager();
        tm.block_current_and_run_next();
    }

    #[test]
    fn test_exit_reparents_and_signals_parent() {
        let mut tm = manager();
        let child = tm.fork().unwrap();
        tm.suspend_current_and_run_next();
        assert_eq!(tm.current_task().pid, child);
        let grandchild = tm.fork().unwrap();

        tm.exit_current_and_run_next(7, &EmptyVfs).unwrap();
        // the scan continues after the exited slot
        assert_eq!(tm.current_task().pid, grandchild);
        let gc = tm.current();
        assert_eq!(tm.parent_pid(gc), 0);
        tm.suspend_current_and_run_next();
        assert_eq!(tm.current(), TaskHandle::INIT);
        assert!(tm.current_task().signals.contains(SignalFlags::SIGCHLD));
        assert_eq!(tm.waitpid(child as isize), Ok(Some((child, 7))));
        assert_eq!(tm.find_by_pid(child), None);
        assert_eq!(tm.waitpid(-1), Ok(None));
        assert_eq!(tm.waitpid(child as isize), Err(Errno::ECHILD));
    }

    #[test]
    fn test_exit_wakes_blocked_parent() {
        let mut tm = manager();
        tm.fork().unwrap();
        tm.block_current_and_run_next();
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Blocked);
        tm.exit_current_and_run_next(0, &EmptyVfs).unwrap();
        assert_eq!(tm.current(), TaskHandle::INIT);
        assert_eq!(tm.status(TaskHandle::INIT), TaskStatus::Running);
    }

    #[test]
    fn test_init_cannot_exit() {
        let mut tm = manager();
        assert_eq!(tm.exit_process(TaskHandle::INIT, 0, &EmptyVfs), Err(Errno::EPERM));
    }

    #[test]
    fn test_pids_are_not_reused_while_alive() {
        let mut tm = manager();
        let a = tm.fork().unwrap();
        let handle = tm.find_by_pid(a).unwrap();
        tm.exit_process(handle, 0, &EmptyVfs).unwrap();
        tm.reap(handle).unwrap();
        let b = tm.fork().unwrap();
        assert_ne!(a, b);
        assert_eq!(tm.find_by_pid(b), Some(handle));
    }
}
