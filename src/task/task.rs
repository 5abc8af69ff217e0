use super::signal::{SignalActions, SignalFlags};
use super::TaskHandle;
use crate::config::{MAX_PATH_LEN, PAGE_SIZE, STACK_TOP, USER_STACK_SIZE};
use crate::errno::Errno;
use crate::fs::FdTable;
use crate::mm::{MemorySet, PhysPageNum, VPNRange, VirtAddr, VirtPageNum, USER_RW};
use crate::trap::TrapContext;
use alloc::string::String;
use alloc::vec::Vec;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// 进程表中的空槽位
    Unused,
    Ready,
    Running,
    Blocked,
    /// 已退出，等待父进程回收
    Zombie,
}

/// 进入信号处理函数前保存的现场
#[derive(Copy, Clone, Debug)]
pub struct SignalContext {
    pub trap_cx: TrapContext,
    pub mask: SignalFlags,
}

/// process control block
pub struct TaskControlBlock {
    pub pid: usize,
    pub task_status: TaskStatus,
    /// 只有 init 没有父进程
    pub parent: Option<TaskHandle>,
    /// 进程不在运行时保存的寄存器现场
    pub trap_cx: TrapContext,
    /// 堆的当前边界与下界，堆区间为 [end_data, brk)
    pub brk: usize,
    pub end_data: usize,
    pub fd_table: FdTable,
    pub memory_set: MemorySet,
    /// 待处理的信号
    pub signals: SignalFlags,
    pub signal_mask: SignalFlags,
    pub signal_actions: SignalActions,
    /// 正在执行信号处理函数时为 Some，sigreturn 从这里恢复
    pub signal_backup: Option<SignalContext>,
    /// 只有 Zombie 状态下有意义
    pub exit_code: i32,
}

impl TaskControlBlock {
    /// 创建 init 进程 (pid 0)
    pub fn new_init(entry: usize, user_sp: usize, end_data: usize) -> Result<Self, Errno> {
        Ok(Self {
            pid: 0,
            task_status: TaskStatus::Ready,
            parent: None,
            trap_cx: TrapContext::app_init_context(entry, user_sp),
            brk: end_data,
            end_data,
            fd_table: FdTable::new(),
            memory_set: MemorySet::new_bare().ok_or(Errno::ENOMEM)?,
            signals: SignalFlags::empty(),
            signal_mask: SignalFlags::empty(),
            signal_actions: SignalActions::new(),
            signal_backup: None,
            exit_code: 0,
        })
    }

    /// 复制出子进程的 PCB
    ///
    /// 子进程的 a0 被改为 0，这样同一个 fork 调用在子进程中返回 0；
    /// 地址空间以写时复制的方式共享，文件描述符不继承。
    pub fn fork(&mut self, pid: usize, parent: TaskHandle) -> Result<Self, Errno> {
        let memory_set = self.memory_set.fork_cow().ok_or(Errno::ENOMEM)?;
        let mut trap_cx = self.trap_cx;
        trap_cx.set_ret(0);
        Ok(Self {
            pid,
            task_status: TaskStatus::Ready,
            parent: Some(parent),
            trap_cx,
            brk: self.brk,
            end_data: self.end_data,
            fd_table: FdTable::new(),
            memory_set,
            signals: SignalFlags::empty(),
            signal_mask: self.signal_mask,
            signal_actions: self.signal_actions.clone(),
            signal_backup: self.signal_backup,
            exit_code: 0,
        })
    }

    pub fn is_zombie(&self) -> bool {
        self.task_status == TaskStatus::Zombie
    }

    /// 调整堆边界；new_brk 不在 [end_data, STACK_TOP - USER_STACK_SIZE) 内时保持不变
    pub fn set_brk(&mut self, new_brk: usize) -> usize {
        if new_brk >= self.end_data && new_brk < STACK_TOP - USER_STACK_SIZE {
            if new_brk < self.brk {
                // 堆收缩时释放 new_brk 之上的整页
                let start = VirtAddr::from(new_brk).ceil();
                let end = VirtAddr::from(self.brk).ceil();
                if start < end {
                    self.memory_set.unmap_range(VPNRange::new(start, end));
                }
            }
            self.brk = new_brk;
        }
        self.brk
    }

    /// 堆和用户栈中的页面在第一次访问时才分配
    fn is_demand_zero(&self, va: usize) -> bool {
        (self.end_data..self.brk).contains(&va)
            || (STACK_TOP - USER_STACK_SIZE..STACK_TOP).contains(&va)
    }

    /// [va, va + len) 中每一页都已映射，或者属于按需分配的堆/栈；不会分配任何页面
    pub fn check_user_range(&self, va: usize, len: usize) -> Result<(), Errno> {
        if len == 0 {
            return Ok(());
        }
        let end = va.checked_add(len).ok_or(Errno::EFAULT)?;
        if end > STACK_TOP {
            return Err(Errno::EFAULT);
        }
        let last = VirtAddr::from(end - 1).floor();
        let mut vpn = VirtAddr::from(va).floor();
        loop {
            // 第一页从 va 开始，之后的页从页首开始
            let addr = (vpn.0 * PAGE_SIZE).max(va);
            if self.memory_set.translate(vpn).is_none() && !self.is_demand_zero(addr) {
                return Err(Errno::EFAULT);
            }
            if vpn == last {
                return Ok(());
            }
            vpn = VirtPageNum(vpn.0 + 1);
        }
    }

    /// 缺页处理：写 COW 页面时复制，访问尚未分配的堆/栈页面时分配清零页面
    pub fn handle_page_fault(&mut self, va: usize, write: bool) -> Result<(), Errno> {
        let vpn = VirtAddr::from(va).floor();
        match self.memory_set.translate(vpn) {
            Some(pte) if write && !pte.is_writable() => {
                if self.memory_set.resolve_cow(vpn)? {
                    Ok(())
                } else {
                    Err(Errno::EFAULT)
                }
            }
            Some(_) => Ok(()),
            None if self.is_demand_zero(va) => {
                self.memory_set.map_zeroed(vpn, USER_RW).ok_or(Errno::ENOMEM)
            }
            None => Err(Errno::EFAULT),
        }
    }

    /// 用户地址 va 所在的物理页；访问方式与硬件一致，必要时走缺页处理
    fn user_page(&mut self, va: VirtAddr, write: bool) -> Result<PhysPageNum, Errno> {
        match self.memory_set.translate(va.floor()) {
            Some(pte) if !write || pte.is_writable() => return Ok(pte.ppn()),
            _ => {}
        }
        self.handle_page_fault(va.0, write)?;
        self.memory_set
            .translate(va.floor())
            .map(|pte| pte.ppn())
            .ok_or(Errno::EFAULT)
    }

    /// 将 data 拷贝到用户地址空间 va 处；写共享页面同样会触发写时复制
    pub fn copy_to_user(&mut self, va: usize, data: &[u8]) -> Result<(), Errno> {
        let end = va.checked_add(data.len()).ok_or(Errno::EFAULT)?;
        let mut start = va;
        while start < end {
            let start_va = VirtAddr::from(start);
            let ppn = self.user_page(start_va, true)?;
            let page_end = (start_va.floor().0 + 1) * PAGE_SIZE;
            let len = page_end.min(end) - start;
            let offset = start_va.page_offset();
            let copied = start - va;
            ppn.get_bytes_array()[offset..offset + len].copy_from_slice(&data[copied..copied + len]);
            start += len;
        }
        Ok(())
    }

    /// 从用户地址空间 va 处读出 buf.len() 个字节
    pub fn copy_from_user(&mut self, va: usize, buf: &mut [u8]) -> Result<(), Errno> {
        let end = va.checked_add(buf.len()).ok_or(Errno::EFAULT)?;
        let mut start = va;
        while start < end {
            let start_va = VirtAddr::from(start);
            let ppn = self.user_page(start_va, false)?;
            let page_end = (start_va.floor().0 + 1) * PAGE_SIZE;
            let len = page_end.min(end) - start;
            let offset = start_va.page_offset();
            let copied = start - va;
            buf[copied..copied + len].copy_from_slice(&ppn.get_bytes_array()[offset..offset + len]);
            start += len;
        }
        Ok(())
    }

    /// 读出用户态以 '\0' 结尾的字符串
    pub fn translated_str(&mut self, va: usize) -> Result<String, Errno> {
        let mut bytes = Vec::new();
        let mut ch = [0u8; 1];
        loop {
            if bytes.len() >= MAX_PATH_LEN {
                return Err(Errno::EINVAL);
            }
            let addr = va.checked_add(bytes.len()).ok_or(Errno::EFAULT)?;
            self.copy_from_user(addr, &mut ch)?;
            if ch[0] == 0 {
                break;
            }
            bytes.push(ch[0]);
        }
        String::from_utf8(bytes).map_err(|_| Errno::EINVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USER_END_DATA;
    use crate::testutil;

    fn init_task() -> TaskControlBlock {
        testutil::init();
        TaskControlBlock::new_init(0x1000, STACK_TOP, USER_END_DATA).unwrap()
    }

    #[test]
    fn test_brk_bounds() {
        let mut task = init_task();
        assert_eq!(task.set_brk(USER_END_DATA + 0x3000), USER_END_DATA + 0x3000);
        // below end_data: unchanged
        assert_eq!(task.set_brk(USER_END_DATA - 1), USER_END_DATA + 0x3000);
        // reaching into the stack: unchanged
        assert_eq!(task.set_brk(STACK_TOP - USER_STACK_SIZE), USER_END_DATA + 0x3000);
        assert_eq!(task.set_brk(STACK_TOP - USER_STACK_SIZE - 1), STACK_TOP - USER_STACK_SIZE - 1);
        assert_eq!(task.set_brk(USER_END_DATA), USER_END_DATA);
    }

    #[test]
    fn test_heap_is_demand_zero() {
        let mut task = init_task();
        let mut buf = [0xffu8; 4];
        assert_eq!(task.copy_from_user(USER_END_DATA, &mut buf), Err(Errno::EFAULT));
        task.set_brk(USER_END_DATA + PAGE_SIZE * 2);
        task.copy_from_user(USER_END_DATA, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
        assert_eq!(task.memory_set.mapped_pages(), 1);
    }

    #[test]
    fn test_copy_across_pages() {
        let mut task = init_task();
        task.set_brk(USER_END_DATA + PAGE_SIZE * 2);
        let va = USER_END_DATA + PAGE_SIZE - 3;
        task.copy_to_user(va, b"abcdef").unwrap();
        let mut buf = [0u8; 6];
        task.copy_from_user(va, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
        assert_eq!(task.memory_set.mapped_pages(), 2);
    }

    #[test]
    fn test_shrinking_brk_unmaps_pages() {
        let mut task = init_task();
        task.set_brk(USER_END_DATA + PAGE_SIZE * 2);
        task.copy_to_user(USER_END_DATA + PAGE_SIZE, b"x").unwrap();
        task.set_brk(USER_END_DATA + 8);
        assert_eq!(task.memory_set.mapped_pages(), 0);
        let mut buf = [0u8; 1];
        assert_eq!(
            task.copy_from_user(USER_END_DATA + PAGE_SIZE, &mut buf),
            Err(Errno::EFAULT)
        );
    }

    #[test]
    fn test_check_user_range() {
        let mut task = init_task();
        assert_eq!(task.check_user_range(0x10, 0), Ok(()));
        assert_eq!(task.check_user_range(0x10, 4), Err(Errno::EFAULT));
        assert_eq!(task.check_user_range(STACK_TOP - 8, 8), Ok(()));
        assert_eq!(task.check_user_range(STACK_TOP - 8, 9), Err(Errno::EFAULT));
        assert_eq!(task.check_user_range(STACK_TOP - 8, usize::MAX), Err(Errno::EFAULT));
        // heap pages count once brk covers them, even before they are touched
        assert_eq!(task.check_user_range(USER_END_DATA, PAGE_SIZE), Err(Errno::EFAULT));
        task.set_brk(USER_END_DATA + PAGE_SIZE * 2);
        assert_eq!(task.check_user_range(USER_END_DATA, PAGE_SIZE * 2), Ok(()));
        assert_eq!(task.memory_set.mapped_pages(), 0);
    }

    #[test]
    fn test_stack_and_strings() {
        let mut task = init_task();
        let va = STACK_TOP - 16;
        task.copy_to_user(va, b"/a\0").unwrap();
        assert_eq!(task.translated_str(va).unwrap(), "/a");
        assert_eq!(task.translated_str(0x10), Err(Errno::EFAULT));
    }

    #[test]
    fn test_fork_resets_child_state() {
        let mut parent = init_task();
        parent.trap_cx.set_ret(99);
        parent.signals = SignalFlags::SIGUSR1;
        let child = parent.fork(7, TaskHandle::INIT).unwrap();
        assert_eq!(child.pid, 7);
        assert_eq!(child.parent, Some(TaskHandle::INIT));
        assert_eq!(child.trap_cx.a0(), 0);
        assert_eq!(child.task_status, TaskStatus::Ready);
        assert!(child.signals.is_empty());
        assert_eq!(child.brk, parent.brk);
        assert!(!child.fd_table.is_bound(0));
    }
}
