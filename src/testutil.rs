//! Host fixtures: a frame arena, a recording firmware and an in-memory VFS.

use crate::config::{PAGE_SIZE, STACK_TOP, USER_END_DATA};
use crate::errno::Errno;
use crate::fs::{InodeHandle, RequestDir, Stat, Vfs};
use crate::kernel::Kernel;
use crate::mm::{init_frame_allocator, PhysAddr};
use crate::sbi::{Firmware, ResetReason, ResetType, SbiRet};
use crate::task::TaskHandle;
use crate::trap::{TrapCause, TrapContext};
use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use std::alloc::{alloc_zeroed, Layout};

const ARENA_PAGES: usize = 8192;

/// init 进程的入口，测试中只作为 sepc 的初始值
pub const INIT_ENTRY: usize = 0x1000;

static ARENA: spin::Once<()> = spin::Once::new();

/// 用一块泄漏的、按页对齐的内存作为"物理内存"初始化页帧分配器
pub fn init() {
    ARENA.call_once(|| {
        let layout = Layout::from_size_align(ARENA_PAGES * PAGE_SIZE, PAGE_SIZE)
            .expect("bad arena layout");
        let start = unsafe { alloc_zeroed(layout) } as usize;
        assert_ne!(start, 0, "arena allocation failed");
        init_frame_allocator(PhysAddr(start), PhysAddr(start + ARENA_PAGES * PAGE_SIZE));
    });
}

#[derive(Default)]
struct FirmwareState {
    time: usize,
    timer: Option<usize>,
    input: VecDeque<u8>,
    output: Vec<u8>,
    resets: Vec<ResetType>,
}

/// 记录所有调用的固件；clone 出来的句柄共享同一份状态
#[derive(Clone, Default)]
pub struct MockFirmware {
    state: Rc<RefCell<FirmwareState>>,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, time: usize) {
        self.state.borrow_mut().time = time;
    }

    pub fn timer(&self) -> Option<usize> {
        self.state.borrow().timer
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.state.borrow_mut().input.extend(bytes.iter().copied());
    }

    pub fn output(&self) -> Vec<u8> {
        self.state.borrow().output.clone()
    }

    pub fn resets(&self) -> Vec<ResetType> {
        self.state.borrow().resets.clone()
    }
}

impl Firmware for MockFirmware {
    fn set_timer(&self, stime_value: usize) {
        self.state.borrow_mut().timer = Some(stime_value);
    }

    fn console_putchar(&self, ch: usize) {
        self.state.borrow_mut().output.push(ch as u8);
    }

    fn console_getchar(&self) -> Option<u8> {
        self.state.borrow_mut().input.pop_front()
    }

    fn read_time(&self) -> usize {
        self.state.borrow().time
    }

    fn spec_version(&self) -> SbiRet {
        SbiRet::ok(0x0100_0000)
    }

    fn impl_id(&self) -> SbiRet {
        SbiRet::ok(0)
    }

    fn impl_version(&self) -> SbiRet {
        SbiRet::ok(0)
    }

    fn mvendorid(&self) -> SbiRet {
        SbiRet::ok(0)
    }

    fn probe_extension(&self, _extension_id: usize) -> SbiRet {
        SbiRet::ok(1)
    }

    /// 复位被记录下来但不会生效，调用返回一个失败
    fn system_reset(&self, reset_type: ResetType, _reason: ResetReason) -> SbiRet {
        self.state.borrow_mut().resets.push(reset_type);
        SbiRet { error: -1, value: 0 }
    }
}

struct MockFile {
    ino: usize,
    data: Vec<u8>,
}

#[derive(Default)]
struct VfsState {
    files: BTreeMap<String, MockFile>,
    refs: BTreeMap<usize, usize>,
    requests: Vec<(usize, usize, RequestDir)>,
}

/// 内存中的只读文件系统，记录 inode 的引用计数和收到的请求
#[derive(Clone, Default)]
pub struct MockVfs {
    state: Rc<RefCell<VfsState>>,
}

impl MockVfs {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let vfs = Self::default();
        {
            let mut state = vfs.state.borrow_mut();
            for (i, (path, data)) in files.iter().enumerate() {
                state.files.insert(
                    String::from(*path),
                    MockFile {
                        ino: i + 1,
                        data: data.as_bytes().to_vec(),
                    },
                );
            }
        }
        vfs
    }

    /// 内核持有的 path 的引用数
    pub fn refs(&self, path: &str) -> usize {
        let state = self.state.borrow();
        state
            .files
            .get(path)
            .and_then(|file| state.refs.get(&file.ino).copied())
            .unwrap_or(0)
    }

    /// (ino, len, dir)
    pub fn requests(&self) -> Vec<(usize, usize, RequestDir)> {
        self.state.borrow().requests.clone()
    }
}

impl Vfs for MockVfs {
    fn lookup(&self, path: &str) -> Option<InodeHandle> {
        self.state
            .borrow()
            .files
            .get(path)
            .map(|file| InodeHandle::new(file.ino))
    }

    fn ref_inode(&self, inode: &InodeHandle) {
        *self.state.borrow_mut().refs.entry(inode.ino()).or_insert(0) += 1;
    }

    fn free_inode(&self, inode: InodeHandle) {
        let mut state = self.state.borrow_mut();
        let count = state.refs.entry(inode.ino()).or_insert(0);
        assert!(*count > 0, "inode {} freed more times than referenced", inode.ino());
        *count -= 1;
    }

    fn stat(&self, inode: &InodeHandle) -> Stat {
        let state = self.state.borrow();
        let size = state
            .files
            .values()
            .find(|file| file.ino == inode.ino())
            .map_or(0, |file| file.data.len());
        Stat {
            dev: 0,
            ino: inode.ino() as u64,
            mode: 0o100644,
            nlink: 1,
            size: size as u64,
        }
    }

    fn request(
        &self,
        inode: &InodeHandle,
        buf: &mut [u8],
        offset: usize,
        dir: RequestDir,
    ) -> Result<(), Errno> {
        let mut state = self.state.borrow_mut();
        state.requests.push((inode.ino(), buf.len(), dir));
        if dir == RequestDir::Write {
            return Err(Errno::EIO);
        }
        let file = state
            .files
            .values()
            .find(|file| file.ino == inode.ino())
            .ok_or(Errno::EIO)?;
        let data = file.data.get(offset..).unwrap_or(&[]);
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        buf[len..].fill(0);
        Ok(())
    }
}

/// 一个只有 init 的内核，init 位于 STACK_TOP 的用户栈和 USER_END_DATA 的堆起点
pub fn kernel_with(vfs: MockVfs) -> (Kernel, MockFirmware, MockVfs) {
    init();
    let firmware = MockFirmware::new();
    let kernel = Kernel::new(
        INIT_ENTRY,
        STACK_TOP,
        USER_END_DATA,
        Box::new(vfs.clone()),
        Box::new(firmware.clone()),
    )
    .expect("kernel init failed");
    (kernel, firmware, vfs)
}

pub fn kernel() -> (Kernel, MockFirmware, MockVfs) {
    kernel_with(MockVfs::default())
}

/// 当前进程执行一次 ecall，返回调用者看到的 a0
pub fn ecall(kernel: &mut Kernel, id: usize, args: &[usize]) -> isize {
    let caller = kernel.tasks.current();
    let task = kernel.tasks.current_task_mut();
    for (n, arg) in args.iter().enumerate() {
        task.trap_cx.set_a(n, *arg);
    }
    task.trap_cx.x[17] = id;
    task.trap_cx.scause = TrapCause::USER_ENV_CALL;
    kernel.handle_trap();
    kernel
        .tasks
        .get(caller)
        .map_or(0, |task| task.trap_cx.a0() as isize)
}

/// 一次时钟中断
pub fn timer_tick(kernel: &mut Kernel) {
    kernel.tasks.current_task_mut().trap_cx.scause = TrapCause::SUPERVISOR_TIMER;
    kernel.handle_trap();
}

/// handle 对应进程保存的 Trap 上下文
pub fn frame(kernel: &Kernel, handle: TaskHandle) -> TrapContext {
    kernel.tasks.get(handle).map(|task| task.trap_cx).unwrap_or_else(TrapContext::zero)
}
