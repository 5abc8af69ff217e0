//! The kernel state reached from every trap: the process table plus the two
//! external collaborators, the file system and the firmware.

use crate::errno::Errno;
use crate::fs::Vfs;
use crate::sbi::{Firmware, ResetReason, ResetType};
use crate::task::{TaskHandle, TaskManager};
use alloc::boxed::Box;

pub struct Kernel {
    pub tasks: TaskManager,
    pub vfs: Box<dyn Vfs>,
    pub firmware: Box<dyn Firmware>,
}

impl Kernel {
    /// 创建只有 init 进程的内核；init 从 entry 开始执行，栈顶为 user_sp
    pub fn new(
        entry: usize,
        user_sp: usize,
        end_data: usize,
        vfs: Box<dyn Vfs>,
        firmware: Box<dyn Firmware>,
    ) -> Result<Self, Errno> {
        Ok(Self {
            tasks: TaskManager::new(entry, user_sp, end_data)?,
            vfs,
            firmware,
        })
    }

    /// 当前进程退出并切换到下一个进程；init 退出时关机
    pub fn exit_current(&mut self, exit_code: i32) {
        if self.tasks.current() == TaskHandle::INIT {
            info!("[kernel] init exited with code {}, shutdown", exit_code);
            self.firmware
                .system_reset(ResetType::Shutdown, ResetReason::NoReason);
            panic!("It should shutdown!");
        }
        if let Err(err) = self.tasks.exit_current_and_run_next(exit_code, &*self.vfs) {
            error!("[kernel] exit failed: {}", err);
        }
    }
}
