use super::{InodeHandle, Vfs};
use crate::config::NR_OPEN;
use crate::errno::Errno;

/// 每个进程的文件描述符表，固定 NR_OPEN 个槽位
pub struct FdTable {
    slots: [Option<InodeHandle>; NR_OPEN],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// 按 0..NR_OPEN 的顺序找到第一个空槽位后查找 path；
    /// 查找失败时直接失败，不再尝试后面的槽位
    pub fn open(&mut self, vfs: &dyn Vfs, path: &str) -> Result<usize, Errno> {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::EAGAIN)?;
        let inode = vfs.lookup(path).ok_or(Errno::EAGAIN)?;
        vfs.ref_inode(&inode);
        self.slots[fd] = Some(inode);
        Ok(fd)
    }

    /// 关闭空槽位什么也不做
    pub fn close(&mut self, vfs: &dyn Vfs, fd: usize) -> Result<(), Errno> {
        let slot = self.slots.get_mut(fd).ok_or(Errno::EINVAL)?;
        if let Some(inode) = slot.take() {
            vfs.free_inode(inode);
        }
        Ok(())
    }

    /// 取出已绑定的 inode；fd 越界或槽位为空时返回 EINVAL
    pub fn get(&self, fd: usize) -> Result<&InodeHandle, Errno> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(Errno::EINVAL)
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    pub fn is_bound(&self, fd: usize) -> bool {
        self.get(fd).is_ok()
    }

    /// 进程退出时释放所有句柄
    pub fn close_all(&mut self, vfs: &dyn Vfs) {
        for slot in self.slots.iter_mut() {
            if let Some(inode) = slot.take() {
                vfs.free_inode(inode);
            }
        }
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
