//! Implementation of [`MemorySet`], a user address space whose data pages can be
//! shared copy-on-write between processes.

use super::{frame_alloc, FrameTracker};
use super::{PTEFlags, PageTable, PageTableEntry};
use super::{VPNRange, VirtPageNum};
use crate::errno::Errno;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;

/// 用户页面的默认权限
pub const USER_RW: PTEFlags = PTEFlags::from_bits_truncate(
    PTEFlags::R.bits() | PTEFlags::W.bits() | PTEFlags::U.bits(),
);

/// address space of one process
///
/// `data_frames` 中的 [`FrameTracker`] 由 `Arc` 包裹：fork 之后父子进程的同一页面
/// 指向同一个物理页帧，引用计数即共享者个数，最后一个持有者释放时页帧才被回收。
pub struct MemorySet {
    page_table: PageTable,
    data_frames: BTreeMap<VirtPageNum, Arc<FrameTracker>>,
}

impl MemorySet {
    /// 空地址空间，只有一个页表根节点
    pub fn new_bare() -> Option<Self> {
        Some(Self {
            page_table: PageTable::new()?,
            data_frames: BTreeMap::new(),
        })
    }

    pub fn token(&self) -> usize {
        self.page_table.token()
    }

    pub fn translate(&self, vpn: VirtPageNum) -> Option<PageTableEntry> {
        self.page_table.translate(vpn)
    }

    /// 为 vpn 分配一个清零的物理页帧并映射
    pub fn map_zeroed(&mut self, vpn: VirtPageNum, flags: PTEFlags) -> Option<()> {
        let frame = frame_alloc()?;
        self.page_table.map(vpn, frame.ppn, flags)?;
        self.data_frames.insert(vpn, Arc::new(frame));
        Some(())
    }

    /// 取消 range 中所有已映射的页面，页帧随最后一个引用一起回收
    pub fn unmap_range(&mut self, range: VPNRange) {
        for vpn in range {
            if self.data_frames.remove(&vpn).is_some() {
                self.page_table.unmap(vpn);
            }
        }
    }

    /// 进程退出时提前释放所有数据页
    pub fn recycle_data_pages(&mut self) {
        for (vpn, _) in core::mem::take(&mut self.data_frames) {
            self.page_table.unmap(vpn);
        }
    }

    pub fn mapped_pages(&self) -> usize {
        self.data_frames.len()
    }

    /// 以写时复制的方式复制地址空间
    ///
    /// 不复制任何数据页：双方的可写页面都被改成只读并打上 COW 标记，
    /// 子进程的页表指向与父进程相同的物理页帧。
    pub fn fork_cow(&mut self) -> Option<MemorySet> {
        let mut child = MemorySet::new_bare()?;
        for (vpn, frame) in self.data_frames.iter() {
            let pte = self
                .page_table
                .translate(*vpn)
                .expect("data frame without mapping");
            let mut flags = pte.flags() - PTEFlags::V;
            if flags.contains(PTEFlags::W) {
                flags.remove(PTEFlags::W);
                flags.insert(PTEFlags::COW);
                self.page_table.remap(*vpn, frame.ppn, flags);
            }
            child.page_table.map(*vpn, frame.ppn, flags)?;
            child.data_frames.insert(*vpn, Arc::clone(frame));
        }
        Some(child)
    }

    /// 处理对 COW 页面的写：还有其他共享者时复制出私有页帧，
    /// 否则直接恢复写权限。vpn 不是 COW 页面时返回 `Ok(false)`
    pub fn resolve_cow(&mut self, vpn: VirtPageNum) -> Result<bool, Errno> {
        let pte = match self.page_table.translate(vpn) {
            Some(pte) if pte.is_cow() => pte,
            _ => return Ok(false),
        };
        let flags = (pte.flags() - PTEFlags::COW - PTEFlags::V) | PTEFlags::W;
        let frame = self.data_frames.get_mut(&vpn).expect("cow page without frame");
        if Arc::strong_count(frame) == 1 {
            self.page_table.remap(vpn, frame.ppn, flags);
        } else {
            let copy = frame_alloc().ok_or(Errno::ENOMEM)?;
            copy.ppn
                .get_bytes_array()
                .copy_from_slice(frame.ppn.get_bytes_array());
            self.page_table.remap(vpn, copy.ppn, flags);
            *frame = Arc::new(copy);
        }
        Ok(true)
    }
}
