//! Implementation of [`FrameAllocator`] which
//! controls all the frames in the operating system.

use super::{PhysAddr, PhysPageNum};
use alloc::vec::Vec;
use core::fmt::{self, Debug, Formatter};
use lazy_static::*;
use spin::Mutex;

/// manage a frame which has the same lifecycle as the tracker
pub struct FrameTracker {
    pub ppn: PhysPageNum,
}

impl FrameTracker {
    pub fn new(ppn: PhysPageNum) -> Self {
        // 这个物理页帧之前可能被分配过并用做其他用途，先清零
        ppn.get_bytes_array().fill(0);
        Self { ppn }
    }
}

impl Debug for FrameTracker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("FrameTracker:PPN={:#x}", self.ppn.0))
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        frame_dealloc(self.ppn);
    }
}

/// 物理页帧管理器，以物理页号为单位进行物理页帧的分配和回收
trait FrameAllocator {
    fn new() -> Self;
    fn alloc(&mut self) -> Option<PhysPageNum>;
    fn dealloc(&mut self, ppn: PhysPageNum);
}

/// an implementation for frame allocator
pub struct StackFrameAllocator {
    current: usize, // 空闲内存的起始物理页号
    end: usize,     // 空闲内存的结束物理页号
    // [current, end) 从未被分配过，recycled 以后入先出的方式保存回收的物理页号
    recycled: Vec<usize>,
}

impl StackFrameAllocator {
    pub fn init(&mut self, l: PhysPageNum, r: PhysPageNum) {
        self.current = l.0;
        self.end = r.0;
        self.recycled.clear();
    }

    pub fn available(&self) -> usize {
        self.end - self.current + self.recycled.len()
    }
}

impl FrameAllocator for StackFrameAllocator {
    fn new() -> Self {
        Self {
            current: 0,
            end: 0,
            recycled: Vec::new(),
        }
    }

    fn alloc(&mut self) -> Option<PhysPageNum> {
        if let Some(ppn) = self.recycled.pop() {
            Some(ppn.into())
        } else if self.current == self.end {
            None
        } else {
            self.current += 1;
            Some((self.current - 1).into())
        }
    }

    fn dealloc(&mut self, ppn: PhysPageNum) {
        let ppn = ppn.0;
        // 回收的页面必须分配过 (ppn < current) 且没有被回收过
        if ppn >= self.current || self.recycled.iter().any(|v| *v == ppn) {
            panic!("Frame ppn={:#x} has not been allocated", ppn);
        }
        self.recycled.push(ppn);
    }
}

type FrameAllocatorImpl = StackFrameAllocator;

lazy_static! {
    /// frame allocator instance through lazy_static!
    pub static ref FRAME_ALLOCATOR: Mutex<FrameAllocatorImpl> =
        Mutex::new(FrameAllocatorImpl::new());
}

/// hand the physical range [start, end) over to the frame allocator
pub fn init_frame_allocator(start: PhysAddr, end: PhysAddr) {
    FRAME_ALLOCATOR.lock().init(start.ceil(), end.floor());
}

/// allocate a frame
pub fn frame_alloc() -> Option<FrameTracker> {
    FRAME_ALLOCATOR.lock().alloc().map(FrameTracker::new)
}

/// deallocate a frame
fn frame_dealloc(ppn: PhysPageNum) {
    FRAME_ALLOCATOR.lock().dealloc(ppn);
}

/// number of frames that can still be handed out
pub fn frames_available() -> usize {
    FRAME_ALLOCATOR.lock().available()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_frame_is_zeroed_and_recycled() {
        testutil::init();
        let frame = frame_alloc().expect("out of frames");
        assert!(frame.ppn.get_bytes_array().iter().all(|b| *b == 0));
        frame.ppn.get_bytes_array()[0] = 0xaa;
        drop(frame);
        let frame = frame_alloc().expect("out of frames");
        assert_eq!(frame.ppn.get_bytes_array()[0], 0);
    }

    #[test]
    #[should_panic]
    fn test_dealloc_unallocated_panics() {
        let mut allocator = StackFrameAllocator::new();
        allocator.init(PhysPageNum(10), PhysPageNum(20));
        allocator.dealloc(PhysPageNum(15));
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = StackFrameAllocator::new();
        allocator.init(PhysPageNum(10), PhysPageNum(12));
        assert_eq!(allocator.alloc(), Some(PhysPageNum(10)));
        assert_eq!(allocator.alloc(), Some(PhysPageNum(11)));
        assert_eq!(allocator.alloc(), None);
        allocator.dealloc(PhysPageNum(10));
        assert_eq!(allocator.available(), 1);
        assert_eq!(allocator.alloc(), Some(PhysPageNum(10)));
    }
}
