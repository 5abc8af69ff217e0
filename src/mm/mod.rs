//! Memory management implementation
//!
//! SV39 page tables, a stack-style frame allocator and the per-process
//! [`MemorySet`]. Every process owns one memory set; `fork` shares its data
//! frames copy-on-write and the page-fault path splits them on first write.

mod address;
mod frame_allocator;
mod memory_set;
mod page_table;

pub use address::{PhysAddr, PhysPageNum, VPNRange, VirtAddr, VirtPageNum};
pub use frame_allocator::{frame_alloc, frames_available, init_frame_allocator, FrameTracker};
pub use memory_set::{MemorySet, USER_RW};
pub use page_table::{PTEFlags, PageTable, PageTableEntry};
