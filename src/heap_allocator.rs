use buddy_system_allocator::LockedHeap;
use os6::config::KERNEL_HEAP_SIZE;

#[global_allocator]
/// The global allocator.
static HEAP_ALLOCATOR: LockedHeap = LockedHeap::empty();

// 这块内存是一个 static mut 且被零初始化的字节数组，位于内核的 .bss 段中
static mut HEAP_SPACE: [u8; KERNEL_HEAP_SIZE] = [0; KERNEL_HEAP_SIZE];

/// 在使用任何 alloc 中提供的堆数据结构之前，需要先给全局分配器一块内存用于分配
pub fn init() {
    unsafe {
        HEAP_ALLOCATOR
            .lock()
            .init(core::ptr::addr_of!(HEAP_SPACE) as usize, KERNEL_HEAP_SIZE);
    }
}
