//! The os6 kernel image for qemu virt
//!
//! [`rust_main()`] is the entry after `entry.asm` sets up the boot stack. It
//! brings up logging, the kernel heap and the frame allocator, installs the
//! trap vector, arms the first timer interrupt and drops into `init`.

#![no_std]
#![no_main]

#[macro_use]
mod console;

#[macro_use]
extern crate log;

mod heap_allocator;
mod lang_items;
mod logging;

use os6::config::MEMORY_END;
use os6::mm::{frames_available, init_frame_allocator, PhysAddr};
use os6::sbi::{platform_info, SbiFirmware};

core::arch::global_asm!(include_str!("entry.asm"));

fn clear_bss() {
    extern "C" {
        fn sbss();
        fn ebss();
    }
    // 找到全局符号 sbss 和 ebss ，它们由链接脚本 linker.ld 给出，需要被清零
    unsafe {
        core::slice::from_raw_parts_mut(sbss as usize as *mut u8, ebss as usize - sbss as usize)
            .fill(0);
    }
}

// 链接的时候 entry.asm 寻找符号 rust_main
#[no_mangle]
fn rust_main() -> ! {
    extern "C" {
        fn ekernel();
    }
    clear_bss();
    logging::init();
    println!("[kernel] Hello, os6");
    let platform = platform_info(&SbiFirmware);
    info!(
        "[kernel] SBI v{}.{}, impl id {:#x} version {:#x}, mvendorid {:#x}",
        platform.spec_version.0,
        platform.spec_version.1,
        platform.impl_id,
        platform.impl_version,
        platform.mvendorid
    );
    if !platform.has_reset {
        warn!("[kernel] SBI reset extension not available, shutdown may hang");
    }

    heap_allocator::init();
    // 内核结束处到 MEMORY_END 之间的物理内存交给页帧分配器
    init_frame_allocator(PhysAddr::from(ekernel as usize), PhysAddr::from(MEMORY_END));
    info!("[kernel] {} frames available", frames_available());

    os6::board::init();
    // 为了避免 S 特权级时钟中断被屏蔽，需要在内核态下开启时钟中断
    os6::board::enable_timer_interrupt();
    // 设置第一个 10ms 的计时器
    os6::timer::set_next_trigger(&SbiFirmware);

    os6::board::run_first_task();
}
