//! Constants used in os6

/// 进程表容量；系统调用号的合法区间 (0, NR_TASKS) 也沿用这个常数
pub const NR_TASKS: usize = 64;
/// 每个进程的文件描述符个数
pub const NR_OPEN: usize = 4;

pub const KERNEL_STACK_SIZE: usize = 4096 * 2;
pub const KERNEL_HEAP_SIZE: usize = 0x30_0000;

pub const PAGE_SIZE: usize = 1 << 12;
pub const PAGE_SIZE_BITS: usize = 0xc;

/// 用户栈大小，即 `stack_size`
pub const USER_STACK_SIZE: usize = PAGE_SIZE * 2;
/// 用户栈顶，栈区间为 [STACK_TOP - USER_STACK_SIZE, STACK_TOP)
pub const STACK_TOP: usize = 0x4000_0000;
/// init 进程数据段结束的位置，即它的 `end_data`
pub const USER_END_DATA: usize = 0x1000_0000;

pub const MAX_PATH_LEN: usize = 256;
pub const MAX_SIG: usize = 31;

/// 常数 CLOCK_FREQ 是 time 寄存器自增的频率，单位为赫兹
pub const CLOCK_FREQ: usize = 0x989680; // 10MHz; see dump.dts -> cpus: timebase-frequency
pub const TICKS_PER_SEC: usize = 100; // 10ms 时间片

pub const MEMORY_END: usize = 0x80800000;
