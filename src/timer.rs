use crate::config::{CLOCK_FREQ, TICKS_PER_SEC};
use crate::sbi::Firmware;

const MICRO_PER_SEC: usize = 1_000_000;

/// current time in microsecond
pub fn get_time_us(firmware: &dyn Firmware) -> usize {
    firmware.read_time() / (CLOCK_FREQ / MICRO_PER_SEC)
}

/// set the next timer interrupt:
/// CLOCK_FREQ / TICKS_PER_SEC 是 10ms 内 mtime 的增量，
/// 将 mtimecmp 设置为当前值加上这个增量，10ms 之后就会触发 S 特权级时钟中断
pub fn set_next_trigger(firmware: &dyn Firmware) {
    firmware.set_timer(firmware.read_time() + CLOCK_FREQ / TICKS_PER_SEC);
}
