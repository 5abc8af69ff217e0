//! Console and machine-level syscalls served by the firmware.

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::sbi::{ResetReason, ResetType};
use crate::trap::TrapContext;

/// char(c)：c 为 0 时读一个字符，没有输入时返回 -EAGAIN；否则输出字符 c
pub fn sys_char(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    match cx.a0() {
        0 => kernel
            .firmware
            .console_getchar()
            .map_or(Errno::EAGAIN.as_ret(), |ch| ch as isize),
        ch => {
            kernel.firmware.console_putchar(ch);
            0
        }
    }
}

/// reset(type)：0 关机，1 冷重启，2 热重启
///
/// 成功时不会返回；固件返回了就说明复位失败。
pub fn sys_reset(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let reset_type = match cx.a0() {
        0 => ResetType::Shutdown,
        1 => ResetType::ColdReboot,
        2 => ResetType::WarmReboot,
        _ => return Errno::EINVAL.as_ret(),
    };
    let ret = kernel
        .firmware
        .system_reset(reset_type, ResetReason::NoReason);
    warn!("[kernel] system reset {:?} returned error {}", reset_type, ret.error);
    Errno::EIO.as_ret()
}
