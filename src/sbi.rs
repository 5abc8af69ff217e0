//! Firmware (SBI) services consumed by the kernel.
//!
//! The kernel only talks to the supervisor execution environment through the
//! [`Firmware`] trait; [`SbiFirmware`] is the board implementation that issues
//! the `ecall`s. Register convention: extension id in a7, function id in a6,
//! arguments in a0/a1, `(error, value)` back in `(a0, a1)`.

pub const SBI_SET_TIMER: usize = 0;
pub const SBI_CONSOLE_PUTCHAR: usize = 1;
pub const SBI_CONSOLE_GETCHAR: usize = 2;
pub const BASE_EXTENSION: usize = 0x10;
pub const RESET_EXTENSION: usize = 0x5253_5354; // "SRST"

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// SBI 调用的返回值
pub struct SbiRet {
    pub error: isize,
    pub value: usize,
}

impl SbiRet {
    pub fn ok(value: usize) -> Self {
        Self { error: 0, value }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ResetType {
    Shutdown = 0,
    ColdReboot = 1,
    WarmReboot = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ResetReason {
    NoReason = 0,
    SystemFailure = 1,
}

/// 内核所依赖的固件服务
pub trait Firmware {
    /// 设置下一次时钟中断触发的 mtime 值
    fn set_timer(&self, stime_value: usize);
    fn console_putchar(&self, ch: usize);
    /// 没有字符可读时返回 None
    fn console_getchar(&self) -> Option<u8>;
    /// 当前的 mtime 计数值
    fn read_time(&self) -> usize;
    fn spec_version(&self) -> SbiRet;
    fn impl_id(&self) -> SbiRet;
    fn impl_version(&self) -> SbiRet;
    fn mvendorid(&self) -> SbiRet;
    fn probe_extension(&self, extension_id: usize) -> SbiRet;
    /// 成功时不会返回
    fn system_reset(&self, reset_type: ResetType, reason: ResetReason) -> SbiRet;
}

/// 通过 base 扩展查询到的固件信息
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlatformInfo {
    /// (major, minor)
    pub spec_version: (usize, usize),
    pub impl_id: usize,
    pub impl_version: usize,
    pub mvendorid: usize,
    /// 是否支持 SRST 复位扩展
    pub has_reset: bool,
}

/// 查询固件信息；spec_version 的 [30:24] 位是主版本号，[23:0] 位是次版本号
pub fn platform_info(firmware: &dyn Firmware) -> PlatformInfo {
    let spec = firmware.spec_version().value;
    PlatformInfo {
        spec_version: ((spec >> 24) & 0x7f, spec & 0xff_ffff),
        impl_id: firmware.impl_id().value,
        impl_version: firmware.impl_version().value,
        mvendorid: firmware.mvendorid().value,
        has_reset: firmware.probe_extension(RESET_EXTENSION).value != 0,
    }
}

#[cfg(target_arch = "riscv64")]
pub use board::SbiFirmware;

#[cfg(target_arch = "riscv64")]
mod board {
    use super::*;

    const BASE_GET_SPEC_VERSION: usize = 0;
    const BASE_GET_IMPL_ID: usize = 1;
    const BASE_GET_IMPL_VERSION: usize = 2;
    const BASE_PROBE_EXTENSION: usize = 3;
    const BASE_GET_MVENDORID: usize = 4;

    /// which 是扩展号 (a7)，fid 是功能号 (a6)
    #[inline(always)]
    fn sbi_call(which: usize, fid: usize, arg0: usize, arg1: usize) -> SbiRet {
        let (error, value);
        unsafe {
            core::arch::asm!(
                "ecall",
                inlateout("x10") arg0 => error,
                inlateout("x11") arg1 => value,
                in("x16") fid,
                in("x17") which,
            );
        }
        SbiRet { error, value }
    }

    /// 通过 ecall 请求 RustSBI / OpenSBI 的服务
    pub struct SbiFirmware;

    impl Firmware for SbiFirmware {
        fn set_timer(&self, stime_value: usize) {
            sbi_call(SBI_SET_TIMER, 0, stime_value, 0);
        }

        fn console_putchar(&self, ch: usize) {
            sbi_call(SBI_CONSOLE_PUTCHAR, 0, ch, 0);
        }

        fn console_getchar(&self) -> Option<u8> {
            // legacy getchar 没有字符时返回 -1
            let ret = sbi_call(SBI_CONSOLE_GETCHAR, 0, 0, 0).error;
            u8::try_from(ret).ok()
        }

        fn read_time(&self) -> usize {
            riscv::register::time::read()
        }

        fn spec_version(&self) -> SbiRet {
            sbi_call(BASE_EXTENSION, BASE_GET_SPEC_VERSION, 0, 0)
        }

        fn impl_id(&self) -> SbiRet {
            sbi_call(BASE_EXTENSION, BASE_GET_IMPL_ID, 0, 0)
        }

        fn impl_version(&self) -> SbiRet {
            sbi_call(BASE_EXTENSION, BASE_GET_IMPL_VERSION, 0, 0)
        }

        fn mvendorid(&self) -> SbiRet {
            sbi_call(BASE_EXTENSION, BASE_GET_MVENDORID, 0, 0)
        }

        fn probe_extension(&self, extension_id: usize) -> SbiRet {
            sbi_call(BASE_EXTENSION, BASE_PROBE_EXTENSION, extension_id, 0)
        }

        fn system_reset(&self, reset_type: ResetType, reason: ResetReason) -> SbiRet {
            sbi_call(RESET_EXTENSION, 0, reset_type as usize, reason as usize)
        }
    }

    pub fn console_putchar(ch: usize) {
        SbiFirmware.console_putchar(ch);
    }

    pub fn shutdown() -> ! {
        SbiFirmware.system_reset(ResetType::Shutdown, ResetReason::NoReason);
        panic!("It should shutdown!");
    }
}

#[cfg(target_arch = "riscv64")]
pub use board::{console_putchar, shutdown};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockFirmware;

    #[test]
    fn test_platform_info() {
        let info = platform_info(&MockFirmware::new());
        assert_eq!(info.spec_version, (1, 0));
        assert_eq!(info.impl_id, 0);
        assert!(info.has_reset);
    }
}
