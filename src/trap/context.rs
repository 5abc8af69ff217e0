/// sstatus.SPP: 陷入前所处的特权级，0 表示 U 模式
pub const SSTATUS_SPP: usize = 1 << 8;
/// sstatus.SPIE: sret 之后打开 S 模式中断
pub const SSTATUS_SPIE: usize = 1 << 5;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Trap 上下文，在 Trap 发生时需要保存的内容
///
/// 通用寄存器 x0~x31 全部保存，x0 与 tp 虽然不会变化也预留空间，方便 trap.S 按下标存取。
/// 系统调用时 a7 是调用号，a0~a5 是参数；返回时 a0 被改写为有符号的返回值。
// 1. size = 36 * 8 Bytes -> see trap.S
// 2. 不要改成员顺序; 内存布局 -> trap.S
pub struct TrapContext {
    pub x: [usize; 32],
    pub sstatus: usize,
    pub sepc: usize,
    /// 陷入原因，trap_handler 读出 scause 后填入
    pub scause: usize,
    pub stval: usize,
}

impl TrapContext {
    pub fn zero() -> Self {
        Self {
            x: [0; 32],
            sstatus: 0,
            sepc: 0,
            scause: 0,
            stval: 0,
        }
    }

    pub fn set_sp(&mut self, sp: usize) {
        self.x[2] = sp; // x2 is sp
    }

    pub fn sp(&self) -> usize {
        self.x[2]
    }

    /// 第 n 个参数寄存器 an (x10 + n)
    pub fn a(&self, n: usize) -> usize {
        assert!(n < 8, "a{} is not an argument register", n);
        self.x[10 + n]
    }

    pub fn set_a(&mut self, n: usize, value: usize) {
        assert!(n < 8, "a{} is not an argument register", n);
        self.x[10 + n] = value;
    }

    pub fn a0(&self) -> usize {
        self.x[10]
    }

    /// 写入系统调用返回值
    pub fn set_ret(&mut self, ret: isize) {
        self.x[10] = ret as usize;
    }

    pub fn syscall_id(&self) -> usize {
        self.x[17]
    }

    pub fn syscall_args(&self) -> [usize; 6] {
        [
            self.x[10], self.x[11], self.x[12], self.x[13], self.x[14], self.x[15],
        ]
    }

    /// 构造一个从 entry 开始、以 sp 为栈顶在 U 模式运行的上下文，sret 之后打开中断
    pub fn app_init_context(entry: usize, sp: usize) -> Self {
        let mut cx = Self::zero();
        cx.sstatus = (cx.sstatus & !SSTATUS_SPP) | SSTATUS_SPIE;
        cx.sepc = entry;
        cx.set_sp(sp);
        cx
    }
}
