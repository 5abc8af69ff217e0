//! File system interface consumed by the kernel.
//!
//! The VFS itself lives outside the process subsystem. The kernel sees it only
//! through [`Vfs`]: path lookup, explicit reference counting on inodes, stat and
//! a synchronous block request. Per-process descriptors are kept in an [`FdTable`].

mod fd;

pub use fd::FdTable;

/// 一个 inode 的句柄
///
/// 句柄不能被复制：一个句柄只能绑定在一个 fd 槽位上，
/// 释放时必须交还给 [`Vfs::free_inode`]。
#[derive(Debug, PartialEq, Eq)]
pub struct InodeHandle(usize);

impl InodeHandle {
    pub fn new(ino: usize) -> Self {
        Self(ino)
    }

    pub fn ino(&self) -> usize {
        self.0
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// 由 `stat` 系统调用拷贝到用户缓冲区的文件信息
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
}

impl Stat {
    pub fn as_bytes(&self) -> &[u8] {
        let size = core::mem::size_of::<Self>();
        unsafe { core::slice::from_raw_parts(self as *const _ as usize as *const u8, size) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
/// 请求方向，与块设备请求的标志位一致
pub enum RequestDir {
    Write = 0,
    Read = 1,
}

/// VFS collaborator surface
pub trait Vfs {
    /// 按路径查找 inode
    fn lookup(&self, path: &str) -> Option<InodeHandle>;
    /// 内核持有句柄时增加引用计数
    fn ref_inode(&self, inode: &InodeHandle);
    /// 交还句柄并减少引用计数
    fn free_inode(&self, inode: InodeHandle);
    fn stat(&self, inode: &InodeHandle) -> Stat;
    /// 发起一次请求并等待完成，buf 的长度即请求长度
    fn request(
        &self,
        inode: &InodeHandle,
        buf: &mut [u8],
        offset: usize,
        dir: RequestDir,
    ) -> Result<(), crate::errno::Errno>;
}

/// 没有挂载任何文件系统时使用：所有查找都失败
pub struct EmptyVfs;

impl Vfs for EmptyVfs {
    fn lookup(&self, _path: &str) -> Option<InodeHandle> {
        None
    }

    fn ref_inode(&self, _inode: &InodeHandle) {}

    fn free_inode(&self, _inode: InodeHandle) {}

    fn stat(&self, inode: &InodeHandle) -> Stat {
        Stat {
            ino: inode.ino() as u64,
            ..Stat::default()
        }
    }

    fn request(
        &self,
        _inode: &InodeHandle,
        _buf: &mut [u8],
        _offset: usize,
        _dir: RequestDir,
    ) -> Result<(), crate::errno::Errno> {
        Err(crate::errno::Errno::EIO)
    }
}
