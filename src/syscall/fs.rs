//! File and filesystem-related syscalls

use crate::config::PAGE_SIZE;
use crate::errno::{into_ret, Errno};
use crate::fs::RequestDir;
use crate::kernel::Kernel;
use crate::trap::TrapContext;
use alloc::vec;

/// open(path)：返回绑定到的 fd
///
/// 没有空槽位或者路径查找失败时返回 -EAGAIN。
pub fn sys_open(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let Kernel { tasks, vfs, .. } = kernel;
    let task = tasks.current_task_mut();
    if !task.fd_table.has_free_slot() {
        return Errno::EAGAIN.as_ret();
    }
    let result = task
        .translated_str(cx.a0())
        .and_then(|path| task.fd_table.open(&**vfs, &path));
    into_ret(result.map(|fd| fd as isize))
}

/// close(fd)：fd 越界时返回 -EINVAL，关闭空槽位什么也不做
pub fn sys_close(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let Kernel { tasks, vfs, .. } = kernel;
    let task = tasks.current_task_mut();
    into_ret(task.fd_table.close(&**vfs, cx.a0()).map(|_| 0))
}

/// stat(fd, buf)：把 fd 对应文件的 [`Stat`](crate::fs::Stat) 拷贝到 buf
pub fn sys_stat(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let Kernel { tasks, vfs, .. } = kernel;
    let task = tasks.current_task_mut();
    let stat = match task.fd_table.get(cx.a0()) {
        Ok(inode) => vfs.stat(inode),
        Err(err) => return err.as_ret(),
    };
    into_ret(task.copy_to_user(cx.a(1), stat.as_bytes()).map(|_| 0))
}

/// read(fd, buf, len)：从文件开头读 len 个字节到 buf
///
/// 先检查 fd 和整个用户缓冲区，再按页大小分块发起请求，内核缓冲区最多一页。
pub fn sys_read(kernel: &mut Kernel, cx: &TrapContext) -> isize {
    let Kernel { tasks, vfs, .. } = kernel;
    let task = tasks.current_task_mut();
    let (fd, buf, len) = (cx.a0(), cx.a(1), cx.a(2));
    if let Err(err) = task.fd_table.get(fd) {
        return err.as_ret();
    }
    if let Err(err) = task.check_user_range(buf, len) {
        return err.as_ret();
    }
    let mut chunk = vec![0u8; len.min(PAGE_SIZE)];
    let mut done = 0;
    while done < len {
        let n = (len - done).min(PAGE_SIZE);
        let result = task
            .fd_table
            .get(fd)
            .and_then(|inode| vfs.request(inode, &mut chunk[..n], done, RequestDir::Read));
        if let Err(err) = result {
            warn!("[kernel] read request failed: {}", err);
            return Errno::EIO.as_ret();
        }
        if let Err(err) = task.copy_to_user(buf + done, &chunk[..n]) {
            return err.as_ret();
        }
        done += n;
    }
    0
}
