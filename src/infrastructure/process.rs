//! 进程与端口工具 - 基础设施层
//!
//! 只暴露"查询 / 发信号 / 清理残留"的能力，不关心替身的启动流程

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 残留进程收到 SIGTERM 后最多等待的时间
const STALE_EXIT_WAIT: Duration = Duration::from_secs(5);
const STALE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 判断 `pid` 对应的进程是否仍在运行
pub fn pid_is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        pid == std::process::id()
    }
}

/// 端口能否在本机绑定
pub fn port_available(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// 向进程组发送 SIGTERM；进程不是组长时退回到单个进程
///
/// 非 Unix 平台上不支持，返回错误，由调用方改用强制结束
pub fn signal_terminate(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);
        if killpg(target, Signal::SIGTERM).is_ok() {
            debug!("已向进程组 {} 发送 SIGTERM", pid);
            return Ok(());
        }
        kill(target, Signal::SIGTERM)?;
        debug!("已向进程 {} 发送 SIGTERM", pid);
        Ok(())
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("当前平台不支持向进程 {} 发送 SIGTERM", pid)
    }
}

/// 写入 PID 文件
pub fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", pid))?;
    Ok(())
}

/// 删除 PID 文件，文件不存在时忽略
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("已删除 PID 文件: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("删除 PID 文件 {} 失败: {}", path.display(), e),
    }
}

/// 清理上一次异常退出留下的替身进程
///
/// # 返回
/// 被清理的 PID（如果有）
pub async fn reap_stale_pid_file(path: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(path).ok()?;
    remove_pid_file(path);

    let pid: u32 = content.trim().parse().ok()?;
    if pid == std::process::id() || !pid_is_alive(pid) {
        debug!("PID 文件中的进程 {} 已不存在", pid);
        return None;
    }

    warn!("⚠️ 发现残留的替身进程 (PID: {})，正在结束", pid);
    if let Err(e) = signal_terminate(pid) {
        warn!("结束残留进程 {} 失败: {}", pid, e);
        return None;
    }

    let deadline = tokio::time::Instant::now() + STALE_EXIT_WAIT;
    while pid_is_alive(pid) && tokio::time::Instant::now() < deadline {
        sleep(STALE_POLL_INTERVAL).await;
    }
    info!("🧹 残留进程 {} 已处理", pid);

    Some(pid)
}
