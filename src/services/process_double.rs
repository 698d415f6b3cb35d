//! 子进程形式的测试替身 - 业务能力层
//!
//! 负责构建、启动和停止替身进程，不关心浏览器

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, LaunchError};
use crate::infrastructure::process::{remove_pid_file, signal_terminate, write_pid_file};
use crate::infrastructure::OutputSink;
use crate::models::ServerIdentity;
use crate::traits::ServerHandle;

/// 每个停止阶段等待进程退出的时间
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// 替身监听的地址参数
pub fn urls_arg(port: u16) -> String {
    format!("--urls=http://*:{}", port)
}

/// 执行 `<program> build <project>`，输出追加到 `sink`
pub async fn build_project(program: &str, project: &Path, sink: &OutputSink) -> AppResult<()> {
    info!("🔨 构建替身项目: {}", project.display());

    let output = Command::new(program)
        .arg("build")
        .arg(project)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| LaunchError::BuildFailed {
            project: project.display().to_string(),
            reason: format!("无法执行 {}: {}", program, e),
        })?;

    sink.append(&String::from_utf8_lossy(&output.stdout))?;
    sink.append(&String::from_utf8_lossy(&output.stderr))?;

    if !output.status.success() {
        return Err(LaunchError::BuildFailed {
            project: project.display().to_string(),
            reason: match output.status.code() {
                Some(code) => format!("退出码 {}，详见 {}", code, sink.path().display()),
                None => format!("被信号终止，详见 {}", sink.path().display()),
            },
        }
        .into());
    }

    info!("✓ 构建完成");
    Ok(())
}

/// 以子进程方式运行的测试替身
///
/// 停止顺序：stdin 写入换行 → 宽限期 → SIGTERM → 宽限期 → 强制结束
pub struct ProcessDouble {
    child: Option<Child>,
    pid: u32,
    sink: PathBuf,
    pid_file: PathBuf,
    grace: Duration,
}

impl ProcessDouble {
    /// 启动替身进程
    ///
    /// 进程在独立的进程组中运行，stdout / stderr 重定向到 `sink`
    pub fn spawn<I, S>(program: &OsStr, args: I, sink: &OutputSink, pid_file: &Path) -> AppResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (stdout, stderr) = sink.stdio()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| AppError::spawn_failed(program.to_string_lossy(), e))?;
        let pid = child.id().unwrap_or_default();

        if let Err(e) = write_pid_file(pid_file, pid) {
            warn!("写入 PID 文件 {} 失败: {}", pid_file.display(), e);
        }
        info!("✓ 替身进程已启动 (PID: {})", pid);

        Ok(Self {
            child: Some(child),
            pid,
            sink: sink.path().to_path_buf(),
            pid_file: pid_file.to_path_buf(),
            grace: DEFAULT_GRACE_PERIOD,
        })
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    async fn stop(&self, child: &mut Child) -> AppResult<()> {
        if let Ok(Some(status)) = child.try_wait() {
            debug!("替身进程已自行退出: {}", status);
            return Ok(());
        }

        if let Some(mut stdin) = child.stdin.take() {
            debug!("向替身 stdin 写入换行，请求其退出");
            if let Err(e) = stdin.write_all(b"\n").await {
                debug!("写入 stdin 失败: {}", e);
            }
            let _ = stdin.flush().await;
        }
        if exited_within(child, self.grace).await {
            info!("✓ 替身进程已正常退出");
            return Ok(());
        }

        match signal_terminate(self.pid) {
            Ok(()) => {
                if exited_within(child, self.grace).await {
                    info!("✓ 替身进程已在 SIGTERM 后退出");
                    return Ok(());
                }
            }
            Err(e) => debug!("发送 SIGTERM 失败: {}", e),
        }

        warn!("⚠️ 替身进程未响应，强制结束 (PID: {})", self.pid);
        child
            .kill()
            .await
            .map_err(|e| AppError::stop_failed(self.identity(), e))
    }
}

#[async_trait]
impl ServerHandle for ProcessDouble {
    fn identity(&self) -> ServerIdentity {
        ServerIdentity::Process { pid: self.pid }
    }

    fn sink(&self) -> PathBuf {
        self.sink.clone()
    }

    async fn terminate(&mut self) -> AppResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let result = self.stop(&mut child).await;
        remove_pid_file(&self.pid_file);
        result
    }
}

async fn exited_within(child: &mut Child, grace: Duration) -> bool {
    matches!(timeout(grace, child.wait()).await, Ok(Ok(_)))
}
