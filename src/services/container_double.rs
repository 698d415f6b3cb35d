//! 容器形式的测试替身 - 业务能力层
//!
//! 通过容器运行时命令行（docker / podman）启动和停止替身

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ContainerSpec;
use crate::error::{AppError, AppResult, LaunchError};
use crate::infrastructure::OutputSink;
use crate::models::ServerIdentity;
use crate::traits::ServerHandle;

/// 替身在容器内写入录制结果的目录
pub const RECORDING_MOUNT: &str = "/Servirtium/test_recording_output";

/// 日志跟随进程在容器停止后自行退出的等待时间
const FOLLOWER_EXIT_WAIT: Duration = Duration::from_secs(5);

/// `run` 子命令的参数
///
/// 以分离模式运行，端口一一映射，退出后自动删除
pub fn run_args(spec: &ContainerSpec, port: u16, double_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--rm".to_string(),
        "-p".to_string(),
        format!("{}:{}", port, port),
        "--volume".to_string(),
        format!("{}:{}", spec.volume, RECORDING_MOUNT),
        "--name".to_string(),
        spec.name.clone(),
        spec.image.clone(),
    ];
    args.extend(double_args.iter().cloned());
    args
}

/// 以容器方式运行的测试替身
pub struct ContainerDouble {
    spec: ContainerSpec,
    sink: PathBuf,
    follower: Option<Child>,
    running: bool,
}

impl ContainerDouble {
    /// 启动容器并跟随其日志
    pub async fn launch(
        spec: &ContainerSpec,
        port: u16,
        double_args: &[String],
        sink: &OutputSink,
    ) -> AppResult<Self> {
        info!("🐳 启动替身容器: {} ({})", spec.name, spec.image);

        // 上次异常退出可能留下同名容器
        match runtime_output(&spec.runtime, &["rm", "-f", &spec.name]).await {
            Ok(output) if output.status.success() => debug!("已清理同名容器 {}", spec.name),
            Ok(_) => debug!("没有需要清理的同名容器"),
            Err(e) => debug!("清理同名容器失败: {}", e),
        }

        run_checked(&spec.runtime, &["volume", "create", &spec.volume]).await?;

        let args = run_args(spec, port, double_args);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = match run_checked(&spec.runtime, &args).await {
            Ok(output) => output,
            Err(e) => {
                // 容器可能已创建但没能启动
                let _ = Self::discard(spec).await;
                return Err(e);
            }
        };
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("容器 ID: {}", container_id);
        info!("✓ 替身容器已启动: {}", spec.name);

        Ok(Self {
            spec: spec.clone(),
            sink: sink.path().to_path_buf(),
            follower: follow_logs(spec, sink),
            running: true,
        })
    }

    /// 强制删除同名容器，容器不存在时也算成功
    pub async fn discard(spec: &ContainerSpec) -> AppResult<()> {
        let output = runtime_output(&spec.runtime, &["rm", "-f", &spec.name]).await?;
        if output.status.success() {
            debug!("已删除容器 {}", spec.name);
        } else {
            debug!(
                "删除容器 {}: {}",
                spec.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ServerHandle for ContainerDouble {
    fn identity(&self) -> ServerIdentity {
        ServerIdentity::Container {
            name: self.spec.name.clone(),
        }
    }

    fn sink(&self) -> PathBuf {
        self.sink.clone()
    }

    async fn terminate(&mut self) -> AppResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        info!("🛑 停止替身容器: {}", self.spec.name);
        let result = run_checked(&self.spec.runtime, &["stop", &self.spec.name])
            .await
            .map(|_| ())
            .map_err(|e| AppError::stop_failed(self.identity(), e));

        if let Some(mut follower) = self.follower.take() {
            if timeout(FOLLOWER_EXIT_WAIT, follower.wait()).await.is_err() {
                debug!("日志跟随进程未退出，强制结束");
                let _ = follower.kill().await;
            }
        }

        result
    }
}

/// 把容器日志持续写入输出文件；失败不影响运行
fn follow_logs(spec: &ContainerSpec, sink: &OutputSink) -> Option<Child> {
    let (stdout, stderr) = match sink.stdio() {
        Ok(stdio) => stdio,
        Err(e) => {
            warn!("⚠️ 无法跟随容器日志: {}", e);
            return None;
        }
    };

    match Command::new(&spec.runtime)
        .args(["logs", "-f", &spec.name])
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => Some(child),
        Err(e) => {
            warn!("⚠️ 无法跟随容器日志: {}", e);
            None
        }
    }
}

/// 执行容器命令；调用方被取消时命令随之结束
async fn runtime_output(runtime: &str, args: &[&str]) -> AppResult<Output> {
    debug!("执行: {} {}", runtime, args.join(" "));
    Command::new(runtime)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AppError::spawn_failed(runtime, e))
}

/// 执行容器命令，非零退出码视为失败
async fn run_checked(runtime: &str, args: &[&str]) -> AppResult<Output> {
    let output = runtime_output(runtime, args).await?;
    if !output.status.success() {
        return Err(LaunchError::ContainerCommandFailed {
            command: format!("{} {}", runtime, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(output)
}
