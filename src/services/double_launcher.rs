//! 测试替身启动器 - 业务能力层
//!
//! 按启动策略选择子进程或容器，并在启动前完成检查与清理

use std::ffi::{OsStr, OsString};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::backend_check::BackendCheck;
use super::container_double::ContainerDouble;
use super::process_double::{build_project, urls_arg, ProcessDouble};
use crate::config::{LaunchStrategy, RunConfiguration};
use crate::error::AppResult;
use crate::infrastructure::process::{port_available, reap_stale_pid_file};
use crate::infrastructure::OutputSink;
use crate::models::Mode;
use crate::traits::{ServerHandle, ServerLauncher};

/// 真实的替身启动器
#[derive(Debug, Clone, Default)]
pub struct DoubleLauncher {
    backend_check: BackendCheck,
}

impl DoubleLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend_check(backend_check: BackendCheck) -> Self {
        Self { backend_check }
    }

    /// 清理残留进程并检查端口
    async fn prepare_port(&self, config: &RunConfiguration) {
        if let Some(pid) = reap_stale_pid_file(&config.pid_file()).await {
            debug!("已清理残留替身 PID {}", pid);
        }
        if !port_available(config.port) {
            warn!("⚠️ 端口 {} 已被占用，替身可能无法监听", config.port);
        }
    }
}

#[async_trait]
impl ServerLauncher for DoubleLauncher {
    async fn launch(&self, config: &RunConfiguration) -> AppResult<Box<dyn ServerHandle>> {
        if config.mode == Mode::Record {
            self.backend_check
                .ensure_reachable(&config.backend_for_double())
                .await?;
        }

        let sink = OutputSink::create(
            &config.sink_path(),
            &format!("Servirtium {} 替身输出", config.mode),
        )?;
        info!("📝 替身输出写入: {}", sink.path().display());

        let mut args: Vec<OsString> = config.double_args().into_iter().map(OsString::from).collect();

        let handle: Box<dyn ServerHandle> = match &config.launch {
            LaunchStrategy::Project { program, project } => {
                self.prepare_port(config).await;
                build_project(program, project, &sink).await?;

                let mut run_args: Vec<OsString> = vec![
                    "run".into(),
                    "--no-build".into(),
                    "--project".into(),
                    project.as_os_str().to_os_string(),
                    "--".into(),
                ];
                run_args.append(&mut args);
                run_args.push(urls_arg(config.port).into());

                Box::new(ProcessDouble::spawn(
                    OsStr::new(program),
                    run_args,
                    &sink,
                    &config.pid_file(),
                )?)
            }
            LaunchStrategy::Executable { path } => {
                self.prepare_port(config).await;
                args.push(urls_arg(config.port).into());

                Box::new(ProcessDouble::spawn(
                    path.as_os_str(),
                    args,
                    &sink,
                    &config.pid_file(),
                )?)
            }
            LaunchStrategy::Container(spec) => Box::new(
                ContainerDouble::launch(spec, config.port, &config.double_args(), &sink).await?,
            ),
        };

        Ok(handle)
    }

    async fn abandon(&self, config: &RunConfiguration) -> AppResult<()> {
        match &config.launch {
            LaunchStrategy::Container(spec) => {
                info!("🧹 删除未完成启动的替身容器: {}", spec.name);
                ContainerDouble::discard(spec).await
            }
            // 构建和替身子进程都随句柄丢弃而结束，只剩 PID 文件需要处理
            LaunchStrategy::Project { .. } | LaunchStrategy::Executable { .. } => {
                if let Some(pid) = reap_stale_pid_file(&config.pid_file()).await {
                    debug!("已清理未完成启动的替身 PID {}", pid);
                }
                Ok(())
            }
        }
    }
}
