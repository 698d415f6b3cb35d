use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::spawn_event_loop;
use crate::error::{AppError, AppResult, ProbeError};

/// 浏览器通用启动参数
const BASE_ARGS: [&str; 2] = [
    "--no-sandbox",            // 禁用沙盒，防止容器内权限问题导致的崩溃
    "--disable-dev-shm-usage", // 防止共享内存不足
];

/// 可见模式下自动打开开发者工具，方便查看失败的测试
const DEVTOOLS_ARG: &str = "--auto-open-devtools-for-tabs";

/// 启动一个由本程序管理的浏览器
///
/// # 参数
/// - `executable`: 浏览器可执行文件，`None` 时由 chromiumoxide 自动查找
/// - `headless`: 是否以无头模式运行
pub async fn launch_browser(
    executable: Option<&Path>,
    headless: bool,
) -> AppResult<(Browser, JoinHandle<()>)> {
    info!("🚀 启动浏览器 ({})", if headless { "无头" } else { "可见" });

    let config = build_config(executable, headless).map_err(|e| {
        error!("配置浏览器失败: {}", e);
        AppError::from(ProbeError::ConfigurationFailed { reason: e })
    })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::session_failed(e)
    })?;
    debug!("浏览器启动成功");

    Ok((browser, spawn_event_loop(handler)))
}

fn build_config(executable: Option<&Path>, headless: bool) -> Result<BrowserConfig, String> {
    let mut builder = BrowserConfig::builder().args(BASE_ARGS);

    builder = if headless {
        builder.new_headless_mode().arg("--disable-gpu")
    } else {
        builder.with_head().arg(DEVTOOLS_ARG)
    };

    if let Some(path) = executable {
        debug!("使用浏览器: {}", path.display());
        builder = builder.chrome_executable(path);
    }

    builder.build()
}
