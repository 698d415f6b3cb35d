//! 日志工具模块
//!
//! 提供日志初始化和运行信息输出的辅助函数。
//! 日志写到 stderr，stdout 只留给运行结果。

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{BrowserTarget, RunConfiguration};
use crate::models::RunReport;

/// 初始化 tracing
///
/// `RUST_LOG` 优先；未设置时 `verbose` 决定本 crate 的级别
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "compat_suite={level},chromiumoxide=warn,reqwest=warn"
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &RunConfiguration) {
    info!("{}", "=".repeat(60));
    info!("🚀 兼容性测试启动 - {} 模式", config.mode);
    info!(
        "🌐 测试页面: {} (模板 {})",
        config.target_url,
        config.page_template().as_str()
    );
    if let Some(backend) = &config.backend_address {
        info!("🔗 后端: {}", backend);
    }
    if config.mode.requires_double() {
        info!("🧪 替身: {}，端口 {}", config.launch.label(), config.port);
    }
    info!("🖥️ 浏览器: {}", describe_browser(&config.browser));
    info!("⏱️ 超时: {} 秒", config.timeout.as_secs());
    info!("{}", "=".repeat(60));
}

/// 打印最终结果
pub fn print_final_summary(report: &RunReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 运行结束: {}", report.outcome);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📝 {}", report.summary);
    info!("⏱️ 耗时: {}", format_elapsed(report.elapsed));
    if let Some(sink) = &report.sink {
        info!("替身输出已保存至: {}", sink.display());
    }
    info!("{}", "=".repeat(60));
}

fn describe_browser(target: &BrowserTarget) -> String {
    match target {
        BrowserTarget::Launch {
            executable,
            headless,
        } => format!(
            "启动 {}{}",
            executable
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "默认浏览器".to_string()),
            if *headless { "（无头）" } else { "" }
        ),
        BrowserTarget::Attach { debug_port } => format!("连接调试端口 {}", debug_port),
    }
}

/// 格式化耗时，例如 `1m 05.2s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:04.1}s", minutes as u64, seconds - minutes * 60.0)
    }
}
