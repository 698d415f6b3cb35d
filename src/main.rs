use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use compat_suite::browser::ChromeDriver;
use compat_suite::cli::{Args, CONFIG_ERROR_EXIT};
use compat_suite::orchestrator::RunCoordinator;
use compat_suite::services::DoubleLauncher;
use compat_suite::utils::{init_tracing, log_startup, print_final_summary};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 参数解析失败与配置错误使用同一个退出码
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { CONFIG_ERROR_EXIT } else { 0 };
            e.print()?;
            return Ok(ExitCode::from(code));
        }
    };

    // 初始化日志
    init_tracing(args.verbose);

    // 解析配置，此时还没有占用任何资源
    let config = match args.resolve() {
        Ok(config) => config,
        Err(e) if e.is_config() => {
            error!("❌ {}", e);
            eprintln!("{}", e);
            eprintln!("usage: compat-suite <record|playback|direct> [--backend <url>] [--port <port>]");
            return Ok(ExitCode::from(CONFIG_ERROR_EXIT));
        }
        Err(e) => return Err(e.into()),
    };
    log_startup(&config);

    let mut coordinator = RunCoordinator::new(config, DoubleLauncher::new(), ChromeDriver::new());
    let report = coordinator.run().await;
    print_final_summary(&report);

    println!("{}", report.suite_line());
    println!("mode: {}", report.mode);
    println!("outcome: {}", report.outcome);

    let code = if args.strict {
        report.outcome.strict_exit_code()
    } else {
        0
    };
    Ok(ExitCode::from(code as u8))
}
