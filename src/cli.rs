//! 命令行参数
//!
//! 每个选项都可以通过 `COMPAT_*` 环境变量提供；`--config` 指定的 TOML 配置文件优先级最低。

use std::path::PathBuf;

use clap::Parser;

use crate::config::{LauncherKind, RunConfiguration, RunRequest};
use crate::error::AppResult;

/// 配置错误时的退出码
pub const CONFIG_ERROR_EXIT: u8 = 10;

/// 运行 Servirtium 兼容性测试套件
#[derive(Parser, Debug, Default)]
#[command(name = "compat-suite", version)]
#[command(about = "Runs the Servirtium todo-backend compatibility suite against a record/playback double")]
pub struct Args {
    /// 运行模式：record、playback 或 direct
    #[arg(env = "COMPAT_MODE")]
    pub mode: Option<String>,

    /// 替身监听端口
    #[arg(long, env = "COMPAT_PORT", allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// 浏览器可执行文件
    #[arg(long, env = "COMPAT_CHROME")]
    pub chrome: Option<PathBuf>,

    /// 连接到已开启远程调试的浏览器，而不是启动新的浏览器
    #[arg(long, env = "COMPAT_DEBUG_PORT", allow_negative_numbers = true)]
    pub debug_port: Option<i64>,

    /// 以无头模式启动浏览器；`--headless=false` 可覆盖配置文件
    #[arg(
        long,
        env = "COMPAT_HEADLESS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub headless: Option<bool>,

    /// 测试页面模板，`{port}` 会被替换为端口
    #[arg(long = "testpage", env = "COMPAT_TESTPAGE")]
    pub test_page: Option<String>,

    /// direct 模式的参考页面模板，`{backend}` 会被替换为后端地址
    #[arg(long, env = "COMPAT_REFERENCE_PAGE")]
    pub reference_page: Option<String>,

    /// 真实后端地址（record / direct 必填）
    #[arg(long, env = "COMPAT_BACKEND")]
    pub backend: Option<String>,

    /// 等待全部通过的秒数
    #[arg(
        long = "timeoutseconds",
        env = "COMPAT_TIMEOUT_SECONDS",
        allow_negative_numbers = true
    )]
    pub timeout_seconds: Option<i64>,

    /// 替身启动方式
    #[arg(long, value_enum, env = "COMPAT_LAUNCHER")]
    pub launcher: Option<LauncherKind>,

    /// 构建和运行项目的程序
    #[arg(long, env = "COMPAT_BUILD_PROGRAM")]
    pub build_program: Option<String>,

    /// 替身项目文件
    #[arg(long, env = "COMPAT_PROJECT")]
    pub project: Option<PathBuf>,

    /// 预先打包好的替身可执行文件
    #[arg(long, env = "COMPAT_EXECUTABLE")]
    pub executable: Option<PathBuf>,

    /// 容器运行时（docker / podman）
    #[arg(long, env = "COMPAT_CONTAINER_RUNTIME")]
    pub container_runtime: Option<String>,

    /// 替身镜像
    #[arg(long, env = "COMPAT_IMAGE")]
    pub image: Option<String>,

    /// 替身容器名称
    #[arg(long, env = "COMPAT_CONTAINER_NAME")]
    pub container_name: Option<String>,

    /// 挂载录制结果的卷
    #[arg(long, env = "COMPAT_VOLUME")]
    pub volume: Option<String>,

    /// 替身输出文件目录
    #[arg(long, env = "COMPAT_SINK_DIR")]
    pub sink_dir: Option<PathBuf>,

    /// TOML 配置文件
    #[arg(long = "config", env = "COMPAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// 按运行结果设置退出码
    #[arg(long, env = "COMPAT_STRICT")]
    pub strict: bool,

    /// 输出调试日志
    #[arg(short, long, env = "COMPAT_VERBOSE")]
    pub verbose: bool,
}

impl Args {
    /// 命令行部分的运行请求，不含配置文件
    pub fn to_request(&self) -> RunRequest {
        RunRequest {
            mode: self.mode.clone(),
            port: self.port,
            timeout_seconds: self.timeout_seconds,
            backend: self.backend.clone(),
            chrome: self.chrome.clone(),
            debug_port: self.debug_port,
            headless: self.headless,
            test_page: self.test_page.clone(),
            reference_page: self.reference_page.clone(),
            launcher: self.launcher,
            build_program: self.build_program.clone(),
            project: self.project.clone(),
            executable: self.executable.clone(),
            container_runtime: self.container_runtime.clone(),
            image: self.image.clone(),
            container_name: self.container_name.clone(),
            volume: self.volume.clone(),
            sink_dir: self.sink_dir.clone(),
        }
    }

    /// 合并配置文件并解析出运行配置
    pub fn resolve(&self) -> AppResult<RunConfiguration> {
        let request = match &self.config {
            Some(path) => self.to_request().or(RunRequest::load_profile(path)?),
            None => self.to_request(),
        };
        request.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ConfigError};
    use crate::models::Mode;
    use std::ffi::OsStr;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "compat-suite",
            "record",
            "--port",
            "8080",
            "--backend",
            "http://localhost:4567",
            "--timeoutseconds",
            "45",
            "--headless",
            "--launcher",
            "container",
            "--strict",
        ])
        .unwrap();

        assert!(args.strict);
        let config = args.resolve().unwrap();
        assert_eq!(config.mode, Mode::Record);
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_negative_port_reaches_validation() {
        let args = Args::try_parse_from(["compat-suite", "playback", "--port", "-1"]).unwrap();
        let err = args.resolve().unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidPort { value: -1 })));
    }

    #[test]
    fn test_unknown_mode_is_accepted_by_parser() {
        let args = Args::try_parse_from(["compat-suite", "replay"]).unwrap();
        assert!(args.resolve().unwrap_err().is_config());
    }

    #[test]
    fn test_command_line_overrides_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = \"direct\"\nbackend = \"http://localhost:4567\"\nheadless = true").unwrap();

        let args = Args::try_parse_from([
            OsStr::new("compat-suite"),
            OsStr::new("--config"),
            file.path().as_os_str(),
            OsStr::new("--backend"),
            OsStr::new("http://localhost:9999"),
        ])
        .unwrap();
        let config = args.resolve().unwrap();

        assert_eq!(config.mode, Mode::Direct);
        assert_eq!(
            config.target_url.as_str(),
            "http://www.todobackend.com/specs/index.html?http://localhost:9999"
        );
        assert!(matches!(
            config.browser,
            crate::config::BrowserTarget::Launch { headless: true, .. }
        ));
    }

    #[test]
    fn test_headless_false_overrides_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = \"playback\"\nheadless = true").unwrap();

        let args = Args::try_parse_from([
            OsStr::new("compat-suite"),
            OsStr::new("--config"),
            file.path().as_os_str(),
            OsStr::new("--headless=false"),
        ])
        .unwrap();
        assert_eq!(args.headless, Some(false));

        let config = args.resolve().unwrap();
        assert!(matches!(
            config.browser,
            crate::config::BrowserTarget::Launch { headless: false, .. }
        ));
    }

    #[test]
    fn test_bare_headless_flag_means_true() {
        let args = Args::try_parse_from(["compat-suite", "--headless", "playback"]).unwrap();
        assert_eq!(args.headless, Some(true));
        assert_eq!(args.mode.as_deref(), Some("playback"));
    }

    #[test]
    fn test_missing_profile_is_config_error() {
        let args = Args {
            mode: Some("playback".to_string()),
            config: Some(PathBuf::from("/nonexistent/compat.toml")),
            ..Default::default()
        };
        assert!(matches!(
            args.resolve().unwrap_err(),
            AppError::Config(ConfigError::ProfileLoadFailed { .. })
        ));
    }
}
