//! 运行配置解析
//!
//! 命令行、环境变量与 TOML 配置文件先合并成 [`RunRequest`]，
//! 再由 [`RunRequest::resolve`] 校验并生成不可变的 [`RunConfiguration`]。
//! 解析过程没有副作用。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::page_template::{PageTemplate, BACKEND_PLACEHOLDER, PORT_PLACEHOLDER};
use crate::models::Mode;

/// 默认端口
pub const DEFAULT_PORT: i64 = 1234;
/// 默认超时（秒）
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
/// 默认兼容性测试页面
pub const DEFAULT_TEST_PAGE: &str =
    "https://servirtium.github.io/compatibility-suite/index.html?http://localhost:{port}/todos";
/// direct 模式下的参考测试页面
pub const DEFAULT_REFERENCE_PAGE: &str = "http://www.todobackend.com/specs/index.html?{backend}";
/// playback 模式未指定后端时交给替身的参考后端
pub const REFERENCE_BACKEND: &str = "http://todo-backend-sinatra.herokuapp.com";
/// 默认的替身项目
pub const DEFAULT_PROJECT: &str = "./Servirtium.StandaloneServer/Servirtium.StandaloneServer.csproj";
pub const DEFAULT_BUILD_PROGRAM: &str = "dotnet";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
pub const DEFAULT_IMAGE: &str = "servirtium-dotnet-standalone-server";
pub const DEFAULT_CONTAINER_NAME: &str = "servirtium-compatibility-test";
pub const DEFAULT_VOLUME: &str = "scripts";
/// 替身输出文件所在目录
pub const DEFAULT_SINK_DIR: &str = "logs";

/// 测试替身的启动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
    /// 先构建项目再运行
    Project,
    /// 直接运行预先打包好的可执行文件
    Executable,
    /// 以容器方式运行
    Container,
}

/// 合并后的原始运行请求，所有字段都是可选的
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunRequest {
    pub mode: Option<String>,
    pub port: Option<i64>,
    pub timeout_seconds: Option<i64>,
    pub backend: Option<String>,
    /// 浏览器可执行文件（对应原脚本的 driver 位置）
    pub chrome: Option<PathBuf>,
    /// 连接到已在运行的浏览器调试端口
    pub debug_port: Option<i64>,
    pub headless: Option<bool>,
    pub test_page: Option<String>,
    pub reference_page: Option<String>,
    pub launcher: Option<LauncherKind>,
    pub build_program: Option<String>,
    pub project: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub container_runtime: Option<String>,
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub volume: Option<String>,
    pub sink_dir: Option<PathBuf>,
}

/// 浏览器会话的获取方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserTarget {
    /// 启动新的浏览器
    Launch {
        executable: Option<PathBuf>,
        headless: bool,
    },
    /// 连接已在运行的浏览器
    Attach { debug_port: u16 },
}

/// 容器启动参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub runtime: String,
    pub image: String,
    pub name: String,
    pub volume: String,
}

/// 测试替身启动策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// 先执行 `<program> build <project>`，成功后运行构建产物
    Project { program: String, project: PathBuf },
    /// 预先打包好的可执行文件，不需要构建
    Executable { path: PathBuf },
    /// 容器
    Container(ContainerSpec),
}

impl LaunchStrategy {
    /// 日志中显示的名称
    pub fn label(&self) -> String {
        match self {
            LaunchStrategy::Project { project, .. } => format!("项目 {}", project.display()),
            LaunchStrategy::Executable { path } => format!("可执行文件 {}", path.display()),
            LaunchStrategy::Container(spec) => format!("容器 {} ({})", spec.name, spec.image),
        }
    }
}

/// 一次运行的不可变配置
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub mode: Mode,
    pub port: u16,
    /// record / direct 必填；playback 可选
    pub backend_address: Option<Url>,
    pub test_page_template: PageTemplate,
    pub reference_page_template: PageTemplate,
    /// 代入占位符后的浏览目标
    pub target_url: Url,
    pub browser: BrowserTarget,
    pub timeout: Duration,
    pub launch: LaunchStrategy,
    pub sink_dir: PathBuf,
}

impl RunConfiguration {
    /// 生成 `target_url` 所用的模板
    pub fn page_template(&self) -> &PageTemplate {
        match (&self.backend_address, self.mode) {
            (Some(_), Mode::Direct) => &self.reference_page_template,
            _ => &self.test_page_template,
        }
    }

    /// 交给测试替身的后端地址
    pub fn backend_for_double(&self) -> String {
        match &self.backend_address {
            Some(url) => url_text(url),
            None => REFERENCE_BACKEND.to_string(),
        }
    }

    /// 替身启动参数 `(mode, backend, port)`
    pub fn double_args(&self) -> Vec<String> {
        vec![
            self.mode.as_str().to_string(),
            self.backend_for_double(),
            self.port.to_string(),
        ]
    }

    /// 本次运行的输出文件，以模式命名
    pub fn sink_path(&self) -> PathBuf {
        self.sink_dir.join(format!("servirtium-{}.log", self.mode))
    }

    /// 记录替身进程 PID 的文件，以端口命名
    pub fn pid_file(&self) -> PathBuf {
        self.sink_dir.join(format!("double-{}.pid", self.port))
    }
}

impl RunRequest {
    /// 从 TOML 配置文件加载
    pub fn load_profile(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProfileLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| {
            ConfigError::ProfileLoadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// 以 `self` 为准，缺失的字段由 `base` 补齐
    pub fn or(self, base: RunRequest) -> RunRequest {
        RunRequest {
            mode: self.mode.or(base.mode),
            port: self.port.or(base.port),
            timeout_seconds: self.timeout_seconds.or(base.timeout_seconds),
            backend: self.backend.or(base.backend),
            chrome: self.chrome.or(base.chrome),
            debug_port: self.debug_port.or(base.debug_port),
            headless: self.headless.or(base.headless),
            test_page: self.test_page.or(base.test_page),
            reference_page: self.reference_page.or(base.reference_page),
            launcher: self.launcher.or(base.launcher),
            build_program: self.build_program.or(base.build_program),
            project: self.project.or(base.project),
            executable: self.executable.or(base.executable),
            container_runtime: self.container_runtime.or(base.container_runtime),
            image: self.image.or(base.image),
            container_name: self.container_name.or(base.container_name),
            volume: self.volume.or(base.volume),
            sink_dir: self.sink_dir.or(base.sink_dir),
        }
    }

    /// 校验并生成运行配置
    pub fn resolve(self) -> AppResult<RunConfiguration> {
        let mode: Mode = self.mode.as_deref().ok_or(ConfigError::MissingMode)?.parse()?;

        let port = validate_port(self.port.unwrap_or(DEFAULT_PORT))?;

        let timeout_seconds = self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds <= 0 {
            return Err(ConfigError::InvalidTimeout {
                value: timeout_seconds,
            }
            .into());
        }

        let backend_address = match self.backend.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(raw) => Some(Url::parse(raw).map_err(|e| AppError::invalid_url("backend", raw, e))?),
            None if mode.requires_backend() => {
                return Err(ConfigError::MissingBackend {
                    mode: mode.to_string(),
                }
                .into())
            }
            None => None,
        };

        let test_page_template = PageTemplate::parse(
            self.test_page.unwrap_or_else(|| DEFAULT_TEST_PAGE.to_string()),
            PORT_PLACEHOLDER,
        )?;
        let reference_page_template = PageTemplate::parse(
            self.reference_page
                .unwrap_or_else(|| DEFAULT_REFERENCE_PAGE.to_string()),
            BACKEND_PLACEHOLDER,
        )?;

        let target_url = match (&backend_address, mode) {
            (Some(backend), Mode::Direct) => reference_page_template.render(&url_text(backend))?,
            _ => test_page_template.render(&port.to_string())?,
        };

        let browser = match self.debug_port {
            Some(debug_port) => BrowserTarget::Attach {
                debug_port: validate_port(debug_port)?,
            },
            None => BrowserTarget::Launch {
                executable: self.chrome,
                headless: self.headless.unwrap_or(false),
            },
        };

        let launch = match self.launcher.unwrap_or(LauncherKind::Project) {
            LauncherKind::Project => LaunchStrategy::Project {
                program: self
                    .build_program
                    .unwrap_or_else(|| DEFAULT_BUILD_PROGRAM.to_string()),
                project: self.project.unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT)),
            },
            LauncherKind::Executable => LaunchStrategy::Executable {
                path: self.executable.ok_or_else(|| ConfigError::IncompleteLauncher {
                    launcher: "executable".to_string(),
                    reason: "需要通过 --executable 指定可执行文件".to_string(),
                })?,
            },
            LauncherKind::Container => LaunchStrategy::Container(ContainerSpec {
                runtime: self
                    .container_runtime
                    .unwrap_or_else(|| DEFAULT_CONTAINER_RUNTIME.to_string()),
                image: self.image.unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
                name: self
                    .container_name
                    .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string()),
                volume: self.volume.unwrap_or_else(|| DEFAULT_VOLUME.to_string()),
            }),
        };

        Ok(RunConfiguration {
            mode,
            port,
            backend_address,
            test_page_template,
            reference_page_template,
            target_url,
            browser,
            timeout: Duration::from_secs(timeout_seconds as u64),
            launch,
            sink_dir: self.sink_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SINK_DIR)),
        })
    }
}

fn validate_port(value: i64) -> AppResult<u16> {
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort { value }.into()),
    }
}

/// 去掉 `Url` 序列化时补上的末尾斜杠，保持用户输入的写法
fn url_text(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
