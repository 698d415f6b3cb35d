use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（在申请任何资源之前发生）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 测试替身构建或启动失败
    #[error("启动错误: {0}")]
    Launch(#[from] LaunchError),
    /// 浏览器会话相关错误
    #[error("浏览器错误: {0}")]
    Probe(#[from] ProbeError),
    /// 清理阶段错误（只记录，不影响结果）
    #[error("清理错误: {0}")]
    Teardown(#[from] TeardownError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 没有提供运行模式
    #[error("缺少运行模式参数 (record/playback/direct)")]
    MissingMode,
    /// 运行模式不在 {record, playback, direct} 之内
    #[error("未知的运行模式 '{value}'，应为 record、playback 或 direct")]
    UnknownMode { value: String },
    /// 端口不在 1-65535 范围内
    #[error("端口 {value} 超出范围 [1, 65535]")]
    InvalidPort { value: i64 },
    /// 超时时间必须为正数
    #[error("超时时间必须大于 0 秒，实际为 {value}")]
    InvalidTimeout { value: i64 },
    /// record / direct 模式必须提供后端地址
    #[error("{mode} 模式需要提供 --backend 后端地址")]
    MissingBackend { mode: String },
    /// URL 无法解析
    #[error("无法解析 {field} 的 URL '{value}': {source}")]
    InvalidUrl {
        field: String,
        value: String,
        #[source]
        source: url::ParseError,
    },
    /// 模板中的占位符数量不正确
    #[error("模板 '{template}' 必须恰好包含一个 {placeholder} 占位符，实际找到 {found} 个")]
    BadTemplate {
        template: String,
        placeholder: String,
        found: usize,
    },
    /// 启动方式参数不完整
    #[error("启动方式 '{launcher}' 配置不完整: {reason}")]
    IncompleteLauncher { launcher: String, reason: String },
    /// 配置文件读取或解析失败
    #[error("无法加载配置文件 {path}: {reason}")]
    ProfileLoadFailed { path: PathBuf, reason: String },
}

/// 测试替身启动错误
#[derive(Debug, Error)]
pub enum LaunchError {
    /// 真实后端不可达（record 模式）
    #[error("后端 {backend} 不可达: {reason}")]
    BackendUnreachable { backend: String, reason: String },
    /// 构建步骤失败
    #[error("构建 {project} 失败: {reason}")]
    BuildFailed { project: String, reason: String },
    /// 进程或容器启动失败
    #[error("启动 {program} 失败: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 容器运行时返回非零退出码
    #[error("容器命令 '{command}' 执行失败: {stderr}")]
    ContainerCommandFailed { command: String, stderr: String },
    /// 输出文件无法创建
    #[error("无法创建输出文件 {path}: {source}")]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 启动过程中发生 panic
    #[error("启动过程中发生 panic: {message}")]
    Panicked { message: String },
}

/// 浏览器探测错误
#[derive(Debug, Error)]
pub enum ProbeError {
    /// 浏览器配置失败
    #[error("浏览器配置失败: {reason}")]
    ConfigurationFailed { reason: String },
    /// 启动或连接浏览器失败
    #[error("无法打开浏览器会话: {reason}")]
    SessionFailed { reason: String },
    /// 打开浏览器超时
    #[error("打开浏览器会话超时 ({seconds} 秒)")]
    SessionTimeout { seconds: u64 },
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {reason}")]
    ScriptExecutionFailed { reason: String },
    /// 连续多次读取标记元素失败
    #[error("连续 {attempts} 次读取 {selector} 失败: {last_reason}")]
    MarkerUnreadable {
        selector: String,
        attempts: usize,
        last_reason: String,
    },
    /// 用户中断
    #[error("运行被用户中断")]
    Interrupted,
    /// 探测过程中发生 panic
    #[error("探测过程中发生 panic: {message}")]
    Panicked { message: String },
}

/// 清理错误
#[derive(Debug, Error)]
pub enum TeardownError {
    /// 停止测试替身失败
    #[error("停止 {identity} 失败: {reason}")]
    StopFailed { identity: String, reason: String },
    /// 关闭浏览器失败
    #[error("关闭浏览器失败: {reason}")]
    CloseFailed { reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for ProbeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ProbeError::ScriptExecutionFailed {
            reason: err.to_string(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Probe(err.into())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建 URL 解析错误
    pub fn invalid_url(field: impl Into<String>, value: impl Into<String>, source: url::ParseError) -> Self {
        AppError::Config(ConfigError::InvalidUrl {
            field: field.into(),
            value: value.into(),
            source,
        })
    }

    /// 创建进程启动错误
    pub fn spawn_failed(program: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Launch(LaunchError::SpawnFailed {
            program: program.into(),
            source,
        })
    }

    /// 创建浏览器会话错误
    pub fn session_failed(reason: impl std::fmt::Display) -> Self {
        AppError::Probe(ProbeError::SessionFailed {
            reason: reason.to_string(),
        })
    }

    /// 创建停止失败错误
    pub fn stop_failed(identity: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        AppError::Teardown(TeardownError::StopFailed {
            identity: identity.to_string(),
            reason: reason.to_string(),
        })
    }

    /// 是否属于配置错误
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_classified() {
        let err: AppError = ConfigError::UnknownMode {
            value: "replay".to_string(),
        }
        .into();
        assert!(err.is_config());
        assert!(err.to_string().contains("replay"));

        let err: AppError = ProbeError::Interrupted.into();
        assert!(!err.is_config());
    }

    #[test]
    fn test_invalid_url_keeps_source() {
        let source = url::Url::parse("not a url").unwrap_err();
        let err = AppError::invalid_url("backend", "not a url", source);
        assert!(std::error::Error::source(&err).is_some());
    }
}
