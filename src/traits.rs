//! 外部协作者的抽象
//!
//! 测试替身和浏览器都通过这里的 trait 接入编排器，
//! 单元测试中使用 mockall 生成的 Mock 实现替换。

use std::path::PathBuf;

use async_trait::async_trait;
use url::Url;

use crate::config::{BrowserTarget, RunConfiguration};
use crate::error::AppResult;
use crate::models::ServerIdentity;

/// 已启动的测试替身
///
/// 只在 record / playback 模式下存在，由编排器独占
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerHandle: Send + Sync {
    /// 进程 PID 或容器名称
    fn identity(&self) -> ServerIdentity;

    /// 替身输出文件
    fn sink(&self) -> PathBuf;

    /// 停止替身：先走优雅通道，必要时强制结束
    ///
    /// 对已停止的替身重复调用是空操作
    async fn terminate(&mut self) -> AppResult<()>;
}

/// 测试替身启动器
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// 按配置构建并启动替身，不等待其就绪
    async fn launch(&self, config: &RunConfiguration) -> AppResult<Box<dyn ServerHandle>>;

    /// 清理没能交出句柄的启动留下的资源（失败、panic 或被中断）
    ///
    /// 尽力而为，对没有留下任何资源的启动调用也是安全的
    async fn abandon(&self, config: &RunConfiguration) -> AppResult<()>;
}

/// 一个浏览器自动化会话
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 导航到指定 URL
    async fn navigate(&self, url: &Url) -> AppResult<()>;

    /// 读取第一个匹配 `selector` 的元素文本，元素不存在时返回 `None`
    async fn text_of(&self, selector: &str) -> AppResult<Option<String>>;

    /// 关闭会话，重复调用是空操作
    async fn close(&mut self) -> AppResult<()>;
}

/// 浏览器驱动，负责打开会话
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self, target: &BrowserTarget) -> AppResult<Box<dyn BrowserSession>>;
}
