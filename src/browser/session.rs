//! 基于 chromiumoxide 的浏览器会话
//!
//! 持有唯一的 page 资源，只暴露"导航 / 读取元素文本 / 关闭"的能力

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{connect_to_browser, launch_browser};
use crate::config::BrowserTarget;
use crate::error::{AppError, AppResult, ProbeError, TeardownError};
use crate::traits::{BrowserDriver, BrowserSession};

/// 打开 chromiumoxide 会话的驱动
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeDriver;

impl ChromeDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open(&self, target: &BrowserTarget) -> AppResult<Box<dyn BrowserSession>> {
        let (browser, handler, owned) = match target {
            BrowserTarget::Launch {
                executable,
                headless,
            } => {
                let (browser, handler) = launch_browser(executable.as_deref(), *headless).await?;
                (browser, handler, true)
            }
            BrowserTarget::Attach { debug_port } => {
                let (browser, handler) = connect_to_browser(*debug_port).await?;
                (browser, handler, false)
            }
        };

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(AppError::session_failed(e));
            }
        };
        debug!("已创建空白页面");

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler,
            owned,
            closed: false,
        }))
    }
}

/// 一个 chromiumoxide 会话
///
/// 自己启动的浏览器在关闭时整体退出；
/// 连接上的浏览器只关闭本程序创建的页面
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    owned: bool,
    closed: bool,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &Url) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url.as_str()).await.map_err(|e| ProbeError::NavigationFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn text_of(&self, selector: &str) -> AppResult<Option<String>> {
        let result = self.page.evaluate(text_script(selector)).await?;
        let text: String = result
            .into_value()
            .map_err(|e| ProbeError::ScriptExecutionFailed {
                reason: e.to_string(),
            })?;

        Ok(if text.is_empty() { None } else { Some(text) })
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = if self.owned {
            match self.browser.close().await {
                Ok(_) => {
                    if let Err(e) = self.browser.wait().await {
                        warn!("等待浏览器进程退出失败: {}", e);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            self.page.clone().close().await
        };
        self.handler.abort();

        result.map_err(|e| {
            TeardownError::CloseFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// 读取元素文本的脚本；元素不存在时返回空字符串
fn text_script(selector: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? (el.textContent || \"\") : \"\"; }})()",
        selector
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_script_quotes_selector() {
        let script = text_script(".passes");
        assert!(script.contains("document.querySelector(\".passes\")"));

        let script = text_script("a[title=\"x\"]");
        assert!(script.contains(r#"document.querySelector("a[title=\"x\"]")"#));
    }
}
