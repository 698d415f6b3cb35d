//! 通过标记探测 - 业务能力层
//!
//! 兼容性测试页面全部通过时，`.passes` 元素的文本中会出现 `16`。
//! 探测器导航到测试页面后按固定间隔读取该元素，直到出现标记或超时。

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppResult, ProbeError};
use crate::traits::BrowserSession;

/// 通过计数所在的元素
pub const SUCCESS_SELECTOR: &str = ".passes";
/// 全部通过时的计数
pub const SUCCESS_MARKER: &str = "16";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_MAX_CONSECUTIVE_ERRORS: usize = 10;

/// 探测结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// 在期限内看到了标记
    MarkerFound,
    /// 期限已到仍未看到标记
    DeadlineElapsed,
}

/// 标记探测器
#[derive(Debug, Clone)]
pub struct MarkerProbe {
    poll_interval: Duration,
    max_consecutive_errors: usize,
}

impl MarkerProbe {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }

    /// 导航到 `url` 并等待标记，两步共用同一个期限
    pub async fn run(
        &self,
        session: &dyn BrowserSession,
        url: &Url,
        deadline: Duration,
    ) -> AppResult<ProbeVerdict> {
        info!("🌐 打开测试页面: {}", url);

        let probe = async {
            session.navigate(url).await?;
            debug!("页面已加载，开始等待标记");
            self.poll_until_marker(session).await
        };

        settle(tokio::time::timeout(deadline, probe).await, deadline)
    }

    async fn poll_until_marker(&self, session: &dyn BrowserSession) -> AppResult<()> {
        let mut consecutive_errors = 0;

        loop {
            match session.text_of(SUCCESS_SELECTOR).await {
                Ok(Some(text)) if text.contains(SUCCESS_MARKER) => return Ok(()),
                Ok(text) => {
                    consecutive_errors = 0;
                    debug!("当前 {} 文本: {:?}", SUCCESS_SELECTOR, text);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    debug!("读取 {} 失败 ({}): {}", SUCCESS_SELECTOR, consecutive_errors, e);
                    if consecutive_errors > self.max_consecutive_errors {
                        return Err(ProbeError::MarkerUnreadable {
                            selector: SUCCESS_SELECTOR.to_string(),
                            attempts: consecutive_errors,
                            last_reason: e.to_string(),
                        }
                        .into());
                    }
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}

fn settle(
    result: Result<AppResult<()>, tokio::time::error::Elapsed>,
    deadline: Duration,
) -> AppResult<ProbeVerdict> {
    match result {
        Ok(Ok(())) => {
            info!("✅ 已看到通过标记: {} 包含 {}", SUCCESS_SELECTOR, SUCCESS_MARKER);
            Ok(ProbeVerdict::MarkerFound)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!("⏰ {} 秒内未看到通过标记", deadline.as_secs());
            Ok(ProbeVerdict::DeadlineElapsed)
        }
    }
}

impl Default for MarkerProbe {
    fn default() -> Self {
        Self::new()
    }
}
