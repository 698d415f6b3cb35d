//! 后端可达性检查 - 业务能力层
//!
//! record 模式下替身会把请求转发给真实后端，启动前先确认它能连上

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AppResult, LaunchError};

/// 默认请求超时
const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// 后端可达性检查
#[derive(Debug, Clone)]
pub struct BackendCheck {
    client: reqwest::Client,
}

impl BackendCheck {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CHECK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// 能收到任意 HTTP 响应即视为可达，状态码不做要求
    pub async fn ensure_reachable(&self, backend: &str) -> AppResult<()> {
        debug!("检查后端可达性: {}", backend);

        let response = self
            .client
            .get(backend)
            .send()
            .await
            .map_err(|e| LaunchError::BackendUnreachable {
                backend: backend.to_string(),
                reason: e.to_string(),
            })?;

        info!("✓ 后端可达: {} ({})", backend, response.status());
        Ok(())
    }
}

impl Default for BackendCheck {
    fn default() -> Self {
        Self::new()
    }
}
