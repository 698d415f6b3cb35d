use chromiumoxide::Browser;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::spawn_event_loop;
use crate::error::{AppError, AppResult};

/// 连接到已开启远程调试端口的浏览器
pub async fn connect_to_browser(port: u16) -> AppResult<(Browser, JoinHandle<()>)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("🔗 正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::session_failed(e)
    })?;
    debug!("浏览器连接成功");

    Ok((browser, spawn_event_loop(handler)))
}
