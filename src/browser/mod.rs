pub mod connection;
pub mod headless;
pub mod session;

use chromiumoxide::Handler;
use futures::StreamExt;
use tokio::task::JoinHandle;

pub use connection::connect_to_browser;
pub use headless::launch_browser;
pub use session::{ChromeDriver, ChromeSession};

/// 在后台处理浏览器事件
pub(crate) fn spawn_event_loop(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}
