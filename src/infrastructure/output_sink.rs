//! 替身输出文件 - 基础设施层
//!
//! 每次运行一个文件，以模式命名，避免并发运行互相覆盖

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::debug;

use crate::error::{AppResult, LaunchError};

/// 替身输出文件
#[derive(Debug, Clone)]
pub struct OutputSink {
    path: PathBuf,
}

impl OutputSink {
    /// 创建（或截断）输出文件并写入带时间戳的文件头
    ///
    /// # 参数
    /// - `path`: 输出文件路径，父目录不存在时会被创建
    /// - `title`: 文件头中的标题
    pub fn create(path: &Path, title: &str) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| sink_error(path, e))?;
        }

        let header = format!(
            "{}\n{} - {}\n{}\n\n",
            "=".repeat(60),
            title,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60)
        );
        fs::write(path, header).map_err(|e| sink_error(path, e))?;
        debug!("输出文件已创建: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 以追加方式打开，供子进程的 stdout / stderr 使用
    pub fn stdio(&self) -> AppResult<(Stdio, Stdio)> {
        let stdout = self.open_append()?;
        let stderr = stdout.try_clone().map_err(|e| sink_error(&self.path, e))?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// 追加一段文本（例如构建输出）
    pub fn append(&self, text: &str) -> AppResult<()> {
        let mut file = self.open_append()?;
        file.write_all(text.as_bytes())
            .map_err(|e| sink_error(&self.path, e))?;
        Ok(())
    }

    fn open_append(&self) -> AppResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| sink_error(&self.path, e))
    }
}

fn sink_error(path: &Path, source: std::io::Error) -> crate::error::AppError {
    LaunchError::SinkUnavailable {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
