//! 测试页面 URL 模板
//!
//! 模板中只允许出现一个占位符，兼容原脚本中的 `%s` 写法

use regex::Regex;
use url::Url;

use crate::error::{AppError, AppResult, ConfigError};

/// 端口占位符
pub const PORT_PLACEHOLDER: &str = "{port}";
/// 后端地址占位符
pub const BACKEND_PLACEHOLDER: &str = "{backend}";
/// 旧脚本中的占位符
pub const LEGACY_PLACEHOLDER: &str = "%s";

/// 带单个占位符的 URL 模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplate {
    raw: String,
    placeholder: &'static str,
}

impl PageTemplate {
    /// 解析模板，要求恰好包含一个 `placeholder` 或 `%s`
    pub fn parse(raw: impl Into<String>, placeholder: &'static str) -> AppResult<Self> {
        let raw = raw.into();
        let pattern = Regex::new(&format!(
            "{}|{}",
            regex::escape(placeholder),
            regex::escape(LEGACY_PLACEHOLDER)
        ))
        .map_err(|e| ConfigError::BadTemplate {
            template: raw.clone(),
            placeholder: format!("{} ({})", placeholder, e),
            found: 0,
        })?;

        let found = pattern.find_iter(&raw).count();
        if found != 1 {
            return Err(ConfigError::BadTemplate {
                template: raw,
                placeholder: placeholder.to_string(),
                found,
            }
            .into());
        }

        Ok(Self { raw, placeholder })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 代入占位符并校验结果为合法 URL
    pub fn render(&self, value: &str) -> AppResult<Url> {
        let rendered = if self.raw.contains(self.placeholder) {
            self.raw.replacen(self.placeholder, value, 1)
        } else {
            self.raw.replacen(LEGACY_PLACEHOLDER, value, 1)
        };

        Url::parse(&rendered).map_err(|e| AppError::invalid_url("测试页面", rendered, e))
    }
}
