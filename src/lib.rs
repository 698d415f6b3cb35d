//! # Compat Suite
//!
//! 用浏览器驱动 Servirtium 兼容性测试页面，验证 record / playback 测试替身的行为
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有进程、端口和输出文件，只暴露能力
//! - `browser/` - 唯一的浏览器 owner，提供导航和读取元素文本的能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `DoubleLauncher` - 按启动策略运行替身（项目 / 可执行文件 / 容器）
//! - `BackendCheck` - record 模式下检查真实后端
//! - `MarkerProbe` - 等待 `.passes` 出现 `16`
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/run_coordinator` - 一次运行的状态机，保证清理只执行一次
//!
//! ### ④ 入口（CLI）
//! - `cli` - 命令行、环境变量与 TOML 配置文件
//!
//! ## 模块结构

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod traits;
pub mod utils;

// 重新导出常用类型
pub use config::{RunConfiguration, RunRequest};
pub use error::{AppError, AppResult};
pub use models::{Mode, RunOutcome, RunReport};
pub use orchestrator::RunCoordinator;
