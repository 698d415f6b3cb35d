//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次兼容性测试运行的调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! run_coordinator (一次运行：启动 → 探测 → 清理)
//!     ↓
//! services (能力层：替身启动 / 后端检查 / 标记探测)
//!     ↓
//! browser + infrastructure (浏览器会话、进程、输出文件)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有替身句柄和浏览器会话
//! 2. **向下依赖**：编排层 → services → infrastructure
//! 3. **依赖注入**：替身启动器和浏览器驱动都通过 trait 传入

pub mod run_coordinator;

pub use run_coordinator::RunCoordinator;
