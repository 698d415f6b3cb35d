//! 基础设施层
//!
//! 持有文件与进程这类操作系统资源，只暴露能力

pub mod output_sink;
pub mod process;

pub use output_sink::OutputSink;
