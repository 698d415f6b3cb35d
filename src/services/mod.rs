//! 业务能力层
//!
//! 每个服务只负责一种能力：检查后端、运行替身、探测页面

pub mod backend_check;
pub mod container_double;
pub mod double_launcher;
pub mod marker_probe;
pub mod process_double;

pub use backend_check::BackendCheck;
pub use container_double::ContainerDouble;
pub use double_launcher::DoubleLauncher;
pub use marker_probe::{MarkerProbe, ProbeVerdict};
pub use process_double::ProcessDouble;
