use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// 通过测试替身录制与真实后端的交互
    Record,
    /// 回放已录制的交互
    Playback,
    /// 不经过测试替身，直接访问参考后端
    Direct,
}

impl Mode {
    /// 命令行与替身进程使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Playback => "playback",
            Mode::Direct => "direct",
        }
    }

    /// 该模式是否需要在本地启动测试替身
    pub fn requires_double(self) -> bool {
        matches!(self, Mode::Record | Mode::Playback)
    }

    /// 该模式是否必须提供后端地址
    pub fn requires_backend(self) -> bool {
        matches!(self, Mode::Record | Mode::Direct)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Mode::Record),
            "playback" => Ok(Mode::Playback),
            "direct" => Ok(Mode::Direct),
            _ => Err(ConfigError::UnknownMode {
                value: s.to_string(),
            }),
        }
    }
}

/// 一次运行的最终结果，每次运行恰好产生一个
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 所有兼容性检查通过
    AllPassed,
    /// 在超时时间内没有出现成功标记
    TimedOut,
    /// 测试替身构建或启动失败
    LaunchFailed,
    /// 浏览器会话层面的失败（不同于超时）
    ProbeFailed,
}

impl RunOutcome {
    /// 是否属于正常完成（而非失败）
    pub fn is_completion(self) -> bool {
        matches!(self, RunOutcome::AllPassed | RunOutcome::TimedOut)
    }

    /// `--strict` 模式下的退出码
    pub fn strict_exit_code(self) -> i32 {
        match self {
            RunOutcome::AllPassed => 0,
            RunOutcome::TimedOut => 1,
            RunOutcome::LaunchFailed => 2,
            RunOutcome::ProbeFailed => 3,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunOutcome::AllPassed => "AllPassed",
            RunOutcome::TimedOut => "TimedOut",
            RunOutcome::LaunchFailed => "LaunchFailed",
            RunOutcome::ProbeFailed => "ProbeFailed",
        };
        f.write_str(name)
    }
}

/// 编排器状态机
///
/// `Idle → Resolved → Launching → Probing → Completed | Failed → TornDown`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolved,
    Launching,
    Probing,
    Completed(RunOutcome),
    Failed(RunOutcome),
    TornDown,
}

impl RunState {
    /// 由结果得到对应的终结前状态
    pub fn settled(outcome: RunOutcome) -> Self {
        if outcome.is_completion() {
            RunState::Completed(outcome)
        } else {
            RunState::Failed(outcome)
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RunState::TornDown
    }
}

/// 测试替身的身份标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerIdentity {
    /// 本地子进程
    Process { pid: u32 },
    /// 容器
    Container { name: String },
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerIdentity::Process { pid } => write!(f, "进程 PID {}", pid),
            ServerIdentity::Container { name } => write!(f, "容器 {}", name),
        }
    }
}

/// 一次运行的报告，交给命令行层输出
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub outcome: RunOutcome,
    /// 人类可读的结果说明
    pub summary: String,
    pub server: Option<ServerIdentity>,
    pub sink: Option<PathBuf>,
    pub elapsed: Duration,
    /// 依次经历的状态
    pub states: Vec<RunState>,
}

impl RunReport {
    /// 与原脚本一致的套件结果行
    pub fn suite_line(&self) -> &'static str {
        match self.outcome {
            RunOutcome::AllPassed => "Compatibility suite: all 16 tests passed",
            RunOutcome::TimedOut => {
                "Compatibility suite: did not finish with 16 passes. See open browser frame."
            }
            RunOutcome::LaunchFailed => "Compatibility suite: not run, the server double failed to launch",
            RunOutcome::ProbeFailed => "Compatibility suite: not run, the browser session failed",
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode: {}, outcome: {}", self.mode, self.outcome)
    }
}
