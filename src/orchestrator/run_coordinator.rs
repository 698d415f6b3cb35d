//! 运行编排器 - 编排层
//!
//! ## 职责
//!
//! 一次兼容性测试运行的完整生命周期：
//!
//! 1. **启动替身**：record / playback 模式下通过 [`ServerLauncher`] 启动测试替身
//! 2. **打开浏览器**：替身启动成功（或 direct 模式）后才打开浏览器
//! 3. **探测页面**：导航到测试页面并等待 `.passes` 出现 `16`
//! 4. **清理**：无论结果如何，先停止替身再关闭浏览器，每一步都有时间上限
//!
//! ## 状态机
//!
//! ```text
//! Idle → Resolved → Launching → Probing → Completed | Failed → TornDown
//!                 ↘ (direct) ↗
//! ```
//!
//! 编排器独占替身句柄和浏览器会话，清理只会执行一次。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::RunConfiguration;
use crate::error::{AppError, AppResult, LaunchError, ProbeError};
use crate::models::{RunOutcome, RunReport, RunState, ServerIdentity};
use crate::services::{MarkerProbe, ProbeVerdict};
use crate::traits::{BrowserDriver, BrowserSession, ServerHandle, ServerLauncher};

/// 打开浏览器会话的时间上限
pub const SESSION_OPEN_TIMEOUT: Duration = Duration::from_secs(60);
/// 每个清理步骤的时间上限
pub const TEARDOWN_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// 运行阶段的退出方式
enum StageExit {
    Finished(AppResult<ProbeVerdict>),
    Panicked(String),
    Interrupted,
}

/// 运行编排器
pub struct RunCoordinator<L, D> {
    config: RunConfiguration,
    launcher: L,
    driver: D,
    probe: MarkerProbe,
    interrupt: Option<BoxFuture<'static, ()>>,
    state: RunState,
    states: Vec<RunState>,
    server: Option<Box<dyn ServerHandle>>,
    /// 已开始启动但还没拿到替身句柄
    launch_pending: bool,
    session: Option<Box<dyn BrowserSession>>,
    server_identity: Option<ServerIdentity>,
    sink: Option<PathBuf>,
    report: Option<RunReport>,
}

impl<L: ServerLauncher, D: BrowserDriver> RunCoordinator<L, D> {
    /// 用已解析的配置创建编排器
    pub fn new(config: RunConfiguration, launcher: L, driver: D) -> Self {
        let mut coordinator = Self {
            config,
            launcher,
            driver,
            probe: MarkerProbe::new(),
            interrupt: None,
            state: RunState::Idle,
            states: vec![RunState::Idle],
            server: None,
            launch_pending: false,
            session: None,
            server_identity: None,
            sink: None,
            report: None,
        };
        coordinator.transition(RunState::Resolved);
        coordinator
    }

    /// 替换默认的 Ctrl-C 中断信号
    pub fn with_interrupt<F>(mut self, interrupt: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.interrupt = Some(interrupt.boxed());
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    /// 执行一次完整运行并返回报告
    ///
    /// 同一个编排器重复调用时直接返回第一次的报告
    pub async fn run(&mut self) -> RunReport {
        if let Some(report) = &self.report {
            warn!("⚠️ 本次运行已经结束，返回已有结果");
            return report.clone();
        }

        let started = Instant::now();
        if self.state.is_terminal() {
            warn!("⚠️ 编排器在运行前已被清理");
            return self.finish(
                RunOutcome::ProbeFailed,
                "运行前已被清理".to_string(),
                started,
            );
        }

        let interrupt = self.interrupt.take().unwrap_or_else(|| ctrl_c().boxed());
        let exit = tokio::select! {
            result = AssertUnwindSafe(self.execute()).catch_unwind() => match result {
                Ok(result) => StageExit::Finished(result),
                Err(panic) => StageExit::Panicked(panic_message(panic.as_ref())),
            },
            _ = interrupt => StageExit::Interrupted,
        };

        let (outcome, summary) = self.classify(exit);
        self.transition(RunState::settled(outcome));
        self.teardown().await;

        self.finish(outcome, summary, started)
    }

    /// 清理替身和浏览器
    ///
    /// 先停止替身（启动未完成时改为清理其残留）再关闭浏览器；
    /// 任何一步失败都只记录日志，不影响另一步。
    /// 重复调用是空操作。
    pub async fn teardown(&mut self) {
        if self.state.is_terminal() {
            debug!("已清理，跳过");
            return;
        }

        if let Some(mut server) = self.server.take() {
            info!("🛑 停止测试替身: {}", server.identity());
            release("停止测试替身", server.terminate()).await;
        } else if self.launch_pending {
            info!("🧹 清理未完成的替身启动");
            release("清理未完成的替身启动", self.launcher.abandon(&self.config)).await;
        }
        self.launch_pending = false;

        if let Some(mut session) = self.session.take() {
            info!("🧹 关闭浏览器");
            release("关闭浏览器", session.close()).await;
        }

        self.transition(RunState::TornDown);
    }

    async fn execute(&mut self) -> AppResult<ProbeVerdict> {
        if self.config.mode.requires_double() {
            self.transition(RunState::Launching);
            info!("🚀 启动测试替身: {}", self.config.launch.label());

            self.launch_pending = true;
            let handle = self.launcher.launch(&self.config).await?;
            self.launch_pending = false;
            let identity = handle.identity();
            info!("✓ 测试替身已启动: {}", identity);

            self.server_identity = Some(identity);
            self.sink = Some(handle.sink());
            self.server = Some(handle);
        } else {
            info!("🎯 direct 模式，直接测试后端，不启动替身");
        }

        self.transition(RunState::Probing);

        let session = timeout(SESSION_OPEN_TIMEOUT, self.driver.open(&self.config.browser))
            .await
            .map_err(|_| ProbeError::SessionTimeout {
                seconds: SESSION_OPEN_TIMEOUT.as_secs(),
            })??;
        let session: &dyn BrowserSession = &**self.session.insert(session);

        self.probe
            .run(session, &self.config.target_url, self.config.timeout)
            .await
    }

    fn classify(&self, exit: StageExit) -> (RunOutcome, String) {
        let failed = if self.state == RunState::Launching {
            RunOutcome::LaunchFailed
        } else {
            RunOutcome::ProbeFailed
        };

        match exit {
            StageExit::Finished(Ok(ProbeVerdict::MarkerFound)) => (
                RunOutcome::AllPassed,
                "全部 16 项兼容性检查通过".to_string(),
            ),
            StageExit::Finished(Ok(ProbeVerdict::DeadlineElapsed)) => (
                RunOutcome::TimedOut,
                format!(
                    "{} 秒内未看到 16 项通过",
                    self.config.timeout.as_secs()
                ),
            ),
            StageExit::Finished(Err(e)) => {
                error!("❌ 运行失败: {}", e);
                (failed, e.to_string())
            }
            StageExit::Panicked(message) => {
                let err: AppError = if failed == RunOutcome::LaunchFailed {
                    LaunchError::Panicked { message }.into()
                } else {
                    ProbeError::Panicked { message }.into()
                };
                error!("❌ 运行失败: {}", err);
                (failed, err.to_string())
            }
            StageExit::Interrupted => {
                let err = AppError::from(ProbeError::Interrupted);
                warn!("⚠️ {}", err);
                (failed, err.to_string())
            }
        }
    }

    fn finish(&mut self, outcome: RunOutcome, summary: String, started: Instant) -> RunReport {
        let report = RunReport {
            mode: self.config.mode,
            outcome,
            summary,
            server: self.server_identity.clone(),
            sink: self.sink.clone(),
            elapsed: started.elapsed(),
            states: self.states.clone(),
        };
        self.report = Some(report.clone());
        report
    }

    fn transition(&mut self, next: RunState) {
        debug!("状态: {:?} → {:?}", self.state, next);
        self.state = next;
        self.states.push(next);
    }
}

/// 执行一个清理步骤，失败、panic 和超时都只记录日志
async fn release<F>(what: &str, step: F)
where
    F: Future<Output = AppResult<()>>,
{
    match timeout(TEARDOWN_STEP_TIMEOUT, AssertUnwindSafe(step).catch_unwind()).await {
        Ok(Ok(Ok(()))) => info!("✓ {}完成", what),
        Ok(Ok(Err(e))) => warn!("⚠️ {}失败（已忽略）: {}", what, e),
        Ok(Err(panic)) => warn!(
            "⚠️ {}时发生 panic（已忽略）: {}",
            what,
            panic_message(panic.as_ref())
        ),
        Err(_) => warn!(
            "⚠️ {}超时（{} 秒），已放弃",
            what,
            TEARDOWN_STEP_TIMEOUT.as_secs()
        ),
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // 无法监听信号时不打断运行
        futures::future::pending::<()>().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserTarget, RunRequest};
    use crate::traits::{MockBrowserDriver, MockServerLauncher};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// 按顺序记录协作者被调用的情况
    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<&'static str>>>);

    impl Journal {
        fn push(&self, event: &'static str) {
            self.0.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, event: &str) -> usize {
            self.events().iter().filter(|e| **e == event).count()
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum LaunchBehaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct FakeLauncher {
        journal: Journal,
        behaviour: LaunchBehaviour,
        fail_stop: bool,
    }

    #[async_trait]
    impl ServerLauncher for FakeLauncher {
        async fn launch(&self, _config: &RunConfiguration) -> AppResult<Box<dyn ServerHandle>> {
            self.journal.push("launch");
            match self.behaviour {
                LaunchBehaviour::Succeed => Ok(Box::new(FakeHandle {
                    journal: self.journal.clone(),
                    fail_stop: self.fail_stop,
                })),
                LaunchBehaviour::Fail => Err(LaunchError::BuildFailed {
                    project: "Servirtium.StandaloneServer.csproj".to_string(),
                    reason: "退出码 1".to_string(),
                }
                .into()),
                LaunchBehaviour::Panic => panic!("launcher exploded"),
                LaunchBehaviour::Hang => futures::future::pending().await,
            }
        }

        async fn abandon(&self, _config: &RunConfiguration) -> AppResult<()> {
            self.journal.push("abandon");
            Ok(())
        }
    }

    struct FakeHandle {
        journal: Journal,
        fail_stop: bool,
    }

    #[async_trait]
    impl ServerHandle for FakeHandle {
        fn identity(&self) -> ServerIdentity {
            ServerIdentity::Process { pid: 4242 }
        }

        fn sink(&self) -> PathBuf {
            PathBuf::from("logs/servirtium-playback.log")
        }

        async fn terminate(&mut self) -> AppResult<()> {
            self.journal.push("stop");
            if self.fail_stop {
                return Err(AppError::stop_failed(self.identity(), "no such process"));
            }
            Ok(())
        }
    }

    struct FakeDriver {
        journal: Journal,
        passes: Option<&'static str>,
        open_delay: Duration,
        /// 打开会话多久之后才显示 `passes`
        passes_after: Duration,
    }

    #[async_trait]
    impl BrowserDriver for FakeDriver {
        async fn open(&self, _target: &BrowserTarget) -> AppResult<Box<dyn BrowserSession>> {
            tokio::time::sleep(self.open_delay).await;
            self.journal.push("open");
            Ok(Box::new(FakeSession {
                journal: self.journal.clone(),
                passes: self.passes,
                ready_at: Instant::now() + self.passes_after,
            }))
        }
    }

    struct FakeSession {
        journal: Journal,
        passes: Option<&'static str>,
        ready_at: Instant,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&self, _url: &Url) -> AppResult<()> {
            self.journal.push("navigate");
            Ok(())
        }

        async fn text_of(&self, _selector: &str) -> AppResult<Option<String>> {
            if Instant::now() < self.ready_at {
                return Ok(Some("passes: 3".to_string()));
            }
            Ok(self.passes.map(str::to_string))
        }

        async fn close(&mut self) -> AppResult<()> {
            self.journal.push("close");
            Ok(())
        }
    }

    fn config(mode: &str, timeout_seconds: i64) -> RunConfiguration {
        RunRequest {
            mode: Some(mode.to_string()),
            backend: match mode {
                "playback" => None,
                _ => Some("http://todo-backend-sinatra.herokuapp.com".to_string()),
            },
            timeout_seconds: Some(timeout_seconds),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn launcher(journal: &Journal, behaviour: LaunchBehaviour) -> FakeLauncher {
        FakeLauncher {
            journal: journal.clone(),
            behaviour,
            fail_stop: false,
        }
    }

    fn driver(journal: &Journal, passes: Option<&'static str>) -> FakeDriver {
        FakeDriver {
            journal: journal.clone(),
            passes,
            open_delay: Duration::ZERO,
            passes_after: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_all_passed() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Succeed),
            driver(&journal, Some("passes: 16")),
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::AllPassed);
        assert_eq!(report.server, Some(ServerIdentity::Process { pid: 4242 }));
        assert_eq!(
            journal.events(),
            vec!["launch", "open", "navigate", "stop", "close"]
        );
        assert_eq!(
            report.states,
            vec![
                RunState::Idle,
                RunState::Resolved,
                RunState::Launching,
                RunState::Probing,
                RunState::Completed(RunOutcome::AllPassed),
                RunState::TornDown,
            ]
        );
        assert_eq!(report.suite_line(), "Compatibility suite: all 16 tests passed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_appearing_after_two_seconds_passes() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 20),
            launcher(&journal, LaunchBehaviour::Succeed),
            FakeDriver {
                journal: journal.clone(),
                passes: Some("passes: 16"),
                open_delay: Duration::ZERO,
                passes_after: Duration::from_secs(2),
            },
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::AllPassed);
        assert!(report.elapsed >= Duration::from_secs(2));
        assert!(report.elapsed < Duration::from_secs(3));
        assert_eq!(journal.count("stop"), 1);
        assert_eq!(journal.count("close"), 1);
        assert_eq!(
            journal.events(),
            vec!["launch", "open", "navigate", "stop", "close"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_times_out_when_marker_never_appears() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("record", 5),
            launcher(&journal, LaunchBehaviour::Succeed),
            driver(&journal, Some("passes: 12")),
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::TimedOut);
        assert!(report.elapsed >= Duration::from_secs(5));
        assert!(report.elapsed < Duration::from_secs(6));
        assert_eq!(journal.count("stop"), 1);
        assert_eq!(journal.count("close"), 1);
        assert_eq!(
            report.suite_line(),
            "Compatibility suite: did not finish with 16 passes. See open browser frame."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_never_opens_browser() {
        let journal = Journal::default();
        let mut driver = MockBrowserDriver::new();
        driver.expect_open().never();

        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Fail),
            driver,
        );
        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::LaunchFailed);
        assert!(report.summary.contains("构建"));
        assert!(report.server.is_none());
        assert_eq!(journal.events(), vec!["launch", "abandon"]);
        assert_eq!(
            &report.states[report.states.len() - 2..],
            &[RunState::Failed(RunOutcome::LaunchFailed), RunState::TornDown]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_mode_starts_no_double() {
        let journal = Journal::default();
        let mut launcher = MockServerLauncher::new();
        launcher.expect_launch().never();

        let mut coordinator = RunCoordinator::new(
            config("direct", 30),
            launcher,
            driver(&journal, Some("16")),
        );
        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::AllPassed);
        assert!(report.server.is_none());
        assert!(report.sink.is_none());
        assert!(!report.states.contains(&RunState::Launching));
        assert_eq!(journal.events(), vec!["open", "navigate", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_exactly_once() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Succeed),
            driver(&journal, Some("16")),
        );

        let first = coordinator.run().await;
        coordinator.teardown().await;
        let second = coordinator.run().await;

        assert_eq!(first.outcome, second.outcome);
        assert_eq!(journal.count("launch"), 1);
        assert_eq!(journal.count("stop"), 1);
        assert_eq!(journal.count("close"), 1);
        assert_eq!(
            coordinator
                .states()
                .iter()
                .filter(|s| **s == RunState::TornDown)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_still_closes_browser() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            FakeLauncher {
                journal: journal.clone(),
                behaviour: LaunchBehaviour::Succeed,
                fail_stop: true,
            },
            driver(&journal, Some("16")),
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::AllPassed);
        assert_eq!(journal.events(), vec!["launch", "open", "navigate", "stop", "close"]);
        assert_eq!(coordinator.state(), RunState::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launcher_panic_is_launch_failure() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Panic),
            driver(&journal, Some("16")),
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::LaunchFailed);
        assert!(report.summary.contains("launcher exploded"));
        assert_eq!(journal.events(), vec!["launch", "abandon"]);
        assert_eq!(coordinator.state(), RunState::TornDown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_browser_open_is_probe_failure() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Succeed),
            FakeDriver {
                journal: journal.clone(),
                passes: Some("16"),
                open_delay: Duration::from_secs(120),
                passes_after: Duration::ZERO,
            },
        );

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::ProbeFailed);
        assert!(report.summary.contains("60"));
        assert_eq!(journal.events(), vec!["launch", "stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_probe_tears_down() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Succeed),
            driver(&journal, None),
        )
        .with_interrupt(tokio::time::sleep(Duration::from_secs(1)));

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::ProbeFailed);
        assert!(report.summary.contains("中断"));
        assert!(report.elapsed < Duration::from_secs(2));
        assert_eq!(journal.count("stop"), 1);
        assert_eq!(journal.count("close"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_launch_abandons_the_double() {
        let journal = Journal::default();
        let mut driver = MockBrowserDriver::new();
        driver.expect_open().never();

        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Hang),
            driver,
        )
        .with_interrupt(tokio::time::sleep(Duration::from_millis(400)));

        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::LaunchFailed);
        assert!(report.server.is_none());
        assert_eq!(journal.events(), vec!["launch", "abandon"]);
        assert_eq!(coordinator.state(), RunState::TornDown);
    }

    #[tokio::test]
    async fn test_teardown_before_run_ends_the_coordinator() {
        let journal = Journal::default();
        let mut coordinator = RunCoordinator::new(
            config("playback", 30),
            launcher(&journal, LaunchBehaviour::Succeed),
            driver(&journal, Some("16")),
        );

        coordinator.teardown().await;
        let report = coordinator.run().await;

        assert_eq!(report.outcome, RunOutcome::ProbeFailed);
        assert!(journal.events().is_empty());
    }
}
