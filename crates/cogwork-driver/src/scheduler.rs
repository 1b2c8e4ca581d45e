//! 周期调度器
//!
//! 每个启用的控制器独占一个控制线程，按配置的周期反复调用一次 [`Step`]。
//!
//! # 线程模型
//!
//! ```text
//! 调用方线程                      控制线程（每个控制器一个）
//! ──────────                      ─────────────────────────
//! enable()  ── spawn ──────────►  loop {
//!                                   等待截止时间（可被 disable 立即唤醒）
//!                                   gate.lock()
//!                                   检查 is_running
//!                                   step()    ← 错误/panic 被捕获并记录
//!                                 }
//!                                 on_stop()
//! disable() ── is_running=false ─► 唤醒并退出
//!           ◄─ join（带超时） ────
//! ```
//!
//! # 保证
//!
//! - 同一调度器同时最多只有一个活动回路，重复 `enable()` 不会启动第二个线程
//! - 同一调度器的 step 严格串行，即使跨越 disable/enable 也不会重叠
//! - `disable()` 不会打断正在执行的 step；join 成功返回后该回路不再执行任何 step
//! - 并发的多个 `disable()` 中，任何一个返回时正在执行的 step 都已结束，之后也不会再开始新的 step
//! - 单次 step 失败不会终止回路

use crate::error::DriverError;
use crate::lifecycle::{AtomicLifecycleState, Controllable, LifecycleState};
use crate::metrics::{LoopMetrics, LoopMetricsSnapshot};
use crate::schedule::{Discipline, ScheduleConfig, WaitStrategy};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

/// Spin 等待时的单次最长休眠，保证 disable 的响应性
const SPIN_SLICE: Duration = Duration::from_millis(2);

thread_local! {
    /// 当前线程正在持有的 gate 地址（0 表示没有）
    static HELD_GATE: Cell<usize> = const { Cell::new(0) };
}

/// 一次控制步
///
/// 在控制线程上被周期性调用。实现必须短小且不阻塞：
/// 周期性只有在 step 耗时远小于周期时才有保证。
pub trait Step: Send + Sync + 'static {
    /// 执行一次控制步
    ///
    /// 返回的错误由调度器记录，不会终止回路。
    fn step(&self) -> Result<(), DriverError>;

    /// 回路退出时在控制线程上调用一次（可选）
    ///
    /// 控制器通常在这里写入安全输出（0）。
    fn on_stop(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// 活动回路信息（仅在启用时可用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLoop {
    /// 控制线程 ID
    pub thread_id: ThreadId,
    /// 控制线程名称
    pub thread_name: Option<String>,
    /// 回路启动时间
    pub started_at: Instant,
    /// 回路代数（每次 enable 递增）
    pub generation: u64,
}

/// 运行中回路的句柄
struct LoopHandle {
    is_running: Arc<AtomicBool>,
    /// Drop 后控制线程的等待立即返回 `Disconnected`
    cancel_tx: Sender<()>,
    /// 控制线程退出时 Sender 被 drop（包括 panic 展开）
    exited_rx: Receiver<()>,
    thread: JoinHandle<()>,
    started_at: Instant,
    generation: u64,
}

impl LoopHandle {
    /// 带超时的 join
    ///
    /// 借助退出信号 channel 实现，不需要额外的看门狗线程。
    fn join_timeout(self, timeout: Duration) -> Result<(), DriverError> {
        drop(self.cancel_tx);
        match self.exited_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self
                .thread
                .join()
                .map_err(|_| DriverError::LoopThread("control thread panicked".to_string())),
            Err(RecvTimeoutError::Timeout) => Err(DriverError::JoinTimeout(timeout)),
        }
    }
}

/// 控制线程持有的上下文
struct LoopContext<S: Step> {
    step: Arc<S>,
    config: ScheduleConfig,
    is_running: Arc<AtomicBool>,
    cancel_rx: Receiver<()>,
    _exited_tx: Sender<()>,
    gate: Arc<Mutex<()>>,
    metrics: Arc<LoopMetrics>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
}

/// 周期调度器
///
/// 持有一个 [`Step`]，在启用期间以固定周期在专用线程上执行它。
///
/// # 示例
///
/// ```rust
/// use cogwork_driver::{Controllable, DriverError, PeriodicScheduler, ScheduleConfig, Step};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counter(AtomicU64);
///
/// impl Step for Counter {
///     fn step(&self) -> Result<(), DriverError> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// let counter = Arc::new(Counter::default());
/// let scheduler =
///     PeriodicScheduler::new(counter.clone(), ScheduleConfig::new(Duration::from_millis(5)))?;
///
/// assert!(scheduler.enable());
/// std::thread::sleep(Duration::from_millis(30));
/// assert!(scheduler.disable());
/// assert!(counter.0.load(Ordering::Relaxed) > 0);
/// # Ok::<(), DriverError>(())
/// ```
pub struct PeriodicScheduler<S: Step> {
    config: ScheduleConfig,
    step: Arc<S>,
    handle: Mutex<Option<LoopHandle>>,
    /// step 互斥门：保证同一调度器的 step 永不重叠
    gate: Arc<Mutex<()>>,
    metrics: Arc<LoopMetrics>,
    state: AtomicLifecycleState,
    generation: Arc<AtomicU64>,
}

impl<S: Step> PeriodicScheduler<S> {
    /// 创建调度器（不启动线程）
    ///
    /// # 错误
    ///
    /// - `DriverError::InvalidConfig`: 周期为 0
    pub fn new(step: Arc<S>, config: ScheduleConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            config,
            step,
            handle: Mutex::new(None),
            gate: Arc::new(Mutex::new(())),
            metrics: Arc::new(LoopMetrics::new()),
            state: AtomicLifecycleState::new(LifecycleState::Constructed),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn discipline(&self) -> Discipline {
        self.config.discipline
    }

    /// 被调度的 step
    pub fn step(&self) -> &Arc<S> {
        &self.step
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.get(Ordering::Acquire)
    }

    /// 获取指标快照
    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// 获取活动回路信息
    ///
    /// # 错误
    ///
    /// - `DriverError::NotEnabled`: 调度器未启用
    pub fn active_loop(&self) -> Result<ActiveLoop, DriverError> {
        let slot = self.handle.lock();
        match slot.as_ref() {
            Some(handle) if !handle.thread.is_finished() => Ok(ActiveLoop {
                thread_id: handle.thread.thread().id(),
                thread_name: handle.thread.thread().name().map(str::to_string),
                started_at: handle.started_at,
                generation: handle.generation,
            }),
            _ => Err(DriverError::NotEnabled),
        }
    }

    fn spawn_loop(&self) -> Result<LoopHandle, DriverError> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let is_running = Arc::new(AtomicBool::new(true));
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let (exited_tx, exited_rx) = crossbeam_channel::bounded::<()>(0);

        let ctx = LoopContext {
            step: self.step.clone(),
            config: self.config.clone(),
            is_running: is_running.clone(),
            cancel_rx,
            _exited_tx: exited_tx,
            gate: self.gate.clone(),
            metrics: self.metrics.clone(),
            current_generation: self.generation.clone(),
            generation,
        };

        let thread = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || run_loop(ctx))
            .map_err(|e| DriverError::LoopThread(e.to_string()))?;

        Ok(LoopHandle {
            is_running,
            cancel_tx,
            exited_rx,
            thread,
            started_at: Instant::now(),
            generation,
        })
    }
}

impl<S: Step> Controllable for PeriodicScheduler<S> {
    fn enable(&self) -> bool {
        let mut slot = self.handle.lock();

        if let Some(handle) = slot.as_ref() {
            if !handle.thread.is_finished() {
                // 已在运行：不启动第二个回路
                return true;
            }
            warn!(
                "{}: control thread exited unexpectedly, restarting",
                self.config.name
            );
            if let Some(stale) = slot.take() {
                let _ = stale.thread.join();
            }
        }

        match self.spawn_loop() {
            Ok(handle) => {
                *slot = Some(handle);
                self.state.set(LifecycleState::Running, Ordering::Release);
                true
            },
            Err(e) => {
                error!("{}: failed to start control thread: {}", self.config.name, e);
                false
            },
        }
    }

    fn disable(&self) -> bool {
        let handle = {
            let mut slot = self.handle.lock();
            let handle = slot.take();
            if let Some(handle) = &handle {
                // 在释放 slot 锁之前清除，并发的 disable 拿到 None 时回路已被叫停
                // Release: 控制线程看到 false 时也能看到之前的所有写入
                handle.is_running.store(false, Ordering::Release);
                self.state.set(LifecycleState::Stopped, Ordering::Release);
            }
            handle
        };

        let Some(handle) = handle else {
            // 另一个调用者正在停止回路：等正在执行的 step 结束再返回
            self.wait_for_in_flight_step();
            return true;
        };

        if handle.thread.thread().id() == thread::current().id() {
            // 在 step 内部禁用自身：不能 join 自己，回路会在本次 step 后退出
            trace!("{}: disabled from inside its own step", self.config.name);
            return true;
        }

        let timeout = self.config.join_timeout;
        if let Err(e) = handle.join_timeout(timeout) {
            error!(
                "{}: control thread failed to shut down cleanly: {}",
                self.config.name, e
            );
        }
        true
    }

    fn is_enabled(&self) -> bool {
        self.lifecycle().is_running()
    }
}

impl<S: Step> PeriodicScheduler<S> {
    fn wait_for_in_flight_step(&self) {
        let gate_id = Arc::as_ptr(&self.gate) as usize;
        // 在本调度器的 step 内部调用时，gate 已被当前线程持有
        if HELD_GATE.with(|held| held.get()) == gate_id {
            return;
        }
        drop(self.gate.lock());
    }
}

impl<S: Step> Drop for PeriodicScheduler<S> {
    fn drop(&mut self) {
        self.disable();
    }
}

/// 控制线程主循环
fn run_loop<S: Step>(ctx: LoopContext<S>) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("{}: thread priority set to MAX (realtime)", ctx.config.name);
            },
            Err(e) => {
                warn!(
                    "{}: failed to set thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    ctx.config.name, e
                );
            },
        }
    }

    let name = ctx.config.name.as_str();
    let period = ctx.config.period;
    let discipline = ctx.config.discipline;
    let sleeper = SpinSleeper::default();

    info!(
        "{}: control loop started (generation {}, {:?}, period {:?})",
        name, ctx.generation, discipline, period
    );

    // 第一次 step 立即执行；FixedRate 以此为时间网格原点
    let mut next_start = Instant::now();
    let mut iteration: u64 = 0;
    let gate_id = Arc::as_ptr(&ctx.gate) as usize;

    loop {
        if iteration > 0
            && discipline == Discipline::FixedRate
            && Instant::now() > next_start
        {
            // 已落后于时间网格：不等待，立即开始
            ctx.metrics.catch_up_starts.fetch_add(1, Ordering::Relaxed);
        }

        if !wait_until(&ctx, next_start, &sleeper) {
            break;
        }

        let gate = ctx.gate.lock();
        // Acquire: 看到 false 时也能看到 disable 之前的所有写入
        if !ctx.is_running.load(Ordering::Acquire) {
            break;
        }

        let started = Instant::now();
        ctx.metrics.steps_total.fetch_add(1, Ordering::Relaxed);
        HELD_GATE.with(|held| held.set(gate_id));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.step.step()));
        HELD_GATE.with(|held| held.set(0));
        match outcome {
            Ok(Ok(())) => trace!("{}: step {} done", name, iteration),
            Ok(Err(e)) => {
                ctx.metrics.step_errors.fetch_add(1, Ordering::Relaxed);
                warn!("{}: step {} failed: {}", name, iteration, e);
            },
            Err(payload) => {
                ctx.metrics.step_panics.fetch_add(1, Ordering::Relaxed);
                error!(
                    "{}: step {} panicked: {}",
                    name,
                    iteration,
                    panic_message(payload.as_ref())
                );
            },
        }
        let finished = Instant::now();
        drop(gate);

        ctx.metrics.record_step_duration(finished - started, period);
        iteration += 1;

        next_start = match discipline {
            Discipline::FixedDelay => finished + period,
            Discipline::FixedRate => next_start + period,
        };
    }

    {
        let _gate = ctx.gate.lock();
        // 已有更新的回路接管时，不再写安全输出
        if ctx.current_generation.load(Ordering::Acquire) == ctx.generation {
            HELD_GATE.with(|held| held.set(gate_id));
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.step.on_stop()));
            HELD_GATE.with(|held| held.set(0));
            match outcome {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!("{}: on_stop failed: {}", name, e),
                Err(payload) => error!(
                    "{}: on_stop panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }

    info!("{}: control loop stopped after {} steps", name, iteration);
}

/// 等待到截止时间
///
/// 返回 `false` 表示回路已被取消。
fn wait_until<S: Step>(ctx: &LoopContext<S>, deadline: Instant, sleeper: &SpinSleeper) -> bool {
    match ctx.config.wait {
        WaitStrategy::Park => match ctx.cancel_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Disconnected) => false,
            Ok(()) | Err(RecvTimeoutError::Timeout) => ctx.is_running.load(Ordering::Acquire),
        },
        WaitStrategy::Spin => loop {
            if !ctx.is_running.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            sleeper.sleep((deadline - now).min(SPIN_SLICE));
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
