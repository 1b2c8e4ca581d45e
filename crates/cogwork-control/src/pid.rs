//! PID 控制器
//!
//! 经典的 P/I/D 三项控制器，附加前馈项 F（F × setpoint）和积分抗饱和。
//!
//! # 并发模型
//!
//! - 调参状态（[`PidTuning`]）由一把 `parking_lot::Mutex` 保护，setter 只做写入
//! - 每个周期：持锁取快照 → 无锁计算和端口 IO → 持锁发布结果
//! - 端口位于另一把锁之后，只有 step 会触碰；慢硬件调用不会阻塞 setter
//!
//! # 算法（每个周期）
//!
//! ```text
//! input  = clamp(read(), minInput, maxInput)
//! error  = setpoint - input
//! total  = anti_windup(total + error)          // I == 0 时跳过
//! output = P·error + I·total + D·(error - prevError) + F·setpoint
//! output = clamp(output, minOutput, maxOutput)
//! ```
//!
//! # 示例
//!
//! ```rust,no_run
//! use cogwork_control::PidController;
//! use cogwork_driver::{Controllable, ScheduleConfig};
//! use cogwork_port::mock::{MockInput, MockOutput};
//! use std::time::Duration;
//!
//! let pid = PidController::builder(MockInput::new(0.0), MockOutput::new())
//!     .gains(0.8, 0.05, 0.1)
//!     .output_range(-0.5, 0.5)
//!     .tolerance(0.2)
//!     .schedule(ScheduleConfig::new(Duration::from_millis(10)))
//!     .build()?;
//!
//! pid.set_setpoint(42.0);
//! pid.enable();
//! // ...
//! pid.disable();
//! # Ok::<(), cogwork_control::ControlError>(())
//! ```

use crate::config::PidSection;
use crate::error::ControlError;
use crate::read_finite;
use cogwork_driver::{
    ActiveLoop, Controllable, DriverError, LifecycleState, LoopMetricsSnapshot, PeriodicScheduler,
    ScheduleConfig, Step, check_range,
};
use cogwork_port::{Input, Output};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

/// PID 调参与运行状态
///
/// 一个普通的 `Copy` 结构体：step 在锁内整体复制一份快照，
/// 计算期间不持有锁。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTuning {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// 前馈系数（乘以 setpoint）
    pub f: f64,
    pub setpoint: f64,
    pub min_input: f64,
    pub max_input: f64,
    pub min_output: f64,
    pub max_output: f64,
    /// 绝对容差（`|error| < tolerance` 视为到达目标）
    pub tolerance: f64,
    /// 积分累计误差
    pub total_error: f64,
    /// 上一周期误差
    pub prev_error: f64,
    /// 上一周期输出
    pub prev_result: f64,
}

impl Default for PidTuning {
    fn default() -> Self {
        Self {
            p: 0.0,
            i: 0.0,
            d: 0.0,
            f: 0.0,
            setpoint: 0.0,
            min_input: f64::NEG_INFINITY,
            max_input: f64::INFINITY,
            min_output: -1.0,
            max_output: 1.0,
            tolerance: 0.0,
            total_error: 0.0,
            prev_error: 0.0,
            prev_result: 0.0,
        }
    }
}

/// 单个周期的计算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutcome {
    /// 本周期误差
    pub error: f64,
    /// 抗饱和处理后的积分累计
    pub total_error: f64,
    /// 限幅后的输出
    pub output: f64,
}

impl PidTuning {
    /// 基于当前快照计算一个周期
    ///
    /// 纯函数：不修改 `self`，调用方负责把结果发布回共享状态。
    ///
    /// # Panics
    ///
    /// `min_input > max_input`、`min_output > max_output` 或任一边界为 NaN 时 panic。
    /// 控制器的 setter 会拒绝这样的范围，只有直接构造的快照才可能触发。
    pub fn compute(&self, reading: f64) -> PidOutcome {
        debug_assert!(
            self.min_input <= self.max_input,
            "PID input range inverted: [{}, {}]",
            self.min_input,
            self.max_input
        );
        debug_assert!(
            self.min_output <= self.max_output,
            "PID output range inverted: [{}, {}]",
            self.min_output,
            self.max_output
        );
        let input = reading.clamp(self.min_input, self.max_input);
        let error = self.setpoint - input;

        let mut total_error = self.total_error;
        if self.i != 0.0 {
            let candidate = total_error + error;
            let candidate_gain = self.i * candidate;
            total_error = if candidate_gain > self.max_output {
                self.max_output / self.i
            } else if candidate_gain < self.min_output {
                self.min_output / self.i
            } else {
                candidate
            };
        }

        let raw = self.p * error
            + self.i * total_error
            + self.d * (error - self.prev_error)
            + self.f * self.setpoint;
        // 非有限增益可能产生 NaN，此时退化为零输出
        let raw = if raw.is_nan() { 0.0 } else { raw };

        PidOutcome {
            error,
            total_error,
            output: raw.clamp(self.min_output, self.max_output),
        }
    }

    /// 是否到达目标（严格小于，容差为 0 时恒为 false）
    pub fn on_target(&self) -> bool {
        self.prev_error.abs() < self.tolerance
    }
}

struct PidPorts<I, O> {
    input: I,
    output: O,
}

/// PID 周期任务（调度器驱动的那一半）
struct PidCore<I, O> {
    tuning: Mutex<PidTuning>,
    ports: Mutex<PidPorts<I, O>>,
}

impl<I: Input + 'static, O: Output + 'static> Step for PidCore<I, O> {
    fn step(&self) -> Result<(), DriverError> {
        let mut ports = self.ports.lock();
        let snapshot = *self.tuning.lock();

        let reading = match read_finite(&mut ports.input) {
            Ok(value) => value,
            Err(e) => {
                // 读数不可用时退化为零输出，而不是保留旧指令
                if let Err(write_err) = ports.output.set(0.0) {
                    warn!("Failed to command zero output after input failure: {}", write_err);
                }
                return Err(e.into());
            },
        };

        let outcome = snapshot.compute(reading);
        ports.output.set(outcome.output)?;

        {
            let mut tuning = self.tuning.lock();
            tuning.prev_error = outcome.error;
            tuning.total_error = outcome.total_error;
            tuning.prev_result = outcome.output;
        }

        trace!(
            "pid step: input={:.4} error={:.4} output={:.4}",
            reading, outcome.error, outcome.output
        );
        Ok(())
    }

    fn on_stop(&self) -> Result<(), DriverError> {
        self.ports.lock().output.set(0.0)?;
        Ok(())
    }
}

/// 非有限值不写入，只告警
fn accept_finite(name: &str, value: f64) -> bool {
    if value.is_finite() {
        true
    } else {
        warn!("Ignoring non-finite PID {}: {}", name, value);
        false
    }
}

/// PID 控制器
///
/// 泛型于输入/输出端口类型；构造后端口不可更换。
/// 所有方法都接受 `&self`，可以从任意线程调用（通常包在 `Arc` 里共享）。
pub struct PidController<I: Input + 'static, O: Output + 'static> {
    scheduler: PeriodicScheduler<PidCore<I, O>>,
}

impl<I: Input + 'static, O: Output + 'static> PidController<I, O> {
    /// 以默认调参创建控制器
    pub fn new(input: I, output: O, schedule: ScheduleConfig) -> Result<Self, ControlError> {
        Self::with_tuning(input, output, PidTuning::default(), schedule)
    }

    /// 创建构建器
    pub fn builder(input: I, output: O) -> PidBuilder<I, O> {
        PidBuilder::new(input, output)
    }

    fn with_tuning(
        input: I,
        output: O,
        tuning: PidTuning,
        schedule: ScheduleConfig,
    ) -> Result<Self, ControlError> {
        check_range(tuning.min_input, tuning.max_input)?;
        check_range(tuning.min_output, tuning.max_output)?;

        let core = Arc::new(PidCore {
            tuning: Mutex::new(tuning),
            ports: Mutex::new(PidPorts { input, output }),
        });
        let scheduler = PeriodicScheduler::new(core, schedule)?;
        Ok(Self { scheduler })
    }

    fn core(&self) -> &PidCore<I, O> {
        self.scheduler.step()
    }

    /// 在调用线程上同步执行一个周期
    ///
    /// 与后台回路互斥（共享端口锁），适合测试和离线仿真。
    pub fn step_once(&self) -> Result<(), ControlError> {
        self.core().step().map_err(ControlError::from)
    }

    // ==================== 调参 ====================

    pub fn set_p(&self, p: f64) {
        if accept_finite("P", p) {
            self.core().tuning.lock().p = p;
        }
    }

    pub fn set_i(&self, i: f64) {
        if accept_finite("I", i) {
            self.core().tuning.lock().i = i;
        }
    }

    pub fn set_d(&self, d: f64) {
        if accept_finite("D", d) {
            self.core().tuning.lock().d = d;
        }
    }

    /// 同时设置 P/I/D（同一把锁内，step 不会看到一半更新的增益）
    pub fn set_pid(&self, p: f64, i: f64, d: f64) {
        if accept_finite("P", p) && accept_finite("I", i) && accept_finite("D", d) {
            let mut tuning = self.core().tuning.lock();
            tuning.p = p;
            tuning.i = i;
            tuning.d = d;
        }
    }

    pub fn set_f(&self, f: f64) {
        if accept_finite("F", f) {
            self.core().tuning.lock().f = f;
        }
    }

    /// 设置目标值（立即限制到输入范围内）
    pub fn set_setpoint(&self, setpoint: f64) {
        if !accept_finite("setpoint", setpoint) {
            return;
        }
        let mut tuning = self.core().tuning.lock();
        tuning.setpoint = setpoint.clamp(tuning.min_input, tuning.max_input);
    }

    /// 设置输入范围
    ///
    /// 拒绝 `min > max`；当前 setpoint 会被重新限制到新范围。
    pub fn set_input_range(&self, min: f64, max: f64) -> Result<(), ControlError> {
        check_range(min, max)?;
        let mut tuning = self.core().tuning.lock();
        tuning.min_input = min;
        tuning.max_input = max;
        tuning.setpoint = tuning.setpoint.clamp(min, max);
        Ok(())
    }

    /// 设置输出范围（拒绝 `min > max`）
    pub fn set_output_range(&self, min: f64, max: f64) -> Result<(), ControlError> {
        check_range(min, max)?;
        let mut tuning = self.core().tuning.lock();
        tuning.min_output = min;
        tuning.max_output = max;
        Ok(())
    }

    pub fn set_tolerance(&self, tolerance: f64) {
        if accept_finite("tolerance", tolerance) {
            self.core().tuning.lock().tolerance = tolerance;
        }
    }

    /// 清零积分累计、上一误差和上一输出
    pub fn reset(&self) {
        let mut tuning = self.core().tuning.lock();
        tuning.total_error = 0.0;
        tuning.prev_error = 0.0;
        tuning.prev_result = 0.0;
    }

    // ==================== 遥测 ====================

    /// 最近一个周期的误差（从未运行时为 0.0）
    pub fn error(&self) -> f64 {
        self.core().tuning.lock().prev_error
    }

    pub fn setpoint(&self) -> f64 {
        self.core().tuning.lock().setpoint
    }

    /// 最近一个周期写出的指令（从未运行时为 0.0）
    pub fn prev_result(&self) -> f64 {
        self.core().tuning.lock().prev_result
    }

    pub fn total_error(&self) -> f64 {
        self.core().tuning.lock().total_error
    }

    pub fn on_target(&self) -> bool {
        self.core().tuning.lock().on_target()
    }

    /// 当前调参与运行状态的完整快照
    pub fn tuning(&self) -> PidTuning {
        *self.core().tuning.lock()
    }

    // ==================== 调度 ====================

    pub fn lifecycle(&self) -> LifecycleState {
        self.scheduler.lifecycle()
    }

    pub fn active_loop(&self) -> Result<ActiveLoop, DriverError> {
        self.scheduler.active_loop()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.scheduler.metrics()
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        self.scheduler.config()
    }
}

impl<I: Input + 'static, O: Output + 'static> Controllable for PidController<I, O> {
    fn enable(&self) -> bool {
        self.scheduler.enable()
    }

    fn disable(&self) -> bool {
        self.scheduler.disable()
    }

    fn is_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }
}

/// PID 控制器构建器
///
/// 所有范围在 [`build`](Self::build) 时统一校验。
pub struct PidBuilder<I, O> {
    input: I,
    output: O,
    tuning: PidTuning,
    schedule: ScheduleConfig,
}

impl<I: Input + 'static, O: Output + 'static> PidBuilder<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            tuning: PidTuning::default(),
            schedule: ScheduleConfig::default().with_name("cogwork-pid"),
        }
    }

    pub fn gains(mut self, p: f64, i: f64, d: f64) -> Self {
        self.tuning.p = p;
        self.tuning.i = i;
        self.tuning.d = d;
        self
    }

    pub fn feed_forward(mut self, f: f64) -> Self {
        self.tuning.f = f;
        self
    }

    pub fn setpoint(mut self, setpoint: f64) -> Self {
        self.tuning.setpoint = setpoint;
        self
    }

    pub fn input_range(mut self, min: f64, max: f64) -> Self {
        self.tuning.min_input = min;
        self.tuning.max_input = max;
        self
    }

    pub fn output_range(mut self, min: f64, max: f64) -> Self {
        self.tuning.min_output = min;
        self.tuning.max_output = max;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tuning.tolerance = tolerance;
        self
    }

    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// 应用配置文件中的 `[pid]` 段
    pub fn with_section(mut self, section: &PidSection) -> Self {
        self = self
            .gains(section.p, section.i, section.d)
            .feed_forward(section.f)
            .setpoint(section.setpoint)
            .output_range(section.output_range[0], section.output_range[1])
            .tolerance(section.tolerance);
        if let Some([min, max]) = section.input_range {
            self = self.input_range(min, max);
        }
        self
    }

    /// 构建控制器
    ///
    /// # 错误
    ///
    /// - 任一增益、setpoint 或容差不是有限值
    /// - 输入/输出范围 `min > max`
    /// - 调度配置无效
    pub fn build(self) -> Result<PidController<I, O>, ControlError> {
        let t = &self.tuning;
        for (name, value) in [
            ("p", t.p),
            ("i", t.i),
            ("d", t.d),
            ("f", t.f),
            ("setpoint", t.setpoint),
            ("tolerance", t.tolerance),
        ] {
            if !value.is_finite() {
                return Err(DriverError::InvalidArgument(format!(
                    "PID {} must be finite, got {}",
                    name, value
                ))
                .into());
            }
        }
        check_range(t.min_input, t.max_input)?;

        let mut tuning = self.tuning;
        tuning.setpoint = tuning.setpoint.clamp(tuning.min_input, tuning.max_input);
        PidController::with_tuning(self.input, self.output, tuning, self.schedule)
    }
}
