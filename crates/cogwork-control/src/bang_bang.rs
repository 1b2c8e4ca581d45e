//! Bang-Bang 控制器
//!
//! 开/关式控制：低于目标时全速驱动，达到或超过目标时输出 0。
//! 适用于飞轮、加热器这类二值驱动比比例控制更简单可靠的负载。
//!
//! # 模式
//!
//! | 模式      | 条件                     | 输出              |
//! |-----------|--------------------------|-------------------|
//! | coast     | 无条件                   | 0                 |
//! | speed-up  | input ≥ setpoint         | 0                 |
//! |           | input ≥ spinupInput      | ±maxOutput        |
//! |           | 否则                     | ±spinupOutput     |
//! | plain     | input ≥ setpoint         | 0                 |
//! |           | 否则                     | ±maxOutput        |
//!
//! 符号由 `reversed` 决定；写出前统一限幅到 `[-maxOutput, +maxOutput]`。

use crate::config::BangBangSection;
use crate::error::ControlError;
use crate::read_finite;
use cogwork_driver::{
    ActiveLoop, Controllable, DriverError, LifecycleState, LoopMetricsSnapshot, PeriodicScheduler,
    ScheduleConfig, Step,
};
use cogwork_port::{Input, Output};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

/// Bang-Bang 调参与运行状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BangBangSettings {
    pub setpoint: f64,
    /// 最大输出幅值（≥ 0）
    pub max_output: f64,
    pub reversed: bool,
    /// 滑行：无条件输出 0
    pub coast: bool,
    /// 启用分段加速（低于 spinup_input 时只输出 spinup_output）
    pub speed_up: bool,
    pub spinup_input: f64,
    /// 加速段输出幅值（≥ 0）
    pub spinup_output: f64,
    /// 绝对容差
    pub tolerance: f64,
    /// 最近一次读数
    pub prev_input: f64,
    /// 最近一次输出
    pub prev_output: f64,
}

impl Default for BangBangSettings {
    fn default() -> Self {
        Self {
            setpoint: 0.0,
            max_output: 1.0,
            reversed: false,
            coast: false,
            speed_up: false,
            spinup_input: 0.0,
            spinup_output: 0.0,
            tolerance: 0.0,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }
}

impl BangBangSettings {
    /// 根据读数计算输出指令
    ///
    /// # Panics
    ///
    /// `max_output` 为负数或 NaN 时 panic；控制器的 setter 会拒绝这样的值。
    pub fn compute(&self, input: f64) -> f64 {
        debug_assert!(
            self.max_output >= 0.0,
            "bang-bang max_output must be >= 0, got {}",
            self.max_output
        );
        let magnitude = if self.coast || input >= self.setpoint {
            0.0
        } else if self.speed_up && input < self.spinup_input {
            self.spinup_output
        } else {
            self.max_output
        };

        let signed = if self.reversed { -magnitude } else { magnitude };
        signed.clamp(-self.max_output, self.max_output)
    }

    /// `|setpoint - prevInput| < tolerance`
    pub fn on_target(&self) -> bool {
        (self.setpoint - self.prev_input).abs() < self.tolerance
    }
}

fn check_magnitude(name: &str, value: f64) -> Result<(), DriverError> {
    if value.is_nan() || value < 0.0 {
        return Err(DriverError::InvalidArgument(format!(
            "{} must be >= 0, got {}",
            name, value
        )));
    }
    Ok(())
}

struct BangBangPorts<I, O> {
    input: I,
    output: O,
}

/// Bang-Bang 周期任务
struct BangBangCore<I, O> {
    settings: Mutex<BangBangSettings>,
    ports: Mutex<BangBangPorts<I, O>>,
}

impl<I: Input + 'static, O: Output + 'static> Step for BangBangCore<I, O> {
    fn step(&self) -> Result<(), DriverError> {
        let mut ports = self.ports.lock();
        let snapshot = *self.settings.lock();

        let input = match read_finite(&mut ports.input) {
            Ok(value) => value,
            Err(e) => {
                if let Err(write_err) = ports.output.set(0.0) {
                    warn!("Failed to command zero output after input failure: {}", write_err);
                }
                return Err(e.into());
            },
        };

        let output = snapshot.compute(input);
        ports.output.set(output)?;

        {
            let mut settings = self.settings.lock();
            settings.prev_input = input;
            settings.prev_output = output;
        }

        trace!("bang-bang step: input={:.4} output={:.4}", input, output);
        Ok(())
    }

    fn on_stop(&self) -> Result<(), DriverError> {
        self.ports.lock().output.set(0.0)?;
        Ok(())
    }
}

/// Bang-Bang 控制器
pub struct BangBangController<I: Input + 'static, O: Output + 'static> {
    scheduler: PeriodicScheduler<BangBangCore<I, O>>,
}

impl<I: Input + 'static, O: Output + 'static> BangBangController<I, O> {
    pub fn new(input: I, output: O, schedule: ScheduleConfig) -> Result<Self, ControlError> {
        Self::with_settings(input, output, BangBangSettings::default(), schedule)
    }

    pub fn builder(input: I, output: O) -> BangBangBuilder<I, O> {
        BangBangBuilder::new(input, output)
    }

    fn with_settings(
        input: I,
        output: O,
        settings: BangBangSettings,
        schedule: ScheduleConfig,
    ) -> Result<Self, ControlError> {
        check_magnitude("max_output", settings.max_output)?;
        check_magnitude("spinup_output", settings.spinup_output)?;

        let core = Arc::new(BangBangCore {
            settings: Mutex::new(settings),
            ports: Mutex::new(BangBangPorts { input, output }),
        });
        Ok(Self {
            scheduler: PeriodicScheduler::new(core, schedule)?,
        })
    }

    fn core(&self) -> &BangBangCore<I, O> {
        self.scheduler.step()
    }

    /// 在调用线程上同步执行一个周期
    pub fn step_once(&self) -> Result<(), ControlError> {
        self.core().step().map_err(ControlError::from)
    }

    pub fn set_setpoint(&self, setpoint: f64) {
        if !setpoint.is_finite() {
            warn!("Ignoring non-finite bang-bang setpoint: {}", setpoint);
            return;
        }
        self.core().settings.lock().setpoint = setpoint;
    }

    /// 设置最大输出幅值（拒绝负数和 NaN）
    pub fn set_max_speed(&self, max_output: f64) -> Result<(), ControlError> {
        check_magnitude("max_output", max_output)?;
        self.core().settings.lock().max_output = max_output;
        Ok(())
    }

    pub fn set_coast(&self, coast: bool) {
        self.core().settings.lock().coast = coast;
    }

    pub fn set_speed_up(&self, speed_up: bool) {
        self.core().settings.lock().speed_up = speed_up;
    }

    pub fn set_spinup_input(&self, spinup_input: f64) {
        if !spinup_input.is_finite() {
            warn!("Ignoring non-finite bang-bang spinup input: {}", spinup_input);
            return;
        }
        self.core().settings.lock().spinup_input = spinup_input;
    }

    /// 设置加速段输出幅值（拒绝负数和 NaN）
    pub fn set_spinup_output(&self, spinup_output: f64) -> Result<(), ControlError> {
        check_magnitude("spinup_output", spinup_output)?;
        self.core().settings.lock().spinup_output = spinup_output;
        Ok(())
    }

    pub fn set_reversed(&self, reversed: bool) {
        self.core().settings.lock().reversed = reversed;
    }

    /// 翻转方向（重复调用交替切换）
    pub fn reverse(&self) {
        let mut settings = self.core().settings.lock();
        settings.reversed = !settings.reversed;
    }

    pub fn set_tolerance(&self, tolerance: f64) {
        if tolerance.is_nan() {
            warn!("Ignoring NaN bang-bang tolerance");
            return;
        }
        self.core().settings.lock().tolerance = tolerance;
    }

    pub fn setpoint(&self) -> f64 {
        self.core().settings.lock().setpoint
    }

    /// 最近一次读数（从未运行时为 0.0）
    pub fn input(&self) -> f64 {
        self.core().settings.lock().prev_input
    }

    /// 最近一次写出的指令（从未运行时为 0.0）
    pub fn output(&self) -> f64 {
        self.core().settings.lock().prev_output
    }

    pub fn on_target(&self) -> bool {
        self.core().settings.lock().on_target()
    }

    pub fn settings(&self) -> BangBangSettings {
        *self.core().settings.lock()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.scheduler.lifecycle()
    }

    pub fn active_loop(&self) -> Result<ActiveLoop, DriverError> {
        self.scheduler.active_loop()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.scheduler.metrics()
    }
}

impl<I: Input + 'static, O: Output + 'static> Controllable for BangBangController<I, O> {
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

/// Bang-Bang 控制器构建器
pub struct BangBangBuilder<I, O> {
    input: I,
    output: O,
    settings: BangBangSettings,
    schedule: ScheduleConfig,
}

impl<I: Input + 'static, O: Output + 'static> BangBangBuilder<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            settings: BangBangSettings::default(),
            schedule: ScheduleConfig::default().with_name("cogwork-bang-bang"),
        }
    }

    pub fn setpoint(mut self, setpoint: f64) -> Self {
        self.settings.setpoint = setpoint;
        self
    }

    pub fn max_output(mut self, max_output: f64) -> Self {
        self.settings.max_output = max_output;
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.settings.reversed = reversed;
        self
    }

    pub fn coast(mut self, coast: bool) -> Self {
        self.settings.coast = coast;
        self
    }

    /// 启用分段加速
    pub fn speed_up(mut self, spinup_input: f64, spinup_output: f64) -> Self {
        self.settings.speed_up = true;
        self.settings.spinup_input = spinup_input;
        self.settings.spinup_output = spinup_output;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.settings.tolerance = tolerance;
        self
    }

    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// 应用配置文件中的 `[bang_bang]` 段
    pub fn with_section(mut self, section: &BangBangSection) -> Self {
        self.settings = BangBangSettings {
            setpoint: section.setpoint,
            max_output: section.max_output,
            reversed: section.reversed,
            coast: section.coast,
            speed_up: section.speed_up,
            spinup_input: section.spinup_input,
            spinup_output: section.spinup_output,
            tolerance: section.tolerance,
            ..BangBangSettings::default()
        };
        self
    }

    pub fn build(self) -> Result<BangBangController<I, O>, ControlError> {
        let s = &self.settings;
        for (name, value) in [("setpoint", s.setpoint), ("spinup_input", s.spinup_input)] {
            if !value.is_finite() {
                return Err(DriverError::InvalidArgument(format!(
                    "bang-bang {} must be finite, got {}",
                    name, value
                ))
                .into());
            }
        }
        if s.tolerance.is_nan() {
            return Err(
                DriverError::InvalidArgument("bang-bang tolerance must not be NaN".to_string())
                    .into(),
            );
        }
        BangBangController::with_settings(self.input, self.output, self.settings, self.schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogwork_port::PortError;
    use cogwork_port::mock::{MockInput, MockOutput};
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;

    fn make_bang_bang(
        setpoint: f64,
    ) -> (BangBangController<MockInput, MockOutput>, MockInput, MockOutput) {
        let input = MockInput::new(0.0);
        let output = MockOutput::new();
        let controller = BangBangController::builder(input.clone(), output.clone())
            .setpoint(setpoint)
            .max_output(1.0)
            .schedule(ScheduleConfig::new(Duration::from_millis(5)))
            .build()
            .unwrap();
        (controller, input, output)
    }

    #[test]
    fn test_bang_bang_matrix() {
        let (bb, input, output) = make_bang_bang(100.0);

        input.set_value(50.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(1.0));

        input.set_value(150.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.0));

        bb.set_reversed(true);
        input.set_value(50.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(-1.0));
        assert_eq!(bb.output(), -1.0);
        assert_eq!(bb.input(), 50.0);
    }

    #[test]
    fn test_at_setpoint_is_off() {
        let (bb, input, output) = make_bang_bang(100.0);
        input.set_value(100.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.0));
    }

    #[test]
    fn test_coast_overrides_everything() {
        let (bb, input, output) = make_bang_bang(100.0);
        bb.set_coast(true);
        input.set_value(-1000.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.0));

        bb.set_coast(false);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(1.0));
    }

    #[test]
    fn test_speed_up_stages() {
        let (bb, input, output) = make_bang_bang(100.0);
        bb.set_speed_up(true);
        bb.set_spinup_input(60.0);
        bb.set_spinup_output(0.4).unwrap();

        input.set_value(10.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.4));

        input.set_value(60.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(1.0));

        input.set_value(120.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.0));

        bb.reverse();
        input.set_value(10.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(-0.4));
    }

    #[test]
    fn test_spinup_output_clamped_to_max() {
        let (bb, input, output) = make_bang_bang(100.0);
        bb.set_speed_up(true);
        bb.set_spinup_input(50.0);
        bb.set_spinup_output(3.0).unwrap();
        input.set_value(0.0);

        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(1.0));
    }

    #[test]
    fn test_zero_max_output_is_noop() {
        let (bb, input, output) = make_bang_bang(100.0);
        bb.set_max_speed(0.0).unwrap();
        input.set_value(0.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(0.0));
    }

    #[test]
    fn test_reverse_toggles() {
        let (bb, _, _) = make_bang_bang(1.0);
        assert!(!bb.settings().reversed);
        bb.reverse();
        assert!(bb.settings().reversed);
        bb.reverse();
        assert!(!bb.settings().reversed);
    }

    #[test]
    fn test_invalid_magnitudes_rejected() {
        let (bb, _, _) = make_bang_bang(1.0);
        assert!(bb.set_max_speed(-0.5).is_err());
        assert!(bb.set_max_speed(f64::NAN).is_err());
        assert!(bb.set_spinup_output(-1.0).is_err());
        assert_eq!(bb.settings().max_output, 1.0);

        let built = BangBangController::builder(MockInput::new(0.0), MockOutput::new())
            .max_output(-1.0)
            .build();
        assert!(matches!(
            built,
            Err(ControlError::Driver(DriverError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_non_finite_setpoints_ignored() {
        let (bb, _, _) = make_bang_bang(50.0);
        bb.set_spinup_input(10.0);
        bb.set_setpoint(f64::INFINITY);
        bb.set_setpoint(f64::NAN);
        bb.set_spinup_input(f64::NEG_INFINITY);
        assert_eq!(bb.setpoint(), 50.0);
        assert_eq!(bb.settings().spinup_input, 10.0);

        let built = BangBangController::builder(MockInput::new(0.0), MockOutput::new())
            .setpoint(f64::INFINITY)
            .build();
        assert!(built.is_err());
    }

    #[test]
    #[should_panic]
    fn test_compute_rejects_negative_max_output() {
        let settings = BangBangSettings {
            max_output: -1.0,
            ..BangBangSettings::default()
        };
        settings.compute(0.0);
    }

    #[test]
    fn test_on_target_absolute_tolerance() {
        let (bb, input, _) = make_bang_bang(100.0);
        bb.set_tolerance(5.0);

        input.set_value(97.0);
        bb.step_once().unwrap();
        assert!(bb.on_target());

        input.set_value(94.0);
        bb.step_once().unwrap();
        assert!(!bb.on_target());

        bb.set_tolerance(0.0);
        input.set_value(100.0);
        bb.step_once().unwrap();
        assert!(!bb.on_target());
    }

    #[test]
    fn test_input_failure_commands_zero() {
        let (bb, input, output) = make_bang_bang(100.0);
        input.set_value(0.0);
        bb.step_once().unwrap();
        assert_eq!(output.last(), Some(1.0));

        input.set_unreachable(true);
        assert!(matches!(
            bb.step_once(),
            Err(ControlError::Driver(DriverError::Port(PortError::Unreachable(_))))
        ));
        assert_eq!(output.last(), Some(0.0));
    }

    #[test]
    #[serial]
    fn test_running_loop_reacts_to_coast() {
        let (bb, input, output) = make_bang_bang(100.0);
        input.set_value(0.0);

        assert!(bb.enable());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(bb.output(), 1.0);

        bb.set_coast(true);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(bb.output(), 0.0);

        assert!(bb.disable());
        assert!(!bb.is_enabled());
        assert_eq!(output.last(), Some(0.0));
    }
}
