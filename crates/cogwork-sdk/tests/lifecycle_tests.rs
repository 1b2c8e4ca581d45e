//! 生命周期集成测试
//!
//! 覆盖 enable / disable 的幂等性、重复调度防护、端口故障下回路存活，
//! 以及通过注册表统一管理多个控制器。

use cogwork_sdk::port::mock::{MockInput, MockOutput, MockPosition};
use cogwork_sdk::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pid_with_period(
    period: Duration,
) -> (Arc<PidController<MockInput, MockOutput>>, MockInput, MockOutput) {
    let input = MockInput::new(0.0);
    let output = MockOutput::new();
    let pid = PidController::builder(input.clone(), output.clone())
        .gains(0.5, 0.0, 0.0)
        .setpoint(1.0)
        .schedule(ScheduleConfig::new(period))
        .build()
        .unwrap();
    (Arc::new(pid), input, output)
}

#[test]
#[serial]
fn test_disable_is_idempotent_and_final() {
    let (pid, _, _) = pid_with_period(Duration::from_millis(5));
    assert_eq!(pid.lifecycle(), LifecycleState::Constructed);
    assert!(!pid.is_enabled());

    assert!(pid.enable());
    assert_eq!(pid.lifecycle(), LifecycleState::Running);
    thread::sleep(Duration::from_millis(20));

    assert!(pid.disable());
    assert!(pid.disable());
    assert_eq!(pid.lifecycle(), LifecycleState::Stopped);

    // 第二次 disable 返回后不再有任何 step
    let steps = pid.metrics().steps_total;
    thread::sleep(Duration::from_millis(30));
    assert_eq!(pid.metrics().steps_total, steps);
    assert!(matches!(pid.active_loop(), Err(DriverError::NotEnabled)));
}

#[test]
#[serial]
fn test_concurrent_enable_starts_one_loop() {
    let (pid, _, _) = pid_with_period(Duration::from_millis(10));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let pid = pid.clone();
            thread::spawn(move || pid.enable())
        })
        .collect();
    for caller in callers {
        assert!(caller.join().unwrap());
    }

    let first = pid.active_loop().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(pid.active_loop().unwrap(), first);
    assert!(pid.disable());

    // 200ms / 10ms：单个回路约 20 步（首步立即执行），两个回路会接近 40 步
    let steps = pid.metrics().steps_total;
    assert!((10..=28).contains(&steps), "steps = {}", steps);
}

#[test]
#[serial]
fn test_re_enable_after_disable() {
    let (pid, _, output) = pid_with_period(Duration::from_millis(5));

    assert!(pid.enable());
    let first = pid.active_loop().unwrap();
    thread::sleep(Duration::from_millis(15));
    assert!(pid.disable());

    output.clear();
    assert!(pid.enable());
    let second = pid.active_loop().unwrap();
    assert!(second.generation > first.generation);
    thread::sleep(Duration::from_millis(15));
    assert!(pid.disable());

    assert!(output.write_count() > 0);
    assert_eq!(output.last(), Some(0.0));
}

#[test]
#[serial]
fn test_port_failures_do_not_stop_the_loop() {
    let (pid, input, output) = pid_with_period(Duration::from_millis(5));
    assert!(pid.enable());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(output.last(), Some(0.5));

    input.set_unreachable(true);
    thread::sleep(Duration::from_millis(30));
    // 故障期间输出退化为零
    assert_eq!(output.last(), Some(0.0));
    assert!(pid.metrics().step_errors > 0);
    assert!(pid.is_enabled());

    input.set_unreachable(false);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(output.last(), Some(0.5));

    assert!(pid.disable());
    let metrics = pid.metrics();
    assert!(metrics.failure_rate() > 0.0 && metrics.failure_rate() < 100.0);
}

#[test]
#[serial]
fn test_registry_manages_mixed_controllers() {
    let (pid, _, pid_output) = pid_with_period(Duration::from_millis(5));

    let flywheel_output = MockOutput::new();
    let flywheel = Arc::new(
        BangBangController::builder(MockInput::new(0.0), flywheel_output.clone())
            .setpoint(10.0)
            .schedule(ScheduleConfig::new(Duration::from_millis(5)))
            .build()
            .unwrap(),
    );

    let compressor_output = MockOutput::new();
    let compressor = Arc::new(
        RelayController::new(
            MockPosition::new(false),
            compressor_output.clone(),
            true,
            RelayState::Forward,
            ScheduleConfig::new(Duration::from_millis(5)),
        )
        .unwrap(),
    );

    let mut registry = UnitRegistry::new();
    let arm = registry.insert("arm", pid.clone());
    registry.insert("flywheel", flywheel.clone());
    let relay = registry.insert("compressor", compressor.clone());
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.enable_all(), 3);
    thread::sleep(Duration::from_millis(25));
    assert!(pid.is_enabled() && flywheel.is_enabled() && compressor.is_enabled());
    assert_eq!(flywheel_output.last(), Some(1.0));
    assert_eq!(compressor.last_command(), RelayState::Forward);

    // 移除单元时会先禁用它，旧句柄失效
    registry.remove(relay).unwrap();
    assert!(!compressor.is_enabled());
    assert_eq!(compressor_output.last(), Some(0.0));
    assert!(registry.get(relay).is_err());

    assert_eq!(registry.disable_all(), 2);
    assert!(!pid.is_enabled() && !flywheel.is_enabled());
    assert_eq!(pid_output.last(), Some(0.0));
    assert_eq!(registry.name(arm).unwrap(), "arm");
}
