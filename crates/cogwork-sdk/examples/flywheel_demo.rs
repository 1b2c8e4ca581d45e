//! 飞轮 + 升降机仿真演示
//!
//! 用 Mock 端口和一个简单的一阶物理模型演示：
//! - Bang-Bang 控制飞轮转速（带分段加速）
//! - PID 控制升降机高度，运行中修改 setpoint
//!
//! # 使用方法
//!
//! ```bash
//! RUST_LOG=debug cargo run -p cogwork-sdk --example flywheel_demo --features mock -- --seconds 3
//!
//! # 从配置文件读取调度和 PID 参数
//! cargo run -p cogwork-sdk --example flywheel_demo --features mock -- --config robot.toml
//! ```

use clap::Parser;
use cogwork_sdk::port::mock::{MockInput, MockOutput};
use cogwork_sdk::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "flywheel_demo")]
#[command(
    about = "Simulated flywheel and elevator driven by cogwork controllers",
    long_about = None
)]
struct Args {
    /// 仿真时长（秒）
    #[arg(long, default_value_t = 4.0)]
    seconds: f64,

    /// 控制频率（Hz），配置文件存在时被其 [schedule] 覆盖
    #[arg(long, default_value_t = 100.0)]
    frequency: f64,

    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 一阶模型：value += (gain * command - drag * value) * dt
struct Plant {
    sensor: MockInput,
    actuator: MockOutput,
    gain: f64,
    drag: f64,
}

impl Plant {
    fn advance(&self, dt: f64) {
        let command = self.actuator.last().unwrap_or(0.0);
        let value = self.sensor.value();
        self.sensor
            .set_value(value + (self.gain * command - self.drag * value) * dt);
    }
}

fn main() -> anyhow::Result<()> {
    cogwork_sdk::init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ControllerConfig::load_from_file(path)?,
        None => ControllerConfig::default(),
    };
    let schedule = match &args.config {
        Some(_) => config.schedule_config()?,
        None => ScheduleConfig::from_frequency_hz(args.frequency)?,
    };

    println!("════════════════════════════════════════");
    println!("        cogwork 飞轮 / 升降机仿真");
    println!("════════════════════════════════════════");
    println!("控制周期: {:?} ({:?})", schedule.period, schedule.discipline);

    // === 飞轮：Bang-Bang ===
    let flywheel = Plant {
        sensor: MockInput::new(0.0),
        actuator: MockOutput::new(),
        gain: 6000.0,
        drag: 1.5,
    };
    let shooter = BangBangController::builder(flywheel.sensor.clone(), flywheel.actuator.clone())
        .setpoint(3000.0)
        .speed_up(1500.0, 0.6)
        .tolerance(100.0)
        .schedule(schedule.clone().with_name("flywheel"))
        .build()?;

    // === 升降机：PID ===
    let elevator = Plant {
        sensor: MockInput::new(0.0),
        actuator: MockOutput::new(),
        gain: 40.0,
        drag: 0.5,
    };
    let mut builder = PidController::builder(elevator.sensor.clone(), elevator.actuator.clone())
        .gains(0.6, 0.02, 0.05)
        .input_range(0.0, 100.0)
        .tolerance(1.0);
    if let Some(section) = &config.pid {
        builder = builder.with_section(section);
    }
    let lift = Arc::new(builder.schedule(schedule.with_name("elevator")).build()?);
    lift.set_setpoint(40.0);
    let shooter = Arc::new(shooter);

    let mut registry = UnitRegistry::new();
    registry.insert("flywheel", shooter.clone());
    registry.insert("elevator", lift.clone());
    registry.enable_all();

    let started = Instant::now();
    let dt = Duration::from_millis(5);
    let mut next_report = Duration::ZERO;
    let mut retargeted = false;

    while started.elapsed().as_secs_f64() < args.seconds {
        flywheel.advance(dt.as_secs_f64());
        elevator.advance(dt.as_secs_f64());

        if !retargeted && started.elapsed().as_secs_f64() > args.seconds / 2.0 {
            println!("→ 运行中修改升降机目标: 40 → 75");
            lift.set_setpoint(75.0);
            retargeted = true;
        }

        if started.elapsed() >= next_report {
            println!(
                "t={:>5.2}s  flywheel={:>7.1} rpm (cmd {:>5.2}, on target: {})  elevator={:>6.2} cm (cmd {:>5.2}, error {:>6.2})",
                started.elapsed().as_secs_f64(),
                flywheel.sensor.value(),
                shooter.output(),
                shooter.on_target(),
                elevator.sensor.value(),
                lift.prev_result(),
                lift.error(),
            );
            next_report += Duration::from_millis(250);
        }
        thread::sleep(dt);
    }

    registry.disable_all();
    let metrics = lift.metrics();
    println!(
        "已停止，所有输出归零（升降机 {} 步，最大耗时 {} µs，超时 {} 次）",
        metrics.steps_total, metrics.max_step_us, metrics.overruns
    );
    Ok(())
}
