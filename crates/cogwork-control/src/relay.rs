//! 继电器控制器
//!
//! 最小的控制器模板：读两态传感器，未到位时驱动继电器，到位时关闭。
//! 典型用法是压力开关驱动的压缩机：压力开关断开（未达到目标压力）时
//! 继电器 `Forward`，开关闭合时 `Off`。

use crate::config::RelaySection;
use crate::error::ControlError;
use cogwork_driver::{
    ActiveLoop, Controllable, DriverError, LifecycleState, LoopMetricsSnapshot, PeriodicScheduler,
    ScheduleConfig, Step,
};
use cogwork_port::{Output, Position, RelayState};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// 表示"已到位"的传感器状态
    pub at_target: bool,
    /// 未到位时的驱动方向
    pub on_direction: RelayState,
    /// 最近一次读到的传感器状态（从未运行时为 None）
    pub prev_position: Option<bool>,
    pub last_command: RelayState,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            at_target: true,
            on_direction: RelayState::Forward,
            prev_position: None,
            last_command: RelayState::Off,
        }
    }
}

impl RelaySettings {
    pub fn command_for(&self, position: bool) -> RelayState {
        if position == self.at_target {
            RelayState::Off
        } else {
            self.on_direction
        }
    }
}

struct RelayPorts<P, O> {
    position: P,
    output: O,
}

struct RelayCore<P, O> {
    settings: Mutex<RelaySettings>,
    ports: Mutex<RelayPorts<P, O>>,
}

impl<P: Position + 'static, O: Output + 'static> Step for RelayCore<P, O> {
    fn step(&self) -> Result<(), DriverError> {
        let mut ports = self.ports.lock();
        let snapshot = *self.settings.lock();

        let position = match ports.position.get_position() {
            Ok(position) => position,
            Err(e) => {
                if let Err(write_err) = ports.output.set(RelayState::Off.as_command()) {
                    warn!("Failed to switch relay off after sensor failure: {}", write_err);
                }
                self.settings.lock().last_command = RelayState::Off;
                return Err(e.into());
            },
        };

        let command = snapshot.command_for(position);
        ports.output.set(command.as_command())?;

        {
            let mut settings = self.settings.lock();
            settings.prev_position = Some(position);
            settings.last_command = command;
        }

        trace!("relay step: position={} command={:?}", position, command);
        Ok(())
    }

    fn on_stop(&self) -> Result<(), DriverError> {
        self.ports.lock().output.set(RelayState::Off.as_command())?;
        self.settings.lock().last_command = RelayState::Off;
        Ok(())
    }
}

/// 继电器控制器
pub struct RelayController<P: Position + 'static, O: Output + 'static> {
    scheduler: PeriodicScheduler<RelayCore<P, O>>,
}

impl<P: Position + 'static, O: Output + 'static> RelayController<P, O> {
    /// 创建控制器
    ///
    /// `at_target`：传感器读到该状态时关闭继电器；`on_direction` 不能是 `Off`。
    pub fn new(
        position: P,
        output: O,
        at_target: bool,
        on_direction: RelayState,
        schedule: ScheduleConfig,
    ) -> Result<Self, ControlError> {
        check_direction(on_direction)?;
        let settings = RelaySettings {
            at_target,
            on_direction,
            ..RelaySettings::default()
        };
        let core = Arc::new(RelayCore {
            settings: Mutex::new(settings),
            ports: Mutex::new(RelayPorts { position, output }),
        });
        Ok(Self {
            scheduler: PeriodicScheduler::new(core, schedule)?,
        })
    }

    /// 从配置段创建
    pub fn from_section(
        position: P,
        output: O,
        section: &RelaySection,
        schedule: ScheduleConfig,
    ) -> Result<Self, ControlError> {
        Self::new(
            position,
            output,
            section.at_target,
            section.on_direction.into(),
            schedule,
        )
    }

    fn core(&self) -> &RelayCore<P, O> {
        self.scheduler.step()
    }

    pub fn step_once(&self) -> Result<(), ControlError> {
        self.core().step().map_err(ControlError::from)
    }

    pub fn set_at_target(&self, at_target: bool) {
        self.core().settings.lock().at_target = at_target;
    }

    pub fn set_on_direction(&self, on_direction: RelayState) -> Result<(), ControlError> {
        check_direction(on_direction)?;
        self.core().settings.lock().on_direction = on_direction;
        Ok(())
    }

    /// 最近一次读数是否已到位（从未运行时为 false）
    pub fn is_at_target(&self) -> bool {
        let settings = self.core().settings.lock();
        settings.prev_position == Some(settings.at_target)
    }

    pub fn last_command(&self) -> RelayState {
        self.core().settings.lock().last_command
    }

    pub fn settings(&self) -> RelaySettings {
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

fn check_direction(on_direction: RelayState) -> Result<(), DriverError> {
    if on_direction == RelayState::Off {
        return Err(DriverError::InvalidArgument(
            "relay on_direction must be Forward or Reverse".to_string(),
        ));
    }
    Ok(())
}

impl<P: Position + 'static, O: Output + 'static> Controllable for RelayController<P, O> {
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
