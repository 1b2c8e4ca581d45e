//! # 控制器配置
//!
//! 从 TOML 加载控制器的初始调参和调度配置。只支持加载；
//! 运行时调好的参数不回写文件。
//!
//! ```toml
//! [schedule]
//! period_ms = 10.0
//! discipline = "fixed-rate"   # 或 "fixed-delay"
//! wait = "park"               # 或 "spin"
//! name = "shooter"
//!
//! [pid]
//! p = 0.8
//! i = 0.02
//! output_range = [-0.5, 0.5]
//! input_range = [0.0, 5000.0]
//! tolerance = 25.0
//!
//! [bang_bang]
//! setpoint = 3000.0
//! max_output = 1.0
//!
//! [relay]
//! at_target = true
//! on_direction = "forward"
//! ```

use crate::error::ControlError;
use cogwork_driver::{Discipline, ScheduleConfig, WaitStrategy};
use cogwork_port::RelayState;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 控制器配置文件
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub schedule: ScheduleSection,
    pub pid: Option<PidSection>,
    pub bang_bang: Option<BangBangSection>,
    pub relay: Option<RelaySection>,
}

impl ControllerConfig {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> Result<Self, ControlError> {
        let config: Self = toml::from_str(content)?;
        // 提前校验调度段，错误信息指向配置而不是构造调用
        config.schedule.to_schedule()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded controller config from {}", path.display());
        Ok(config)
    }

    /// 解析出的调度配置
    pub fn schedule_config(&self) -> Result<ScheduleConfig, ControlError> {
        self.schedule.to_schedule()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisciplineKind {
    FixedDelay,
    #[default]
    FixedRate,
}

impl From<DisciplineKind> for Discipline {
    fn from(kind: DisciplineKind) -> Self {
        match kind {
            DisciplineKind::FixedDelay => Discipline::FixedDelay,
            DisciplineKind::FixedRate => Discipline::FixedRate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitKind {
    #[default]
    Park,
    Spin,
}

impl From<WaitKind> for WaitStrategy {
    fn from(kind: WaitKind) -> Self {
        match kind {
            WaitKind::Park => WaitStrategy::Park,
            WaitKind::Spin => WaitStrategy::Spin,
        }
    }
}

/// `[schedule]` 段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSection {
    /// 控制周期（毫秒，可以是小数）
    pub period_ms: f64,
    pub discipline: DisciplineKind,
    pub wait: WaitKind,
    pub name: Option<String>,
    pub join_timeout_ms: Option<u64>,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            period_ms: 20.0,
            discipline: DisciplineKind::default(),
            wait: WaitKind::default(),
            name: None,
            join_timeout_ms: None,
        }
    }
}

impl ScheduleSection {
    pub fn to_schedule(&self) -> Result<ScheduleConfig, ControlError> {
        let period = Duration::try_from_secs_f64(self.period_ms / 1000.0).map_err(|_| {
            ControlError::InvalidConfig(format!(
                "schedule.period_ms must be a positive number, got {}",
                self.period_ms
            ))
        })?;

        let mut config = ScheduleConfig::new(period)
            .with_discipline(self.discipline.into())
            .with_wait(self.wait.into());
        if let Some(name) = &self.name {
            config = config.with_name(name.clone());
        }
        if let Some(ms) = self.join_timeout_ms {
            config = config.with_join_timeout(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }
}

/// `[pid]` 段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PidSection {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
    pub setpoint: f64,
    /// 缺省为 (-∞, +∞)
    pub input_range: Option<[f64; 2]>,
    pub output_range: [f64; 2],
    pub tolerance: f64,
}

impl Default for PidSection {
    fn default() -> Self {
        Self {
            p: 0.0,
            i: 0.0,
            d: 0.0,
            f: 0.0,
            setpoint: 0.0,
            input_range: None,
            output_range: [-1.0, 1.0],
            tolerance: 0.0,
        }
    }
}

/// `[bang_bang]` 段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BangBangSection {
    pub setpoint: f64,
    pub max_output: f64,
    pub reversed: bool,
    pub coast: bool,
    pub speed_up: bool,
    pub spinup_input: f64,
    pub spinup_output: f64,
    pub tolerance: f64,
}

impl Default for BangBangSection {
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
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayDirection {
    #[default]
    Forward,
    Reverse,
}

impl From<RelayDirection> for RelayState {
    fn from(direction: RelayDirection) -> Self {
        match direction {
            RelayDirection::Forward => RelayState::Forward,
            RelayDirection::Reverse => RelayState::Reverse,
        }
    }
}

/// `[relay]` 段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub at_target: bool,
    pub on_direction: RelayDirection,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            at_target: true,
            on_direction: RelayDirection::Forward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
[schedule]
period_ms = 5.0
discipline = "fixed-delay"
wait = "spin"
name = "shooter"
join_timeout_ms = 500

[pid]
p = 0.8
i = 0.02
output_range = [-0.5, 0.5]
input_range = [0.0, 5000.0]
tolerance = 25.0

[bang_bang]
setpoint = 3000.0
speed_up = true
spinup_input = 1500.0
spinup_output = 0.6

[relay]
at_target = false
on_direction = "reverse"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ControllerConfig::from_toml_str(FULL).unwrap();

        let schedule = config.schedule_config().unwrap();
        assert_eq!(schedule.period, Duration::from_millis(5));
        assert_eq!(schedule.discipline, Discipline::FixedDelay);
        assert_eq!(schedule.wait, WaitStrategy::Spin);
        assert_eq!(schedule.name, "shooter");
        assert_eq!(schedule.join_timeout, Duration::from_millis(500));

        let pid = config.pid.unwrap();
        assert_eq!(pid.p, 0.8);
        assert_eq!(pid.d, 0.0);
        assert_eq!(pid.input_range, Some([0.0, 5000.0]));
        assert_eq!(pid.output_range, [-0.5, 0.5]);

        let bang_bang = config.bang_bang.unwrap();
        assert!(bang_bang.speed_up);
        assert_eq!(bang_bang.max_output, 1.0);

        let relay = config.relay.unwrap();
        assert!(!relay.at_target);
        assert_eq!(RelayState::from(relay.on_direction), RelayState::Reverse);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(config.pid.is_none());
        assert_eq!(config.schedule_config().unwrap().period, Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_period_rejected() {
        for period in ["0.0", "-3.0"] {
            let content = format!("[schedule]\nperiod_ms = {}\n", period);
            assert!(
                ControllerConfig::from_toml_str(&content).is_err(),
                "period_ms = {} should be rejected",
                period
            );
        }
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = ControllerConfig::from_toml_str("[pid]\nkp = 1.0\n");
        assert!(matches!(result, Err(ControlError::ConfigParse(_))));

        let result = ControllerConfig::from_toml_str("[schedule]\ndiscipline = \"sometimes\"\n");
        assert!(matches!(result, Err(ControlError::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = ControllerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.schedule.name.as_deref(), Some("shooter"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ControllerConfig::load_from_file(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ControlError::Io(_))));
    }
}
