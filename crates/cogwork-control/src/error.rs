//! 控制层错误类型定义

use cogwork_driver::DriverError;
use cogwork_port::PortError;
use thiserror::Error;

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// 驱动层错误（调度、生命周期、范围校验、端口故障）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 配置文件解析错误
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 配置文件读取错误
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置内容无效
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<PortError> for ControlError {
    fn from(err: PortError) -> Self {
        Self::Driver(DriverError::Port(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        let err = ControlError::from(DriverError::InvalidRange { min: 1.0, max: 0.0 });
        let msg = format!("{}", err);
        assert!(msg.contains("Driver error") && msg.contains("Invalid range"), "{}", msg);

        let err = ControlError::InvalidConfig("missing [pid]".to_string());
        assert_eq!(format!("{}", err), "Invalid config: missing [pid]");
    }

    #[test]
    fn test_from_port_error() {
        let err: ControlError = PortError::Timeout.into();
        assert!(matches!(err, ControlError::Driver(DriverError::Port(PortError::Timeout))));
    }
}
