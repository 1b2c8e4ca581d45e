//! Mock 端口
//!
//! 无硬件依赖的内存端口，用于单元测试、集成测试和演示。
//! 所有 Mock 都是 `Clone` 的：克隆体共享同一份内部状态，
//! 一个交给控制器，另一个留在测试线程里观察和注入故障。

use crate::{Input, Output, PortError, Position};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct InputState {
    value: f64,
    reads: u64,
    unreachable: bool,
    delay: Duration,
}

/// Mock 输入：返回可随时修改的读数
#[derive(Debug, Clone, Default)]
pub struct MockInput {
    state: Arc<Mutex<InputState>>,
}

impl MockInput {
    pub fn new(value: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(InputState {
                value,
                ..Default::default()
            })),
        }
    }

    pub fn set_value(&self, value: f64) {
        self.state.lock().value = value;
    }

    pub fn value(&self) -> f64 {
        self.state.lock().value
    }

    /// 模拟传感器断线
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// 模拟慢速硬件调用（每次读取前休眠）
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }
}

impl Input for MockInput {
    fn get(&mut self) -> Result<f64, PortError> {
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            // 在锁外休眠，避免阻塞测试线程的 set_value
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.reads += 1;
        if state.unreachable {
            return Err(PortError::Unreachable("mock input".to_string()));
        }
        Ok(state.value)
    }
}

#[derive(Debug, Default)]
struct OutputState {
    history: Vec<f64>,
    failing: bool,
}

/// Mock 输出：记录所有写入的指令
#[derive(Debug, Clone, Default)]
pub struct MockOutput {
    state: Arc<Mutex<OutputState>>,
}

impl MockOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最后一次写入的值（从未写入时为 None）
    pub fn last(&self) -> Option<f64> {
        self.state.lock().history.last().copied()
    }

    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn clear(&self) {
        self.state.lock().history.clear();
    }

    /// 模拟执行器故障
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl Output for MockOutput {
    fn set(&mut self, value: f64) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(PortError::Timeout);
        }
        state.history.push(value);
        Ok(())
    }
}

/// Mock 两态传感器
#[derive(Debug, Clone, Default)]
pub struct MockPosition {
    state: Arc<Mutex<(bool, bool)>>,
}

impl MockPosition {
    pub fn new(position: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new((position, false))),
        }
    }

    pub fn set_position(&self, position: bool) {
        self.state.lock().0 = position;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().1 = unreachable;
    }
}

impl Position for MockPosition {
    fn get_position(&mut self) -> Result<bool, PortError> {
        let (position, unreachable) = *self.state.lock();
        if unreachable {
            return Err(PortError::Unreachable("mock position".to_string()));
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_input_shares_state_between_clones() {
        let observer = MockInput::new(1.0);
        let mut port = observer.clone();

        assert_eq!(port.get().unwrap(), 1.0);
        observer.set_value(-3.0);
        assert_eq!(port.get().unwrap(), -3.0);
        assert_eq!(observer.read_count(), 2);
    }

    #[test]
    fn test_mock_input_unreachable() {
        let observer = MockInput::new(0.0);
        let mut port = observer.clone();
        observer.set_unreachable(true);
        assert!(matches!(port.get(), Err(PortError::Unreachable(_))));
    }

    #[test]
    fn test_mock_output_records_history() {
        let observer = MockOutput::new();
        let mut port = observer.clone();

        assert_eq!(observer.last(), None);
        port.set(0.5).unwrap();
        port.set(-1.0).unwrap();
        assert_eq!(observer.history(), vec![0.5, -1.0]);
        assert_eq!(observer.last(), Some(-1.0));

        observer.set_failing(true);
        assert!(port.set(1.0).is_err());
        assert_eq!(observer.write_count(), 2);
    }

    #[test]
    fn test_mock_position() {
        let observer = MockPosition::new(false);
        let mut port = observer.clone();
        assert!(!port.get_position().unwrap());
        observer.set_position(true);
        assert!(port.get_position().unwrap());
        observer.set_unreachable(true);
        assert!(port.get_position().is_err());
    }
}
