//! 生命周期定义
//!
//! 所有硬件绑定单元和计算单元共享的 enable / disable / is_enabled 契约，
//! 以及调度器内部使用的原子生命周期状态。

use std::sync::atomic::{AtomicU8, Ordering};

/// 可控单元（Controllable Unit）
///
/// # 契约
///
/// - `enable()`: 返回 `true` 当且仅当调用后单元处于启用状态
/// - `disable()`: 返回 `true` 当且仅当调用后单元处于禁用状态
/// - `is_enabled()`: 当前是否启用
///
/// 三个方法都接受 `&self`，可以在任意线程、任意时刻、重复调用（幂等）。
///
/// # 示例
///
/// ```rust
/// use cogwork_driver::Controllable;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Light(AtomicBool);
///
/// impl Controllable for Light {
///     fn enable(&self) -> bool {
///         self.0.store(true, Ordering::Release);
///         true
///     }
///     fn disable(&self) -> bool {
///         self.0.store(false, Ordering::Release);
///         true
///     }
///     fn is_enabled(&self) -> bool {
///         self.0.load(Ordering::Acquire)
///     }
/// }
///
/// let light = Light(AtomicBool::new(false));
/// assert!(light.enable());
/// assert!(light.is_enabled());
/// ```
pub trait Controllable: Send + Sync {
    fn enable(&self) -> bool;
    fn disable(&self) -> bool;
    fn is_enabled(&self) -> bool;
}

/// 调度器生命周期状态
///
/// ```text
/// Constructed --enable--> Running --disable--> Stopped --enable--> Running ...
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LifecycleState {
    /// 已构造，从未启用
    #[default]
    Constructed = 0,
    /// 控制线程运行中
    Running = 1,
    /// 已禁用
    Stopped = 2,
}

impl LifecycleState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Stopped（最保守的状态）。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Constructed,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// 生命周期状态（原子版本，用于线程间共享）
///
/// 调用方线程通过 `set()` 切换状态，遥测读取方无需持锁即可 `get()`。
#[derive(Debug)]
pub struct AtomicLifecycleState {
    inner: AtomicU8,
}

impl AtomicLifecycleState {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> LifecycleState {
        LifecycleState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: LifecycleState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }
}

impl Default for AtomicLifecycleState {
    fn default() -> Self {
        Self::new(LifecycleState::Constructed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_conversions() {
        assert_eq!(LifecycleState::Constructed.as_u8(), 0);
        assert_eq!(LifecycleState::Running.as_u8(), 1);
        assert_eq!(LifecycleState::Stopped.as_u8(), 2);

        assert_eq!(LifecycleState::from_u8(1), LifecycleState::Running);
        assert_eq!(LifecycleState::from_u8(200), LifecycleState::Stopped); // 无效值

        assert!(LifecycleState::Running.is_running());
        assert!(!LifecycleState::Constructed.is_running());
    }

    #[test]
    fn test_atomic_lifecycle_state() {
        let state = AtomicLifecycleState::default();
        assert_eq!(state.get(Ordering::Relaxed), LifecycleState::Constructed);

        state.set(LifecycleState::Running, Ordering::Relaxed);
        assert_eq!(state.get(Ordering::Relaxed), LifecycleState::Running);

        state.set(LifecycleState::Stopped, Ordering::Relaxed);
        assert_eq!(state.get(Ordering::Relaxed), LifecycleState::Stopped);
    }
}
