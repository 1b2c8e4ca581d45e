//! 单元注册表
//!
//! 以代数校验句柄（generation-checked handle）索引的可控单元 arena。
//! 注册表由调用方显式创建和注入，不存在全局单例。
//!
//! # 使用示例
//!
//! ```rust
//! use cogwork_driver::{Controllable, UnitRegistry};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! #[derive(Default)]
//! struct Flag(AtomicBool);
//!
//! impl Controllable for Flag {
//!     fn enable(&self) -> bool { self.0.store(true, Ordering::Release); true }
//!     fn disable(&self) -> bool { self.0.store(false, Ordering::Release); true }
//!     fn is_enabled(&self) -> bool { self.0.load(Ordering::Acquire) }
//! }
//!
//! let mut registry = UnitRegistry::new();
//! let handle = registry.insert("intake", Arc::new(Flag::default()));
//!
//! registry.enable_all();
//! assert!(registry.get(handle).unwrap().is_enabled());
//!
//! registry.remove(handle).unwrap();
//! assert!(registry.get(handle).is_err()); // 旧句柄失效
//! ```

use crate::error::DriverError;
use crate::lifecycle::Controllable;
use std::sync::Arc;
use tracing::{debug, warn};

/// 注册表句柄
///
/// `index` 定位槽位，`generation` 区分同一槽位的先后占用者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle {
    index: u32,
    generation: u32,
}

impl UnitHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

struct UnitEntry {
    name: String,
    unit: Arc<dyn Controllable>,
}

struct Slot {
    generation: u32,
    entry: Option<UnitEntry>,
}

/// 可控单元注册表
///
/// # 线程安全
///
/// 注册表本身不是线程安全的，需要外部同步（通常通过 `RwLock<UnitRegistry>`）。
/// 注册的单元是 `Arc<dyn Controllable>`，可以跨线程共享。
#[derive(Default)]
pub struct UnitRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl UnitRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// 注册一个单元
    ///
    /// 优先复用已释放的槽位（代数已在移除时递增）。
    pub fn insert(&mut self, name: impl Into<String>, unit: Arc<dyn Controllable>) -> UnitHandle {
        let entry = UnitEntry {
            name: name.into(),
            unit,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return UnitHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        UnitHandle {
            index,
            generation: 0,
        }
    }

    fn entry(&self, handle: UnitHandle) -> Result<&UnitEntry, DriverError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(DriverError::StaleHandle)
    }

    /// 获取单元
    pub fn get(&self, handle: UnitHandle) -> Result<Arc<dyn Controllable>, DriverError> {
        self.entry(handle).map(|entry| entry.unit.clone())
    }

    /// 获取单元名称
    pub fn name(&self, handle: UnitHandle) -> Result<&str, DriverError> {
        self.entry(handle).map(|entry| entry.name.as_str())
    }

    /// 按名称查找（第一个匹配）
    pub fn find(&self, name: &str) -> Option<UnitHandle> {
        self.iter()
            .find(|(_, entry_name, _)| *entry_name == name)
            .map(|(handle, _, _)| handle)
    }

    /// 移除单元
    ///
    /// 移除前先禁用单元；槽位代数递增，旧句柄此后全部失效。
    pub fn remove(&mut self, handle: UnitHandle) -> Result<Arc<dyn Controllable>, DriverError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(DriverError::StaleHandle)?;
        let entry = slot.entry.take().ok_or(DriverError::StaleHandle)?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        entry.unit.disable();
        debug!("Unit '{}' removed from registry", entry.name);
        Ok(entry.unit)
    }

    /// 遍历所有已注册单元
    pub fn iter(&self) -> impl Iterator<Item = (UnitHandle, &str, &Arc<dyn Controllable>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    UnitHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry.name.as_str(),
                    &entry.unit,
                )
            })
        })
    }

    /// 启用所有单元，返回成功启用的数量
    pub fn enable_all(&self) -> usize {
        self.iter()
            .filter(|(_, name, unit)| {
                let ok = unit.enable();
                if !ok {
                    warn!("Unit '{}' failed to enable", name);
                }
                ok
            })
            .count()
    }

    /// 禁用所有单元，返回成功禁用的数量
    pub fn disable_all(&self) -> usize {
        self.iter().filter(|(_, _, unit)| unit.disable()).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Flag(AtomicBool);

    impl Controllable for Flag {
        fn enable(&self) -> bool {
            self.0.store(true, Ordering::Release);
            true
        }
        fn disable(&self) -> bool {
            self.0.store(false, Ordering::Release);
            true
        }
        fn is_enabled(&self) -> bool {
            self.0.load(Ordering::Acquire)
        }
    }

    /// 永远无法启用的单元
    struct Broken;

    impl Controllable for Broken {
        fn enable(&self) -> bool {
            false
        }
        fn disable(&self) -> bool {
            true
        }
        fn is_enabled(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = UnitRegistry::new();
        assert!(registry.is_empty());

        let a = registry.insert("arm", Arc::new(Flag::default()));
        let b = registry.insert("wrist", Arc::new(Flag::default()));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name(a).unwrap(), "arm");
        assert_eq!(registry.name(b).unwrap(), "wrist");
        assert_eq!(registry.find("wrist"), Some(b));
        assert_eq!(registry.find("shooter"), None);
    }

    #[test]
    fn test_remove_invalidates_handle() {
        let mut registry = UnitRegistry::new();
        let unit = Arc::new(Flag::default());
        let handle = registry.insert("arm", unit.clone());

        unit.enable();
        registry.remove(handle).unwrap();

        // 移除时被禁用
        assert!(!unit.is_enabled());
        assert!(matches!(registry.get(handle), Err(DriverError::StaleHandle)));
        assert!(matches!(registry.remove(handle), Err(DriverError::StaleHandle)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut registry = UnitRegistry::new();
        let old = registry.insert("arm", Arc::new(Flag::default()));
        registry.remove(old).unwrap();

        let new = registry.insert("lift", Arc::new(Flag::default()));
        assert_eq!(new.index(), old.index());
        assert_eq!(new.generation(), old.generation() + 1);

        assert!(registry.get(old).is_err());
        assert_eq!(registry.name(new).unwrap(), "lift");
    }

    #[test]
    fn test_enable_disable_all() {
        let mut registry = UnitRegistry::new();
        let a = Arc::new(Flag::default());
        let b = Arc::new(Flag::default());
        registry.insert("a", a.clone());
        registry.insert("b", b.clone());
        registry.insert("broken", Arc::new(Broken));

        assert_eq!(registry.enable_all(), 2);
        assert!(a.is_enabled() && b.is_enabled());

        assert_eq!(registry.disable_all(), 3);
        assert!(!a.is_enabled() && !b.is_enabled());
    }
}
