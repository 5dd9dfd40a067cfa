//! Cache-line aligned atomics used for every value shared between the RT
//! thread and the control thread (parameter current-values, enable flags).

use std::sync::atomic::{AtomicBool, Ordering};

use atomic_float::{AtomicF32, AtomicF64};

/// Cache-line aligned atomic `f32`.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get_relaxed(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool, used for the `enabled`/`active` flags a
/// plugin's registry slot exposes to the RT thread.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Cache-line aligned atomic `f64`, used for sample-accurate transport state.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicDouble {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_float_roundtrip() {
        let val = AtomicFloat::new(1.0);
        assert_eq!(val.get(), 1.0);
        val.set(2.5);
        assert_eq!(val.get(), 2.5);
        assert_eq!(val.swap(0.0), 2.5);
    }

    #[test]
    fn atomic_flag_roundtrip() {
        let flag = AtomicFlag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
    }

    #[test]
    fn atomic_double_roundtrip() {
        let val = AtomicDouble::new(0.0);
        val.set(48_000.0);
        assert_eq!(val.get(), 48_000.0);
    }
}
