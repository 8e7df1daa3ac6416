use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Control over whether interrupts are delivered to the local processor.
///
/// This is the classic *spl* (set priority level) interface:
/// [`raise()`](InterruptControl::raise) masks all interrupts and returns the previous level which is later handed
/// back to [`restore()`](InterruptControl::restore).
pub trait InterruptControl {
    /// An opaque snapshot of the interrupt level
    type Level: Copy;

    /// Mask all interrupts on the local processor and return the level that was active before
    fn raise(&self) -> Self::Level;

    /// Return to a level previously returned by [`raise()`](InterruptControl::raise)
    fn restore(&self, level: Self::Level);
}

impl<I: InterruptControl + ?Sized> InterruptControl for &I {
    type Level = I::Level;

    fn raise(&self) -> Self::Level {
        (**self).raise()
    }

    fn restore(&self, level: Self::Level) {
        (**self).restore(level)
    }
}

/// A Guard keeping interrupts on the local processor disabled while it exists.
///
/// The previous interrupt level is restored when the guard is dropped which means it is restored on every exit path
/// of the scope holding it, including early returns.
pub struct InterruptGuard<'a, I: InterruptControl> {
    control: &'a I,
    previous: I::Level,
}

impl<'a, I: InterruptControl> InterruptGuard<'a, I> {
    /// Disable interrupts until the returned guard is dropped
    pub fn new(control: &'a I) -> Self {
        let previous = control.raise();
        Self { control, previous }
    }
}

impl<I: InterruptControl> Drop for InterruptGuard<'_, I> {
    fn drop(&mut self) {
        self.control.restore(self.previous);
    }
}

/// A software model of a processor's interrupt enable bit.
///
/// Besides the current state it counts how often interrupts were masked which makes it possible to observe critical
/// sections from the outside.
#[derive(Debug)]
pub struct InterruptFlag {
    enabled: AtomicBool,
    raised: AtomicUsize,
}

impl InterruptFlag {
    /// Create a new flag with interrupts enabled
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            raised: AtomicUsize::new(0),
        }
    }

    /// Whether interrupts are currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// How many times interrupts have been masked since creation
    pub fn times_raised(&self) -> usize {
        self.raised.load(Ordering::Relaxed)
    }
}

impl Default for InterruptFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptControl for InterruptFlag {
    type Level = bool;

    fn raise(&self) -> Self::Level {
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.enabled.swap(false, Ordering::AcqRel)
    }

    fn restore(&self, level: Self::Level) {
        self.enabled.store(level, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_disables_and_restores() {
        let flag = InterruptFlag::new();
        {
            let _guard = InterruptGuard::new(&flag);
            assert!(!flag.is_enabled());
        }
        assert!(flag.is_enabled());
        assert_eq!(flag.times_raised(), 1);
    }

    #[test]
    fn nested_guards_restore_outer_level() {
        let flag = InterruptFlag::new();
        let outer = InterruptGuard::new(&flag);
        {
            let _inner = InterruptGuard::new(&flag);
        }
        // the inner guard must not re-enable interrupts inside the outer critical section
        assert!(!flag.is_enabled());
        drop(outer);
        assert!(flag.is_enabled());
    }

    #[test]
    fn guard_restores_on_early_return() {
        fn fallible(flag: &InterruptFlag, fail: bool) -> Result<(), ()> {
            let _guard = InterruptGuard::new(flag);
            if fail {
                return Err(());
            }
            Ok(())
        }

        let flag = InterruptFlag::new();
        assert_eq!(fallible(&flag, true), Err(()));
        assert!(flag.is_enabled());
    }

    #[test]
    fn shared_control_affects_the_same_flag() {
        let flag = InterruptFlag::new();
        let shared = &flag;
        {
            let _guard = InterruptGuard::new(&shared);
            assert!(!flag.is_enabled());
        }
        assert!(flag.is_enabled());
        assert_eq!(flag.times_raised(), 1);
    }
}
