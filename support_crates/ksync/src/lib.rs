//! Kernel Synchronisation Primitives
#![no_std]

mod interrupt_guard;

pub use interrupt_guard::{InterruptControl, InterruptFlag, InterruptGuard};
