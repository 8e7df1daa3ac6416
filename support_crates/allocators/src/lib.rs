//! Allocators for physical memory frames
#![no_std]

mod frame_arena;
mod traits;

pub use frame_arena::FrameArena;
pub use traits::{AllocError, FrameAllocator, PhysAddr};
