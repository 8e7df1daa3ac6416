#![no_std]

pub mod mem;
pub mod tlb;
pub mod trap;
