//! RISC-V guest-to-host translation frontend for a dynamic binary
//! translator.
//!
//! Three subsystems: the decoder (the `riscv` crate), the IR emitter and
//! block builder ([`translate`]), and the vector runtime helpers
//! ([`vector`]). The execution engine, MMU and scalar helper routines are
//! external collaborators reached through the interfaces in [`ir`].

extern crate fnv;
#[macro_use]
extern crate log;
extern crate riscv;

pub mod cpu;
pub mod ir;
pub mod translate;
pub mod vector;

pub use cpu::{process_interrupt, CpuState, Trap};
pub use ir::{gen_helpers, HelperId, IrBuffer, IrBuilder};
pub use translate::{
    restore_state_to_opc, translate_init, BlockState, CodeMemory, TranslationBlock, Translator,
    DEFAULT_MAX_INSNS,
};
