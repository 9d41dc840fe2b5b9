//! Instruction translation: per-operation IR emission and the block builder.
//!
//! The emitter walks decoded ops and appends IR through the [`IrBuilder`]
//! capability surface; the block builder drives fetch-decode-emit until a
//! termination condition closes the translation block.

use log::trace;

use riscv::decode::{decode, decode_compressed};
use riscv::disasm::register_name;
use riscv::{Op, Xlen};

use crate::cpu::{
    CpuState, EXCP_BREAKPOINT, EXCP_DEBUG, EXCP_ILLEGAL_INST, EXCP_INST_ADDR_MIS, EXCP_U_ECALL,
    MISA_C, MSTATUS_FS,
};
use crate::ir::{
    AluOp, Cond, EnvField, GlobalField, HelperId, IrBuffer, IrBuilder, Label, MemOp, Temp,
};

pub const TARGET_PAGE_BITS: u32 = 12;
pub const TARGET_PAGE_SIZE: u64 = 1 << TARGET_PAGE_BITS;
pub const TARGET_PAGE_MASK: u64 = !(TARGET_PAGE_SIZE - 1);

/// Default cap on guest instructions per block.
pub const DEFAULT_MAX_INSNS: u32 = 512;

/// Translation-side code fetch, routed through the engine's fetch path.
/// Faults surface on the engine side as fetch exceptions.
pub trait CodeMemory {
    fn fetch_u32(&self, pc: u64) -> u32;
}

/// Why the block loop stopped emitting.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockState {
    /// Keep decoding; outside the loop, means the block hit the page end.
    None,
    /// Re-enter the engine for side effects (CSR, fence.i, WFI, vsetvl).
    Stop,
    /// Control flow was redirected; the emitter produced the exit sequence.
    Branch,
}

/// One translation block, owned by the builder during emission and handed to
/// the engine afterwards.
pub struct TranslationBlock {
    /// Starting guest PC.
    pub pc: u64,
    /// Guest bytes covered by the emitted code.
    pub size: u64,
    /// Size recorded on first emission; a search-pc re-pass stops when it
    /// has re-covered exactly this much.
    pub original_size: u64,
    pub icount: u32,
    /// Set for the PC-reconstruction re-pass.
    pub search_pc: bool,
}

impl TranslationBlock {
    pub fn new(pc: u64) -> TranslationBlock {
        TranslationBlock { pc, size: 0, original_size: 0, icount: 0, search_pc: false }
    }
}

/// Per-block decode state, created at emission start and dropped with the
/// loop. Mutated only by the emitter.
struct DisasContext {
    pc: u64,
    next_pc: u64,
    opcode: u32,
    mem_idx: u32,
    singlestep: bool,
    bstate: BlockState,
    /// Start PC of the block being emitted; chaining compares pages
    /// against this.
    tb_pc: u64,
    rvc: bool,
}

#[rustfmt::skip]
const FPR_NAMES: [&str; 32] = [
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7",
    "fs0", "fs1", "fa0", "fa1", "fa2", "fa3", "fa4", "fa5",
    "fa6", "fa7", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7",
    "fs8", "fs9", "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];

enum SgnjKind {
    Copy,
    Negate,
    Xor,
}

enum AmoKind {
    Lr,
    Sc,
    Swap,
    Op(AluOp),
    MinMax(Cond),
}

enum MulhKind {
    Signed,
    SignedUnsigned,
    Unsigned,
}

/// Holds the global temp handles bound at `translate_init`. This is the
/// explicit-context replacement for the original's file-level statics.
pub struct Translator {
    /// gpr[0] is intentionally never bound; x0 reads and writes go through
    /// `get_gpr`/`set_gpr` which special-case it.
    gpr: [Temp; 32],
    fpr: [Temp; 32],
    pc: Temp,
    #[allow(dead_code)]
    load_res: Temp,
    xlen: Xlen,
}

/// Bind global IR handles for the guest registers, PC and the LR/SC
/// reservation slot. Called once at engine start.
pub fn translate_init<I: IrBuilder>(ir: &mut I, xlen: Xlen) -> Translator {
    let mut gpr = [Temp(!0); 32];
    for i in 1..32 {
        gpr[i] = ir.new_global(GlobalField::Gpr(i as u8), register_name(i as u8));
    }

    let mut fpr = [Temp(!0); 32];
    for (i, slot) in fpr.iter_mut().enumerate() {
        *slot = ir.new_global(GlobalField::Fpr(i as u8), FPR_NAMES[i]);
    }

    let pc = ir.new_global(GlobalField::Pc, "pc");
    let load_res = ir.new_global(GlobalField::LoadRes, "load_res");

    Translator { gpr, fpr, pc, load_res, xlen }
}

impl Translator {
    pub fn xlen(&self) -> Xlen {
        self.xlen
    }

    // -- register access contract ----------------------------------------

    /// Read GPR `reg` into `t`; x0 materialises a constant zero.
    fn get_gpr<I: IrBuilder>(&self, ir: &mut I, t: Temp, reg: u8) {
        if reg == 0 {
            ir.movi(t, 0);
        } else {
            ir.mov(t, self.gpr[reg as usize]);
        }
    }

    /// Write `t` to GPR `reg`; writes to x0 are dropped.
    fn set_gpr<I: IrBuilder>(&self, ir: &mut I, reg: u8, t: Temp) {
        if reg != 0 {
            ir.mov(self.gpr[reg as usize], t);
        }
    }

    /// Write the sign-extended low 32 bits of `t` to GPR `reg`.
    fn set_gpr_sx32<I: IrBuilder>(&self, ir: &mut I, reg: u8, t: Temp) {
        if reg != 0 {
            ir.ext32s(self.gpr[reg as usize], t);
        }
    }

    // -- exceptions ------------------------------------------------------

    fn generate_exception<I: IrBuilder>(&self, ctx: &DisasContext, ir: &mut I, excp: u32) {
        ir.movi(self.pc, ctx.pc);
        let t = ir.movi_temp(excp as u64);
        ir.call(HelperId::RaiseException, None, &[t]);
        ir.temp_free(t);
    }

    /// Raise with a bad-address operand. The faulting instruction's own PC
    /// goes to the pc slot; `badaddr` carries the offending address.
    fn generate_exception_badaddr<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        excp: u32,
        badaddr: Temp,
    ) {
        ir.movi(self.pc, ctx.pc);
        let t = ir.movi_temp(excp as u64);
        ir.call(HelperId::RaiseExceptionMbadaddr, None, &[t, badaddr]);
        ir.temp_free(t);
    }

    /// Unknown or rejected instruction.
    fn kill_unknown<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, excp: u32) {
        self.generate_exception(ctx, ir, excp);
        ctx.bstate = BlockState::Stop;
    }

    // -- direct-jump chaining --------------------------------------------

    fn use_goto_tb(&self, ctx: &DisasContext, dest: u64) -> bool {
        if ctx.singlestep {
            return false;
        }
        // Chaining is only allowed within the block's own page.
        (ctx.tb_pc & TARGET_PAGE_MASK) == (dest & TARGET_PAGE_MASK)
    }

    fn gen_goto_tb<I: IrBuilder>(&self, ctx: &DisasContext, ir: &mut I, slot: u32, dest: u64) {
        if self.use_goto_tb(ctx, dest) {
            ir.goto_tb(slot);
            ir.movi(self.pc, dest);
            ir.exit_tb(slot as u64 + 1);
        } else {
            ir.movi(self.pc, dest);
            if ctx.singlestep {
                ir.call(HelperId::RaiseExceptionDebug, None, &[]);
            }
            ir.exit_tb(0);
        }
    }

    // -- integer ALU -----------------------------------------------------

    fn gen_arith<I: IrBuilder>(&self, ir: &mut I, op: AluOp, w: bool, rd: u8, rs1: u8, rs2: u8) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        ir.alu(op, s1, s1, s2);
        if w {
            ir.ext32s(s1, s1);
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
        ir.temp_free(s2);
    }

    fn gen_arith_imm<I: IrBuilder>(&self, ir: &mut I, op: AluOp, w: bool, rd: u8, rs1: u8, imm: i32) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        ir.alui(op, s1, s1, imm as i64 as u64);
        if w {
            ir.ext32s(s1, s1);
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
    }

    fn gen_setcond_reg<I: IrBuilder>(&self, ir: &mut I, cond: Cond, rd: u8, rs1: u8, rs2: u8) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        ir.setcond(cond, s1, s1, s2);
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
        ir.temp_free(s2);
    }

    fn gen_setcond_imm<I: IrBuilder>(&self, ir: &mut I, cond: Cond, rd: u8, rs1: u8, imm: i32) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        ir.setcondi(cond, s1, s1, imm as i64 as u64);
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
    }

    /// Register-amount shift. W forms narrow the operand first and mask the
    /// amount to 5 bits; full-width forms mask by XLEN - 1.
    fn gen_shift<I: IrBuilder>(&self, ir: &mut I, op: AluOp, w: bool, rd: u8, rs1: u8, rs2: u8) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        if w {
            match op {
                AluOp::Shr => ir.ext32u(s1, s1),
                AluOp::Sar => ir.ext32s(s1, s1),
                _ => (),
            }
            ir.alui(AluOp::And, s2, s2, 0x1f);
        } else {
            ir.alui(AluOp::And, s2, s2, self.xlen.shamt_mask() as u64);
        }
        ir.alu(op, s1, s1, s2);
        if w {
            ir.ext32s(s1, s1);
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
        ir.temp_free(s2);
    }

    /// Immediate-amount shift; the decoder already validated the amount.
    fn gen_shift_imm<I: IrBuilder>(&self, ir: &mut I, op: AluOp, w: bool, rd: u8, rs1: u8, shamt: i32) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        if w {
            match op {
                AluOp::Shr => ir.ext32u(s1, s1),
                AluOp::Sar => ir.ext32s(s1, s1),
                _ => (),
            }
        }
        ir.alui(op, s1, s1, shamt as u64);
        if w {
            ir.ext32s(s1, s1);
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
    }

    // -- multiply --------------------------------------------------------

    /// MULHSU: unsigned double-width multiply, then subtract
    /// `arg2 & (arg1 >> (XLEN - 1))` from the high word to account for a
    /// negative arg1.
    fn gen_mulhsu<I: IrBuilder>(&self, ir: &mut I, ret: Temp, arg1: Temp, arg2: Temp) {
        let lo = ir.new_temp();
        let hi = ir.new_temp();
        ir.mulu2(lo, hi, arg1, arg2);
        let sign_mask = ir.new_temp();
        ir.alui(AluOp::Sar, sign_mask, arg1, (self.xlen.bits() - 1) as u64);
        let corr = ir.new_temp();
        ir.alu(AluOp::And, corr, sign_mask, arg2);
        ir.alu(AluOp::Sub, ret, hi, corr);
        ir.temp_free(lo);
        ir.temp_free(hi);
        ir.temp_free(sign_mask);
        ir.temp_free(corr);
    }

    fn gen_mulh<I: IrBuilder>(&self, ir: &mut I, kind: MulhKind, rd: u8, rs1: u8, rs2: u8) {
        if rd == 0 {
            return;
        }
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        match kind {
            MulhKind::Signed => ir.muls2(s2, s1, s1, s2),
            MulhKind::Unsigned => ir.mulu2(s2, s1, s1, s2),
            MulhKind::SignedUnsigned => self.gen_mulhsu(ir, s1, s1, s2),
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
        ir.temp_free(s2);
    }

    // -- divide / remainder ----------------------------------------------

    /// Division and remainder with the architected special cases folded in
    /// via conditional moves, so the native divide never sees a zero
    /// divisor or a signed overflow.
    fn gen_div<I: IrBuilder>(&self, ir: &mut I, op: AluOp, w: bool, rd: u8, rs1: u8, rs2: u8) {
        if rd == 0 {
            return;
        }
        let narrow = w || self.xlen == Xlen::Rv32;
        let min_int: u64 = if narrow { i32::min_value() as i64 as u64 } else { 1 << 63 };
        let neg1: u64 = !0;

        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        if w {
            match op {
                AluOp::Div | AluOp::Rem => {
                    ir.ext32s(s1, s1);
                    ir.ext32s(s2, s2);
                }
                _ => {
                    ir.ext32u(s1, s1);
                    ir.ext32u(s2, s2);
                }
            }
        }

        match op {
            AluOp::Div => {
                let cond1 = ir.new_temp();
                let cond2 = ir.new_temp();
                let zero = ir.movi_temp(0);
                let sentinel = ir.new_temp();

                ir.movi(sentinel, neg1);
                ir.setcondi(Cond::Eq, cond2, s2, neg1);
                ir.setcondi(Cond::Eq, cond1, s1, min_int);
                ir.alu(AluOp::And, cond1, cond1, cond2); // cond1 = overflow
                ir.setcondi(Cond::Eq, cond2, s2, 0); // cond2 = div by zero
                // Divide by zero forces the dividend to -1.
                ir.movcond(Cond::Eq, s1, cond2, zero, s1, sentinel);
                // Either special case forces the divisor to 1.
                ir.alu(AluOp::Or, cond1, cond1, cond2);
                ir.movi(sentinel, 1);
                ir.movcond(Cond::Eq, s2, cond1, zero, s2, sentinel);
                ir.alu(AluOp::Div, s1, s1, s2);

                ir.temp_free(cond1);
                ir.temp_free(cond2);
                ir.temp_free(zero);
                ir.temp_free(sentinel);
            }
            AluOp::Divu => {
                let cond1 = ir.new_temp();
                let zero = ir.movi_temp(0);
                let sentinel = ir.new_temp();

                ir.setcondi(Cond::Eq, cond1, s2, 0);
                ir.movi(sentinel, neg1);
                ir.movcond(Cond::Eq, s1, cond1, zero, s1, sentinel);
                ir.movi(sentinel, 1);
                ir.movcond(Cond::Eq, s2, cond1, zero, s2, sentinel);
                ir.alu(AluOp::Divu, s1, s1, s2);

                ir.temp_free(cond1);
                ir.temp_free(zero);
                ir.temp_free(sentinel);
            }
            AluOp::Rem => {
                let cond1 = ir.new_temp();
                let cond2 = ir.new_temp();
                let zero = ir.movi_temp(0);
                let result = ir.new_temp();

                ir.movi(result, 1);
                ir.setcondi(Cond::Eq, cond2, s2, neg1);
                ir.setcondi(Cond::Eq, cond1, s1, min_int);
                ir.alu(AluOp::And, cond2, cond1, cond2); // cond2 = overflow
                ir.setcondi(Cond::Eq, cond1, s2, 0); // cond1 = div by zero
                ir.alu(AluOp::Or, cond2, cond2, cond1);
                // Either special case forces the divisor to 1; overflow then
                // yields remainder 0 naturally.
                ir.movcond(Cond::Eq, s2, cond2, zero, s2, result);
                ir.alu(AluOp::Rem, result, s1, s2);
                // Divide by zero returns the dividend untouched.
                ir.movcond(Cond::Eq, s1, cond1, zero, result, s1);

                ir.temp_free(cond1);
                ir.temp_free(cond2);
                ir.temp_free(zero);
                ir.temp_free(result);
            }
            AluOp::Remu => {
                let cond1 = ir.new_temp();
                let zero = ir.movi_temp(0);
                let result = ir.new_temp();

                ir.movi(result, 1);
                ir.setcondi(Cond::Eq, cond1, s2, 0);
                ir.movcond(Cond::Eq, s2, cond1, zero, s2, result);
                ir.alu(AluOp::Remu, result, s1, s2);
                ir.movcond(Cond::Eq, s1, cond1, zero, result, s1);

                ir.temp_free(cond1);
                ir.temp_free(zero);
                ir.temp_free(result);
            }
            _ => unreachable!(),
        }

        if w {
            ir.ext32s(s1, s1);
        }
        self.set_gpr(ir, rd, s1);
        ir.temp_free(s1);
        ir.temp_free(s2);
    }

    // -- branches and jumps ----------------------------------------------

    fn gen_branch<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        cond: Cond,
        rs1: u8,
        rs2: u8,
        bimm: i32,
    ) {
        let taken = ir.new_label();
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        ir.brcond(cond, s1, s2, taken);
        ir.temp_free(s1);
        ir.temp_free(s2);

        // Fall through: chain slot 1 to the next instruction.
        self.gen_goto_tb(ctx, ir, 1, ctx.next_pc);

        ir.set_label(taken);
        let target = ctx.pc.wrapping_add(bimm as i64 as u64);
        if !ctx.rvc && target & 0x3 != 0 {
            let bad = ir.movi_temp(target);
            self.generate_exception_badaddr(ctx, ir, EXCP_INST_ADDR_MIS, bad);
            ir.temp_free(bad);
            ir.exit_tb(0);
        } else {
            self.gen_goto_tb(ctx, ir, 0, target);
        }
        ctx.bstate = BlockState::Branch;
    }

    fn gen_jal<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, rd: u8, imm: i32) {
        let target = ctx.pc.wrapping_add(imm as i64 as u64);
        // The target is known at translation time, so the alignment check
        // is static.
        if !ctx.rvc && target & 0x3 != 0 {
            let bad = ir.movi_temp(target);
            self.generate_exception_badaddr(ctx, ir, EXCP_INST_ADDR_MIS, bad);
            ir.temp_free(bad);
        }
        if rd != 0 {
            ir.movi(self.gpr[rd as usize], ctx.next_pc);
        }
        self.gen_goto_tb(ctx, ir, 0, target);
        ctx.bstate = BlockState::Branch;
    }

    /// JALR never chains: the target is data-dependent.
    fn gen_jalr<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, rd: u8, rs1: u8, imm: i32) {
        let misaligned = ir.new_label();
        let t0 = ir.new_temp();

        self.get_gpr(ir, self.pc, rs1);
        ir.alui(AluOp::Add, self.pc, self.pc, imm as i64 as u64);
        ir.alui(AluOp::And, self.pc, self.pc, !1u64);

        if !ctx.rvc {
            // Bit 0 is already clear; a set bit 1 means a misaligned
            // 4-byte fetch.
            ir.alui(AluOp::And, t0, self.pc, 0x2);
            ir.brcondi(Cond::Ne, t0, 0, misaligned);
        }

        if rd != 0 {
            ir.movi(self.gpr[rd as usize], ctx.next_pc);
        }
        ir.exit_tb(0);

        ir.set_label(misaligned);
        let bad = ir.new_temp();
        ir.mov(bad, self.pc);
        self.generate_exception_badaddr(ctx, ir, EXCP_INST_ADDR_MIS, bad);
        ir.temp_free(bad);
        ir.exit_tb(0);

        ctx.bstate = BlockState::Branch;
        ir.temp_free(t0);
    }

    // -- loads and stores ------------------------------------------------

    fn gen_load<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        memop: MemOp,
        rd: u8,
        rs1: u8,
        imm: i32,
    ) {
        let t0 = ir.new_temp();
        let t1 = ir.new_temp();
        self.get_gpr(ir, t0, rs1);
        ir.alui(AluOp::Add, t0, t0, imm as i64 as u64);
        // A faulting access must report this instruction's address.
        ir.movi(self.pc, ctx.pc);
        ir.guest_ld(t1, t0, memop, ctx.mem_idx);
        self.set_gpr(ir, rd, t1);
        ir.temp_free(t0);
        ir.temp_free(t1);
    }

    fn gen_store<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        memop: MemOp,
        rs1: u8,
        rs2: u8,
        imm: i32,
    ) {
        ir.movi(self.pc, ctx.pc);
        let t0 = ir.new_temp();
        let dat = ir.new_temp();
        self.get_gpr(ir, t0, rs1);
        ir.alui(AluOp::Add, t0, t0, imm as i64 as u64);
        self.get_gpr(ir, dat, rs2);
        ir.guest_st(dat, t0, memop, ctx.mem_idx);
        ir.temp_free(t0);
        ir.temp_free(dat);
    }

    // -- floating point --------------------------------------------------

    /// Emit the mstatus.FS guard. Returns the label to bind after the
    /// guarded emission; the disabled path raises Illegal and jumps there.
    fn fs_guard<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I) -> Label {
        let t0 = ir.new_temp();
        let fp_ok = ir.new_label();
        let done = ir.new_label();
        ir.load_env(t0, EnvField::Mstatus);
        ir.alui(AluOp::And, t0, t0, MSTATUS_FS);
        ir.brcondi(Cond::Ne, t0, 0, fp_ok);
        ir.temp_free(t0);
        self.kill_unknown(ctx, ir, EXCP_ILLEGAL_INST);
        ir.br(done);
        ir.set_label(fp_ok);
        done
    }

    fn gen_fp_load<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        memop: MemOp,
        frd: u8,
        rs1: u8,
        imm: i32,
    ) {
        let done = self.fs_guard(ctx, ir);
        let t0 = ir.new_temp();
        self.get_gpr(ir, t0, rs1);
        ir.alui(AluOp::Add, t0, t0, imm as i64 as u64);
        ir.movi(self.pc, ctx.pc);
        ir.guest_ld(self.fpr[frd as usize], t0, memop, ctx.mem_idx);
        ir.temp_free(t0);
        ir.set_label(done);
    }

    fn gen_fp_store<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        memop: MemOp,
        rs1: u8,
        frs2: u8,
        imm: i32,
    ) {
        let done = self.fs_guard(ctx, ir);
        let t0 = ir.new_temp();
        self.get_gpr(ir, t0, rs1);
        ir.alui(AluOp::Add, t0, t0, imm as i64 as u64);
        ir.movi(self.pc, ctx.pc);
        ir.guest_st(self.fpr[frs2 as usize], t0, memop, ctx.mem_idx);
        ir.temp_free(t0);
        ir.set_label(done);
    }

    /// Sign-injection is pure bit surgery; emitted inline rather than as a
    /// helper call. `sign_mask` is the MSB of the operand width.
    fn gen_fsgnj<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        kind: SgnjKind,
        frd: u8,
        frs1: u8,
        frs2: u8,
        sign_mask: u64,
    ) {
        let done = self.fs_guard(ctx, ir);
        let src1 = ir.new_temp();
        let src2 = ir.new_temp();
        ir.mov(src1, self.fpr[frs1 as usize]);
        ir.mov(src2, self.fpr[frs2 as usize]);
        match kind {
            SgnjKind::Copy => {
                ir.alui(AluOp::And, src1, src1, !sign_mask);
                ir.alui(AluOp::And, src2, src2, sign_mask);
                ir.alu(AluOp::Or, self.fpr[frd as usize], src1, src2);
            }
            SgnjKind::Negate => {
                ir.alui(AluOp::And, src1, src1, !sign_mask);
                ir.alui(AluOp::Xor, src2, src2, !0);
                ir.alui(AluOp::And, src2, src2, sign_mask);
                ir.alu(AluOp::Or, self.fpr[frd as usize], src1, src2);
            }
            SgnjKind::Xor => {
                ir.alui(AluOp::And, src2, src2, sign_mask);
                ir.alu(AluOp::Xor, self.fpr[frd as usize], src1, src2);
            }
        }
        ir.temp_free(src1);
        ir.temp_free(src2);
        ir.set_label(done);
    }

    /// Three-operand FP helper: frd = helper(frs1, frs2, rm).
    fn gen_fp3<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        frd: u8,
        frs1: u8,
        frs2: u8,
        rm: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let rm_t = ir.movi_temp(rm as u64);
        ir.call(
            helper,
            Some(self.fpr[frd as usize]),
            &[self.fpr[frs1 as usize], self.fpr[frs2 as usize], rm_t],
        );
        ir.temp_free(rm_t);
        ir.set_label(done);
    }

    /// Two-operand FP helper: frd = helper(frs1, rm). Covers sqrt and the
    /// FP-to-FP conversions.
    fn gen_fp2<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        frd: u8,
        frs1: u8,
        rm: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let rm_t = ir.movi_temp(rm as u64);
        ir.call(helper, Some(self.fpr[frd as usize]), &[self.fpr[frs1 as usize], rm_t]);
        ir.temp_free(rm_t);
        ir.set_label(done);
    }

    /// Min/max: frd = helper(frs1, frs2), no rounding mode.
    fn gen_fp_minmax<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        frd: u8,
        frs1: u8,
        frs2: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        ir.call(
            helper,
            Some(self.fpr[frd as usize]),
            &[self.fpr[frs1 as usize], self.fpr[frs2 as usize]],
        );
        ir.set_label(done);
    }

    /// Comparison: rd = helper(frs1, frs2).
    fn gen_fp_cmp<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        rd: u8,
        frs1: u8,
        frs2: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let d = ir.new_temp();
        ir.call(helper, Some(d), &[self.fpr[frs1 as usize], self.fpr[frs2 as usize]]);
        self.set_gpr(ir, rd, d);
        ir.temp_free(d);
        ir.set_label(done);
    }

    fn gen_fclass<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        rd: u8,
        frs1: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let d = ir.new_temp();
        ir.call(helper, Some(d), &[self.fpr[frs1 as usize]]);
        self.set_gpr(ir, rd, d);
        ir.temp_free(d);
        ir.set_label(done);
    }

    /// FP-to-integer conversion: rd = helper(frs1, rm).
    fn gen_fcvt_to_int<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        rd: u8,
        frs1: u8,
        rm: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let rm_t = ir.movi_temp(rm as u64);
        let d = ir.new_temp();
        ir.call(helper, Some(d), &[self.fpr[frs1 as usize], rm_t]);
        self.set_gpr(ir, rd, d);
        ir.temp_free(d);
        ir.temp_free(rm_t);
        ir.set_label(done);
    }

    /// Integer-to-FP conversion: frd = helper(rs1, rm).
    fn gen_fcvt_from_int<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        frd: u8,
        rs1: u8,
        rm: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let rm_t = ir.movi_temp(rm as u64);
        let s = ir.new_temp();
        self.get_gpr(ir, s, rs1);
        ir.call(helper, Some(self.fpr[frd as usize]), &[s, rm_t]);
        ir.temp_free(s);
        ir.temp_free(rm_t);
        ir.set_label(done);
    }

    /// FMV.X.{W,D}: FP bank to integer bank, sign-extending the narrow form.
    fn gen_fmv_to_int<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        rd: u8,
        frs1: u8,
        double: bool,
    ) {
        let done = self.fs_guard(ctx, ir);
        let d = ir.new_temp();
        if double {
            ir.mov(d, self.fpr[frs1 as usize]);
        } else {
            ir.ext32s(d, self.fpr[frs1 as usize]);
        }
        self.set_gpr(ir, rd, d);
        ir.temp_free(d);
        ir.set_label(done);
    }

    /// FMV.{W,D}.X: integer bank to FP bank, truncating the narrow form.
    fn gen_fmv_from_int<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        frd: u8,
        rs1: u8,
        double: bool,
    ) {
        let done = self.fs_guard(ctx, ir);
        let s = ir.new_temp();
        self.get_gpr(ir, s, rs1);
        if double {
            ir.mov(self.fpr[frd as usize], s);
        } else {
            ir.ext32u(self.fpr[frd as usize], s);
        }
        ir.temp_free(s);
        ir.set_label(done);
    }

    /// Fused multiply-add family: frd = helper(frs1, frs2, frs3, rm).
    fn gen_fma<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        frd: u8,
        frs1: u8,
        frs2: u8,
        frs3: u8,
        rm: u8,
    ) {
        let done = self.fs_guard(ctx, ir);
        let rm_t = ir.movi_temp(rm as u64);
        ir.call(
            helper,
            Some(self.fpr[frd as usize]),
            &[
                self.fpr[frs1 as usize],
                self.fpr[frs2 as usize],
                self.fpr[frs3 as usize],
                rm_t,
            ],
        );
        ir.temp_free(rm_t);
        ir.set_label(done);
    }

    // -- atomics ---------------------------------------------------------

    /// A-extension forms, lowered to plain load/store sequences. SC always
    /// reports success; min/max skip the store through the `done` label.
    /// This is not atomic; see DESIGN.md.
    fn gen_atomic<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        memop: MemOp,
        kind: AmoKind,
        rd: u8,
        rs1: u8,
        rs2: u8,
    ) {
        let done = ir.new_label();
        let s1 = ir.new_temp();
        let s2 = ir.new_temp();
        let dat = ir.new_temp();
        self.get_gpr(ir, s1, rs1);
        self.get_gpr(ir, s2, rs2);
        ir.movi(self.pc, ctx.pc);

        match kind {
            AmoKind::Lr => ir.guest_ld(dat, s1, memop, ctx.mem_idx),
            AmoKind::Sc => {
                ir.guest_st(s2, s1, memop, ctx.mem_idx);
                ir.movi(dat, 0); // assume always success
            }
            AmoKind::Swap => {
                ir.guest_ld(dat, s1, memop, ctx.mem_idx);
                ir.guest_st(s2, s1, memop, ctx.mem_idx);
            }
            AmoKind::Op(op) => {
                ir.guest_ld(dat, s1, memop, ctx.mem_idx);
                ir.alu(op, s2, dat, s2);
                ir.guest_st(s2, s1, memop, ctx.mem_idx);
            }
            AmoKind::MinMax(cond) => {
                ir.guest_ld(dat, s1, memop, ctx.mem_idx);
                // Memory already holds the winner: skip the store.
                ir.brcond(cond, dat, s2, done);
                ir.guest_st(s2, s1, memop, ctx.mem_idx);
            }
        }

        ir.set_label(done);
        self.set_gpr(ir, rd, dat);
        ir.temp_free(s1);
        ir.temp_free(s2);
        ir.temp_free(dat);
    }

    // -- system ----------------------------------------------------------

    /// CSR read/modify/write through a helper. The old value lands in rd;
    /// the block always ends because the write may change privilege or
    /// mapping assumptions of subsequent code.
    fn gen_csr<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        helper: HelperId,
        rd: u8,
        field: u8,
        is_imm: bool,
        csr: u16,
    ) {
        let source1 = ir.new_temp();
        if is_imm {
            ir.movi(source1, field as u64);
        } else {
            self.get_gpr(ir, source1, field);
        }
        ir.movi(self.pc, ctx.pc);
        let csr_t = ir.movi_temp(csr as u64);
        let dest = ir.new_temp();
        match helper {
            HelperId::Csrrw => ir.call(helper, Some(dest), &[source1, csr_t]),
            _ => {
                // csrrs/csrrc skip the write when the rs1 field is zero;
                // the helper needs the raw field to tell.
                let rs1_pass = ir.movi_temp(field as u64);
                ir.call(helper, Some(dest), &[source1, csr_t, rs1_pass]);
                ir.temp_free(rs1_pass);
            }
        }
        self.set_gpr(ir, rd, dest);
        ir.temp_free(dest);
        ir.temp_free(csr_t);
        ir.temp_free(source1);

        ir.movi(self.pc, ctx.next_pc);
        ir.exit_tb(0);
        ctx.bstate = BlockState::Branch;
    }

    fn gen_exception_exit<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, excp: u32) {
        self.generate_exception(ctx, ir, excp);
        ir.exit_tb(0);
        ctx.bstate = BlockState::Branch;
    }

    /// SRET/MRET: the helper computes the return PC into the pc slot.
    fn gen_trap_return<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, helper: HelperId) {
        ir.movi(self.pc, ctx.pc);
        ir.call(helper, Some(self.pc), &[self.pc]);
        ir.exit_tb(0);
        ctx.bstate = BlockState::Branch;
    }

    // -- vector ----------------------------------------------------------

    /// vset{i}vl{i}: the helper parses vtype, computes vl and updates the
    /// vector CSR state; the new vl lands in rd. The block ends because the
    /// configuration change invalidates following emissions.
    fn gen_vsetvl<I: IrBuilder>(
        &self,
        ctx: &mut DisasContext,
        ir: &mut I,
        rd: u8,
        rs1_field: u8,
        avl: Temp,
        vtype: Temp,
        is_rs1_imm: bool,
    ) {
        ir.movi(self.pc, ctx.pc);
        let rd_t = ir.movi_temp(rd as u64);
        let rs1_t = ir.movi_temp(rs1_field as u64);
        let imm_flag = ir.movi_temp(is_rs1_imm as u64);
        let dest = ir.new_temp();
        ir.call(HelperId::Vsetvl, Some(dest), &[rd_t, rs1_t, avl, vtype, imm_flag]);
        self.set_gpr(ir, rd, dest);
        ir.temp_free(dest);
        ir.temp_free(imm_flag);
        ir.temp_free(rs1_t);
        ir.temp_free(rd_t);
        ctx.bstate = BlockState::Stop;
    }

    /// Element-wise vector helper over three register indices.
    fn gen_vec_vvv<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        helper: HelperId,
        vd: u8,
        vs2: u8,
        vs1: u8,
    ) {
        ir.movi(self.pc, ctx.pc);
        let a = ir.movi_temp(vd as u64);
        let b = ir.movi_temp(vs2 as u64);
        let c = ir.movi_temp(vs1 as u64);
        ir.call(helper, None, &[a, b, c]);
        ir.temp_free(c);
        ir.temp_free(b);
        ir.temp_free(a);
    }

    /// Element-wise vector helper taking a scalar operand already in `s`.
    fn gen_vec_vvs<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        helper: HelperId,
        vd: u8,
        vs2: u8,
        s: Temp,
    ) {
        ir.movi(self.pc, ctx.pc);
        let a = ir.movi_temp(vd as u64);
        let b = ir.movi_temp(vs2 as u64);
        ir.call(helper, None, &[a, b, s]);
        ir.temp_free(b);
        ir.temp_free(a);
    }

    fn gen_vec_vvx<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        helper: HelperId,
        vd: u8,
        vs2: u8,
        rs1: u8,
    ) {
        let s = ir.new_temp();
        self.get_gpr(ir, s, rs1);
        self.gen_vec_vvs(ctx, ir, helper, vd, vs2, s);
        ir.temp_free(s);
    }

    fn gen_vec_vvi<I: IrBuilder>(
        &self,
        ctx: &DisasContext,
        ir: &mut I,
        helper: HelperId,
        vd: u8,
        vs2: u8,
        imm: i32,
    ) {
        let s = ir.movi_temp(imm as i64 as u64);
        self.gen_vec_vvs(ctx, ir, helper, vd, vs2, s);
        ir.temp_free(s);
    }

    // -- dispatch --------------------------------------------------------

    /// Emit IR for one decoded operation.
    fn translate_op<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, op: &Op) {
        use AluOp::*;
        match *op {
            Op::Illegal => self.kill_unknown(ctx, ir, EXCP_ILLEGAL_INST),

            Op::Lui { rd, imm } => {
                if rd != 0 {
                    ir.movi(self.gpr[rd as usize], imm as i64 as u64);
                }
            }
            Op::Auipc { rd, imm } => {
                if rd != 0 {
                    ir.movi(self.gpr[rd as usize], ctx.pc.wrapping_add(imm as i64 as u64));
                }
            }

            Op::Jal { rd, imm } => self.gen_jal(ctx, ir, rd, imm),
            Op::Jalr { rd, rs1, imm } => self.gen_jalr(ctx, ir, rd, rs1, imm),

            Op::Beq { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Eq, rs1, rs2, imm),
            Op::Bne { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Ne, rs1, rs2, imm),
            Op::Blt { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Lt, rs1, rs2, imm),
            Op::Bge { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Ge, rs1, rs2, imm),
            Op::Bltu { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Ltu, rs1, rs2, imm),
            Op::Bgeu { rs1, rs2, imm } => self.gen_branch(ctx, ir, Cond::Geu, rs1, rs2, imm),

            Op::Lb { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::I8, rd, rs1, imm),
            Op::Lh { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::I16, rd, rs1, imm),
            Op::Lw { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::I32, rd, rs1, imm),
            Op::Ld { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::I64, rd, rs1, imm),
            Op::Lbu { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::U8, rd, rs1, imm),
            Op::Lhu { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::U16, rd, rs1, imm),
            Op::Lwu { rd, rs1, imm } => self.gen_load(ctx, ir, MemOp::U32, rd, rs1, imm),

            Op::Sb { rs1, rs2, imm } => self.gen_store(ctx, ir, MemOp::U8, rs1, rs2, imm),
            Op::Sh { rs1, rs2, imm } => self.gen_store(ctx, ir, MemOp::U16, rs1, rs2, imm),
            Op::Sw { rs1, rs2, imm } => self.gen_store(ctx, ir, MemOp::U32, rs1, rs2, imm),
            Op::Sd { rs1, rs2, imm } => self.gen_store(ctx, ir, MemOp::I64, rs1, rs2, imm),

            Op::Addi { rd, rs1, imm } => self.gen_arith_imm(ir, Add, false, rd, rs1, imm),
            Op::Slti { rd, rs1, imm } => self.gen_setcond_imm(ir, Cond::Lt, rd, rs1, imm),
            Op::Sltiu { rd, rs1, imm } => self.gen_setcond_imm(ir, Cond::Ltu, rd, rs1, imm),
            Op::Xori { rd, rs1, imm } => self.gen_arith_imm(ir, Xor, false, rd, rs1, imm),
            Op::Ori { rd, rs1, imm } => self.gen_arith_imm(ir, Or, false, rd, rs1, imm),
            Op::Andi { rd, rs1, imm } => self.gen_arith_imm(ir, And, false, rd, rs1, imm),
            Op::Slli { rd, rs1, imm } => self.gen_shift_imm(ir, Shl, false, rd, rs1, imm),
            Op::Srli { rd, rs1, imm } => self.gen_shift_imm(ir, Shr, false, rd, rs1, imm),
            Op::Srai { rd, rs1, imm } => self.gen_shift_imm(ir, Sar, false, rd, rs1, imm),

            Op::Addiw { rd, rs1, imm } => self.gen_arith_imm(ir, Add, true, rd, rs1, imm),
            Op::Slliw { rd, rs1, imm } => self.gen_shift_imm(ir, Shl, true, rd, rs1, imm),
            Op::Srliw { rd, rs1, imm } => self.gen_shift_imm(ir, Shr, true, rd, rs1, imm),
            Op::Sraiw { rd, rs1, imm } => self.gen_shift_imm(ir, Sar, true, rd, rs1, imm),

            Op::Add { rd, rs1, rs2 } => self.gen_arith(ir, Add, false, rd, rs1, rs2),
            Op::Sub { rd, rs1, rs2 } => self.gen_arith(ir, Sub, false, rd, rs1, rs2),
            Op::Sll { rd, rs1, rs2 } => self.gen_shift(ir, Shl, false, rd, rs1, rs2),
            Op::Slt { rd, rs1, rs2 } => self.gen_setcond_reg(ir, Cond::Lt, rd, rs1, rs2),
            Op::Sltu { rd, rs1, rs2 } => self.gen_setcond_reg(ir, Cond::Ltu, rd, rs1, rs2),
            Op::Xor { rd, rs1, rs2 } => self.gen_arith(ir, Xor, false, rd, rs1, rs2),
            Op::Srl { rd, rs1, rs2 } => self.gen_shift(ir, Shr, false, rd, rs1, rs2),
            Op::Sra { rd, rs1, rs2 } => self.gen_shift(ir, Sar, false, rd, rs1, rs2),
            Op::Or { rd, rs1, rs2 } => self.gen_arith(ir, Or, false, rd, rs1, rs2),
            Op::And { rd, rs1, rs2 } => self.gen_arith(ir, And, false, rd, rs1, rs2),

            Op::Addw { rd, rs1, rs2 } => self.gen_arith(ir, Add, true, rd, rs1, rs2),
            Op::Subw { rd, rs1, rs2 } => self.gen_arith(ir, Sub, true, rd, rs1, rs2),
            Op::Sllw { rd, rs1, rs2 } => self.gen_shift(ir, Shl, true, rd, rs1, rs2),
            Op::Srlw { rd, rs1, rs2 } => self.gen_shift(ir, Shr, true, rd, rs1, rs2),
            Op::Sraw { rd, rs1, rs2 } => self.gen_shift(ir, Sar, true, rd, rs1, rs2),

            Op::Mul { rd, rs1, rs2 } => self.gen_arith(ir, Mul, false, rd, rs1, rs2),
            Op::Mulh { rd, rs1, rs2 } => self.gen_mulh(ir, MulhKind::Signed, rd, rs1, rs2),
            Op::Mulhsu { rd, rs1, rs2 } => {
                self.gen_mulh(ir, MulhKind::SignedUnsigned, rd, rs1, rs2)
            }
            Op::Mulhu { rd, rs1, rs2 } => self.gen_mulh(ir, MulhKind::Unsigned, rd, rs1, rs2),
            Op::Div { rd, rs1, rs2 } => self.gen_div(ir, Div, false, rd, rs1, rs2),
            Op::Divu { rd, rs1, rs2 } => self.gen_div(ir, Divu, false, rd, rs1, rs2),
            Op::Rem { rd, rs1, rs2 } => self.gen_div(ir, Rem, false, rd, rs1, rs2),
            Op::Remu { rd, rs1, rs2 } => self.gen_div(ir, Remu, false, rd, rs1, rs2),
            Op::Mulw { rd, rs1, rs2 } => self.gen_arith(ir, Mul, true, rd, rs1, rs2),
            Op::Divw { rd, rs1, rs2 } => self.gen_div(ir, Div, true, rd, rs1, rs2),
            Op::Divuw { rd, rs1, rs2 } => self.gen_div(ir, Divu, true, rd, rs1, rs2),
            Op::Remw { rd, rs1, rs2 } => self.gen_div(ir, Rem, true, rd, rs1, rs2),
            Op::Remuw { rd, rs1, rs2 } => self.gen_div(ir, Remu, true, rd, rs1, rs2),

            Op::LrW { rd, rs1, .. } => self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Lr, rd, rs1, 0),
            Op::LrD { rd, rs1, .. } => self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Lr, rd, rs1, 0),
            Op::ScW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Sc, rd, rs1, rs2)
            }
            Op::ScD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Sc, rd, rs1, rs2)
            }
            Op::AmoswapW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Swap, rd, rs1, rs2)
            }
            Op::AmoswapD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Swap, rd, rs1, rs2)
            }
            Op::AmoaddW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Op(Add), rd, rs1, rs2)
            }
            Op::AmoaddD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Op(Add), rd, rs1, rs2)
            }
            Op::AmoxorW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Op(Xor), rd, rs1, rs2)
            }
            Op::AmoxorD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Op(Xor), rd, rs1, rs2)
            }
            Op::AmoandW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Op(And), rd, rs1, rs2)
            }
            Op::AmoandD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Op(And), rd, rs1, rs2)
            }
            Op::AmoorW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::Op(Or), rd, rs1, rs2)
            }
            Op::AmoorD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::Op(Or), rd, rs1, rs2)
            }
            Op::AmominW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::MinMax(Cond::Lt), rd, rs1, rs2)
            }
            Op::AmominD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::MinMax(Cond::Lt), rd, rs1, rs2)
            }
            Op::AmomaxW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::MinMax(Cond::Gt), rd, rs1, rs2)
            }
            Op::AmomaxD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::MinMax(Cond::Gt), rd, rs1, rs2)
            }
            Op::AmominuW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::MinMax(Cond::Ltu), rd, rs1, rs2)
            }
            Op::AmominuD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::MinMax(Cond::Ltu), rd, rs1, rs2)
            }
            Op::AmomaxuW { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I32, AmoKind::MinMax(Cond::Gtu), rd, rs1, rs2)
            }
            Op::AmomaxuD { rd, rs1, rs2, .. } => {
                self.gen_atomic(ctx, ir, MemOp::I64, AmoKind::MinMax(Cond::Gtu), rd, rs1, rs2)
            }

            Op::Flw { frd, rs1, imm } => self.gen_fp_load(ctx, ir, MemOp::U32, frd, rs1, imm),
            Op::Fld { frd, rs1, imm } => self.gen_fp_load(ctx, ir, MemOp::I64, frd, rs1, imm),
            Op::Fsw { rs1, frs2, imm } => self.gen_fp_store(ctx, ir, MemOp::U32, rs1, frs2, imm),
            Op::Fsd { rs1, frs2, imm } => self.gen_fp_store(ctx, ir, MemOp::I64, rs1, frs2, imm),

            Op::FaddS { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FaddS, frd, frs1, frs2, rm)
            }
            Op::FsubS { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FsubS, frd, frs1, frs2, rm)
            }
            Op::FmulS { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FmulS, frd, frs1, frs2, rm)
            }
            Op::FdivS { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FdivS, frd, frs1, frs2, rm)
            }
            Op::FsqrtS { frd, frs1, rm } => self.gen_fp2(ctx, ir, HelperId::FsqrtS, frd, frs1, rm),
            Op::FsgnjS { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Copy, frd, frs1, frs2, i32::min_value() as i64 as u64)
            }
            Op::FsgnjnS { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Negate, frd, frs1, frs2, i32::min_value() as i64 as u64)
            }
            Op::FsgnjxS { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Xor, frd, frs1, frs2, i32::min_value() as i64 as u64)
            }
            Op::FminS { frd, frs1, frs2 } => {
                self.gen_fp_minmax(ctx, ir, HelperId::FminS, frd, frs1, frs2)
            }
            Op::FmaxS { frd, frs1, frs2 } => {
                self.gen_fp_minmax(ctx, ir, HelperId::FmaxS, frd, frs1, frs2)
            }
            Op::FeqS { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FeqS, rd, frs1, frs2),
            Op::FltS { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FltS, rd, frs1, frs2),
            Op::FleS { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FleS, rd, frs1, frs2),
            Op::FclassS { rd, frs1 } => self.gen_fclass(ctx, ir, HelperId::FclassS, rd, frs1),
            Op::FcvtWS { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtWS, rd, frs1, rm)
            }
            Op::FcvtWuS { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtWuS, rd, frs1, rm)
            }
            Op::FcvtLS { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtLS, rd, frs1, rm)
            }
            Op::FcvtLuS { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtLuS, rd, frs1, rm)
            }
            Op::FcvtSW { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtSW, frd, rs1, rm)
            }
            Op::FcvtSWu { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtSWu, frd, rs1, rm)
            }
            Op::FcvtSL { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtSL, frd, rs1, rm)
            }
            Op::FcvtSLu { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtSLu, frd, rs1, rm)
            }
            Op::FmvXW { rd, frs1 } => self.gen_fmv_to_int(ctx, ir, rd, frs1, false),
            Op::FmvWX { frd, rs1 } => self.gen_fmv_from_int(ctx, ir, frd, rs1, false),
            Op::FmaddS { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FmaddS, frd, frs1, frs2, frs3, rm)
            }
            Op::FmsubS { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FmsubS, frd, frs1, frs2, frs3, rm)
            }
            Op::FnmsubS { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FnmsubS, frd, frs1, frs2, frs3, rm)
            }
            Op::FnmaddS { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FnmaddS, frd, frs1, frs2, frs3, rm)
            }

            Op::FaddD { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FaddD, frd, frs1, frs2, rm)
            }
            Op::FsubD { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FsubD, frd, frs1, frs2, rm)
            }
            Op::FmulD { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FmulD, frd, frs1, frs2, rm)
            }
            Op::FdivD { frd, frs1, frs2, rm } => {
                self.gen_fp3(ctx, ir, HelperId::FdivD, frd, frs1, frs2, rm)
            }
            Op::FsqrtD { frd, frs1, rm } => self.gen_fp2(ctx, ir, HelperId::FsqrtD, frd, frs1, rm),
            Op::FsgnjD { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Copy, frd, frs1, frs2, 1 << 63)
            }
            Op::FsgnjnD { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Negate, frd, frs1, frs2, 1 << 63)
            }
            Op::FsgnjxD { frd, frs1, frs2 } => {
                self.gen_fsgnj(ctx, ir, SgnjKind::Xor, frd, frs1, frs2, 1 << 63)
            }
            Op::FminD { frd, frs1, frs2 } => {
                self.gen_fp_minmax(ctx, ir, HelperId::FminD, frd, frs1, frs2)
            }
            Op::FmaxD { frd, frs1, frs2 } => {
                self.gen_fp_minmax(ctx, ir, HelperId::FmaxD, frd, frs1, frs2)
            }
            Op::FeqD { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FeqD, rd, frs1, frs2),
            Op::FltD { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FltD, rd, frs1, frs2),
            Op::FleD { rd, frs1, frs2 } => self.gen_fp_cmp(ctx, ir, HelperId::FleD, rd, frs1, frs2),
            Op::FclassD { rd, frs1 } => self.gen_fclass(ctx, ir, HelperId::FclassD, rd, frs1),
            Op::FcvtSD { frd, frs1, rm } => self.gen_fp2(ctx, ir, HelperId::FcvtSD, frd, frs1, rm),
            Op::FcvtDS { frd, frs1, rm } => self.gen_fp2(ctx, ir, HelperId::FcvtDS, frd, frs1, rm),
            Op::FcvtWD { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtWD, rd, frs1, rm)
            }
            Op::FcvtWuD { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtWuD, rd, frs1, rm)
            }
            Op::FcvtLD { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtLD, rd, frs1, rm)
            }
            Op::FcvtLuD { rd, frs1, rm } => {
                self.gen_fcvt_to_int(ctx, ir, HelperId::FcvtLuD, rd, frs1, rm)
            }
            Op::FcvtDW { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtDW, frd, rs1, rm)
            }
            Op::FcvtDWu { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtDWu, frd, rs1, rm)
            }
            Op::FcvtDL { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtDL, frd, rs1, rm)
            }
            Op::FcvtDLu { frd, rs1, rm } => {
                self.gen_fcvt_from_int(ctx, ir, HelperId::FcvtDLu, frd, rs1, rm)
            }
            Op::FmvXD { rd, frs1 } => self.gen_fmv_to_int(ctx, ir, rd, frs1, true),
            Op::FmvDX { frd, rs1 } => self.gen_fmv_from_int(ctx, ir, frd, rs1, true),
            Op::FmaddD { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FmaddD, frd, frs1, frs2, frs3, rm)
            }
            Op::FmsubD { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FmsubD, frd, frs1, frs2, frs3, rm)
            }
            Op::FnmsubD { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FnmsubD, frd, frs1, frs2, frs3, rm)
            }
            Op::FnmaddD { frd, frs1, frs2, frs3, rm } => {
                self.gen_fma(ctx, ir, HelperId::FnmaddD, frd, frs1, frs2, frs3, rm)
            }

            Op::Fence => (), // plain fence is a nop for this engine
            Op::FenceI => {
                // fence.i may invalidate code already translated.
                ir.call(HelperId::FenceI, None, &[]);
                ir.movi(self.pc, ctx.next_pc);
                ir.exit_tb(0);
                ctx.bstate = BlockState::Branch;
            }

            Op::Ecall => self.gen_exception_exit(ctx, ir, EXCP_U_ECALL),
            Op::Ebreak => self.gen_exception_exit(ctx, ir, EXCP_BREAKPOINT),
            Op::Sret => self.gen_trap_return(ctx, ir, HelperId::Sret),
            Op::Mret => self.gen_trap_return(ctx, ir, HelperId::Mret),
            Op::Wfi => {
                ir.movi(self.pc, ctx.next_pc);
                ir.call(HelperId::Wfi, None, &[]);
                ctx.bstate = BlockState::Stop;
            }
            Op::SfenceVma { .. } => {
                // TODO: flush only the ASID/page the operands select.
                ir.call(HelperId::TlbFlush, None, &[]);
                ctx.bstate = BlockState::Stop;
            }

            Op::Csrrw { rd, rs1, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrw, rd, rs1, false, csr)
            }
            Op::Csrrs { rd, rs1, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrs, rd, rs1, false, csr)
            }
            Op::Csrrc { rd, rs1, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrc, rd, rs1, false, csr)
            }
            Op::Csrrwi { rd, imm, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrw, rd, imm, true, csr)
            }
            Op::Csrrsi { rd, imm, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrs, rd, imm, true, csr)
            }
            Op::Csrrci { rd, imm, csr } => {
                self.gen_csr(ctx, ir, HelperId::Csrrc, rd, imm, true, csr)
            }

            Op::Vsetvli { rd, rs1, vtypei } => {
                let avl = ir.new_temp();
                self.get_gpr(ir, avl, rs1);
                let vtype = ir.movi_temp(vtypei as u64);
                self.gen_vsetvl(ctx, ir, rd, rs1, avl, vtype, false);
                ir.temp_free(vtype);
                ir.temp_free(avl);
            }
            Op::Vsetivli { rd, uimm, vtypei } => {
                let avl = ir.movi_temp(uimm as u64);
                let vtype = ir.movi_temp(vtypei as u64);
                self.gen_vsetvl(ctx, ir, rd, uimm, avl, vtype, true);
                ir.temp_free(vtype);
                ir.temp_free(avl);
            }
            Op::Vsetvl { rd, rs1, rs2 } => {
                let avl = ir.new_temp();
                self.get_gpr(ir, avl, rs1);
                let vtype = ir.new_temp();
                self.get_gpr(ir, vtype, rs2);
                self.gen_vsetvl(ctx, ir, rd, rs1, avl, vtype, false);
                ir.temp_free(vtype);
                ir.temp_free(avl);
            }

            Op::VmvVV { vd, vs1 } => {
                ir.movi(self.pc, ctx.pc);
                let a = ir.movi_temp(vd as u64);
                let b = ir.movi_temp(vs1 as u64);
                ir.call(HelperId::VmvIvv, None, &[a, b]);
                ir.temp_free(b);
                ir.temp_free(a);
            }
            Op::VmvVX { vd, rs1 } => {
                ir.movi(self.pc, ctx.pc);
                let a = ir.movi_temp(vd as u64);
                let s = ir.new_temp();
                self.get_gpr(ir, s, rs1);
                ir.call(HelperId::VmvIvi, None, &[a, s]);
                ir.temp_free(s);
                ir.temp_free(a);
            }
            Op::VmvVI { vd, imm } => {
                ir.movi(self.pc, ctx.pc);
                let a = ir.movi_temp(vd as u64);
                let s = ir.movi_temp(imm as i64 as u64);
                ir.call(HelperId::VmvIvi, None, &[a, s]);
                ir.temp_free(s);
                ir.temp_free(a);
            }
            Op::VmergeVVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VmergeIvv, vd, vs2, vs1)
            }
            Op::VmergeVXM { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VmergeIvi, vd, vs2, rs1)
            }
            Op::VmergeVIM { vd, vs2, imm } => {
                self.gen_vec_vvi(ctx, ir, HelperId::VmergeIvi, vd, vs2, imm)
            }
            Op::VcompressVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VcompressMvv, vd, vs2, vs1)
            }
            Op::VadcVVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VadcVvm, vd, vs2, vs1)
            }
            Op::VadcVXM { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VadcVi, vd, vs2, rs1)
            }
            Op::VadcVIM { vd, vs2, imm } => {
                self.gen_vec_vvi(ctx, ir, HelperId::VadcVi, vd, vs2, imm)
            }
            Op::VmadcVV { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VmadcVv, vd, vs2, vs1)
            }
            Op::VmadcVVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VmadcVvm, vd, vs2, vs1)
            }
            Op::VmadcVX { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VmadcVi, vd, vs2, rs1)
            }
            Op::VmadcVXM { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VmadcVim, vd, vs2, rs1)
            }
            Op::VmadcVI { vd, vs2, imm } => {
                self.gen_vec_vvi(ctx, ir, HelperId::VmadcVi, vd, vs2, imm)
            }
            Op::VmadcVIM { vd, vs2, imm } => {
                self.gen_vec_vvi(ctx, ir, HelperId::VmadcVim, vd, vs2, imm)
            }
            Op::VsbcVVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VsbcVvm, vd, vs2, vs1)
            }
            Op::VsbcVXM { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VsbcVi, vd, vs2, rs1)
            }
            Op::VmsbcVV { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VmsbcVv, vd, vs2, vs1)
            }
            Op::VmsbcVVM { vd, vs2, vs1 } => {
                self.gen_vec_vvv(ctx, ir, HelperId::VmsbcVvm, vd, vs2, vs1)
            }
            Op::VmsbcVX { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VmsbcVi, vd, vs2, rs1)
            }
            Op::VmsbcVXM { vd, vs2, rs1 } => {
                self.gen_vec_vvx(ctx, ir, HelperId::VmsbcVim, vd, vs2, rs1)
            }
        }
    }

    /// Fetch-length discrimination plus decode and emission of a single
    /// instruction. Returns the guest bytes consumed.
    fn disas_insn<I: IrBuilder>(&self, ctx: &mut DisasContext, ir: &mut I, insn: u32) -> u64 {
        if insn & 0x3 != 0x3 {
            if !ctx.rvc {
                log::error!("compressed instruction at {:#x} but RVC is not enabled", ctx.pc);
                self.kill_unknown(ctx, ir, EXCP_ILLEGAL_INST);
                return 0;
            }
            ctx.opcode = insn & 0xffff;
            ctx.next_pc = ctx.pc + 2;
            let op = decode_compressed(insn as u16, self.xlen);
            trace!("{}", op.pretty_print(ctx.pc, ctx.opcode));
            self.translate_op(ctx, ir, &op);
            ctx.pc = ctx.next_pc;
            2
        } else {
            ctx.opcode = insn;
            ctx.next_pc = ctx.pc + 4;
            let op = decode(insn, self.xlen);
            trace!("{}", op.pretty_print(ctx.pc, insn));
            self.translate_op(ctx, ir, &op);
            ctx.pc = ctx.next_pc;
            4
        }
    }

    /// Emit one translation block: the fetch-decode-emit loop plus the
    /// termination policy.
    pub fn gen_block<I: IrBuilder, C: CodeMemory>(
        &self,
        env: &CpuState,
        tb: &mut TranslationBlock,
        code: &C,
        ir: &mut I,
        max_insns: u32,
    ) {
        let mut ctx = DisasContext {
            pc: tb.pc,
            next_pc: tb.pc,
            opcode: 0,
            mem_idx: env.priv_level as u32,
            singlestep: env.singlestep_enabled,
            bstate: BlockState::None,
            tb_pc: tb.pc,
            rvc: env.has_ext(MISA_C),
        };

        tb.size = 0;
        tb.icount = 0;
        ir.clear_temp_count();

        loop {
            if !env.breakpoints.is_empty() && env.breakpoints.contains(&ctx.pc) {
                self.generate_exception(&ctx, ir, EXCP_DEBUG);
                // Advance PC so that clearing the breakpoint invalidates
                // this block.
                ctx.pc += 4;
                break;
            }

            if tb.search_pc {
                ir.insn_start(ctx.pc);
            }

            let insn = code.fetch_u32(ctx.pc);
            tb.size += self.disas_insn(&mut ctx, ir, insn);
            tb.icount += 1;

            if !tb.search_pc {
                // original_size is only recorded during first emission so
                // the restore pass knows where to stop.
                tb.original_size = tb.size;
            }

            let leaked = ir.leaked_temps();
            if leaked != 0 {
                panic!("IR temp leak ({}) detected at PC {:08x}", leaked, ctx.pc);
            }

            if ctx.bstate != BlockState::None {
                break;
            }
            if ctx.singlestep {
                break;
            }
            if ctx.pc - (tb.pc & TARGET_PAGE_MASK) >= TARGET_PAGE_SIZE {
                break;
            }
            if tb.icount >= max_insns {
                ctx.bstate = BlockState::Stop;
                break;
            }
            if ir.near_full() {
                break;
            }
            if tb.search_pc && tb.size == tb.original_size {
                // The re-pass has re-covered the original block.
                ctx.bstate = BlockState::Stop;
                break;
            }
        }

        if ctx.singlestep && ctx.bstate != BlockState::Branch {
            if ctx.bstate == BlockState::None {
                ir.movi(self.pc, ctx.pc);
            }
            ir.call(HelperId::RaiseExceptionDebug, None, &[]);
        } else {
            match ctx.bstate {
                BlockState::Stop => self.gen_goto_tb(&ctx, ir, 0, ctx.pc),
                BlockState::None => {
                    // End of page: do not chain.
                    ir.movi(self.pc, ctx.pc);
                    ir.exit_tb(0);
                }
                BlockState::Branch => (), // exit sequence already emitted
            }
        }
    }
}

/// Write the PC recorded at IR position `pc_pos` back into the guest state.
/// Used after a fault inside an already-executed block, following a
/// search-pc re-emission.
pub fn restore_state_to_opc(
    env: &mut CpuState,
    _tb: &TranslationBlock,
    ir: &IrBuffer,
    pc_pos: usize,
) -> bool {
    match ir.insn_start_pc(pc_pos) {
        Some(pc) => {
            env.pc = pc;
            true
        }
        None => false,
    }
}
