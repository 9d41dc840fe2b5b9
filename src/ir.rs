//! The IR the emitter speaks to the code-generation back-end.
//!
//! The back-end is an external collaborator: the frontend only needs the
//! small capability surface captured by [`IrBuilder`] (temps, moves, ALU,
//! labels, branches, guest memory, block terminators, helper calls). The
//! in-crate [`IrBuffer`] records ops into a vector; it backs the tests and
//! the op-position table used for state restore, and documents the contract
//! a real back-end implements.

use fnv::FnvHashMap;

/// A value slot. Globals (guest register handles) are allocated first and
/// live forever; everything above the global watermark is a per-instruction
/// temporary that must be freed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Temp(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Label(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
    Gt,
    Gtu,
}

/// Binary ALU ops over XLEN-wide temps. `Mul` is the low half; the widening
/// multiplies have dedicated two-output ops.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Mul,
    Div,
    Divu,
    Rem,
    Remu,
}

/// Width and extension of a guest memory access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemOp {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
}

impl MemOp {
    pub fn size(self) -> u32 {
        match self {
            MemOp::I8 | MemOp::U8 => 1,
            MemOp::I16 | MemOp::U16 => 2,
            MemOp::I32 | MemOp::U32 => 4,
            MemOp::I64 => 8,
        }
    }

    pub fn signed(self) -> bool {
        matches!(self, MemOp::I8 | MemOp::I16 | MemOp::I32)
    }
}

/// Guest state slots a global temp can be bound to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GlobalField {
    Gpr(u8),
    Fpr(u8),
    Pc,
    LoadRes,
}

/// Guest state fields the emitter loads directly (guards, not data flow).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EnvField {
    Mstatus,
}

/// Helpers the emitted code calls into, named by link-time symbol.
///
/// ABI: the first (implicit) argument is the guest CPU state pointer, the
/// explicit arguments are XLEN-wide temps, and the return value, when there
/// is one, lands in a temp.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HelperId {
    RaiseException,
    RaiseExceptionMbadaddr,
    RaiseExceptionDebug,
    Csrrw,
    Csrrs,
    Csrrc,
    Sret,
    Mret,
    Wfi,
    TlbFlush,
    FenceI,
    /* FP, single */
    FaddS,
    FsubS,
    FmulS,
    FdivS,
    FsqrtS,
    FminS,
    FmaxS,
    FeqS,
    FltS,
    FleS,
    FclassS,
    FcvtWS,
    FcvtWuS,
    FcvtLS,
    FcvtLuS,
    FcvtSW,
    FcvtSWu,
    FcvtSL,
    FcvtSLu,
    FmaddS,
    FmsubS,
    FnmsubS,
    FnmaddS,
    /* FP, double */
    FaddD,
    FsubD,
    FmulD,
    FdivD,
    FsqrtD,
    FminD,
    FmaxD,
    FeqD,
    FltD,
    FleD,
    FclassD,
    FcvtWD,
    FcvtWuD,
    FcvtLD,
    FcvtLuD,
    FcvtDW,
    FcvtDWu,
    FcvtDL,
    FcvtDLu,
    FcvtSD,
    FcvtDS,
    FmaddD,
    FmsubD,
    FnmsubD,
    FnmaddD,
    /* vector, implemented in this crate */
    Vsetvl,
    VmvIvi,
    VmvIvv,
    VmergeIvv,
    VmergeIvi,
    VcompressMvv,
    VadcVvm,
    VadcVi,
    VsbcVvm,
    VsbcVi,
    VmadcVv,
    VmadcVvm,
    VmadcVi,
    VmadcVim,
    VmsbcVv,
    VmsbcVvm,
    VmsbcVi,
    VmsbcVim,
}

impl HelperId {
    /// The symbol the back-end resolves at link time.
    pub fn name(self) -> &'static str {
        match self {
            HelperId::RaiseException => "raise_exception",
            HelperId::RaiseExceptionMbadaddr => "raise_exception_mbadaddr",
            HelperId::RaiseExceptionDebug => "raise_exception_debug",
            HelperId::Csrrw => "csrrw",
            HelperId::Csrrs => "csrrs",
            HelperId::Csrrc => "csrrc",
            HelperId::Sret => "sret",
            HelperId::Mret => "mret",
            HelperId::Wfi => "wfi",
            HelperId::TlbFlush => "tlb_flush",
            HelperId::FenceI => "fence_i",
            HelperId::FaddS => "fadd_s",
            HelperId::FsubS => "fsub_s",
            HelperId::FmulS => "fmul_s",
            HelperId::FdivS => "fdiv_s",
            HelperId::FsqrtS => "fsqrt_s",
            HelperId::FminS => "fmin_s",
            HelperId::FmaxS => "fmax_s",
            HelperId::FeqS => "feq_s",
            HelperId::FltS => "flt_s",
            HelperId::FleS => "fle_s",
            HelperId::FclassS => "fclass_s",
            HelperId::FcvtWS => "fcvt_w_s",
            HelperId::FcvtWuS => "fcvt_wu_s",
            HelperId::FcvtLS => "fcvt_l_s",
            HelperId::FcvtLuS => "fcvt_lu_s",
            HelperId::FcvtSW => "fcvt_s_w",
            HelperId::FcvtSWu => "fcvt_s_wu",
            HelperId::FcvtSL => "fcvt_s_l",
            HelperId::FcvtSLu => "fcvt_s_lu",
            HelperId::FmaddS => "fmadd_s",
            HelperId::FmsubS => "fmsub_s",
            HelperId::FnmsubS => "fnmsub_s",
            HelperId::FnmaddS => "fnmadd_s",
            HelperId::FaddD => "fadd_d",
            HelperId::FsubD => "fsub_d",
            HelperId::FmulD => "fmul_d",
            HelperId::FdivD => "fdiv_d",
            HelperId::FsqrtD => "fsqrt_d",
            HelperId::FminD => "fmin_d",
            HelperId::FmaxD => "fmax_d",
            HelperId::FeqD => "feq_d",
            HelperId::FltD => "flt_d",
            HelperId::FleD => "fle_d",
            HelperId::FclassD => "fclass_d",
            HelperId::FcvtWD => "fcvt_w_d",
            HelperId::FcvtWuD => "fcvt_wu_d",
            HelperId::FcvtLD => "fcvt_l_d",
            HelperId::FcvtLuD => "fcvt_lu_d",
            HelperId::FcvtDW => "fcvt_d_w",
            HelperId::FcvtDWu => "fcvt_d_wu",
            HelperId::FcvtDL => "fcvt_d_l",
            HelperId::FcvtDLu => "fcvt_d_lu",
            HelperId::FcvtSD => "fcvt_s_d",
            HelperId::FcvtDS => "fcvt_d_s",
            HelperId::FmaddD => "fmadd_d",
            HelperId::FmsubD => "fmsub_d",
            HelperId::FnmsubD => "fnmsub_d",
            HelperId::FnmaddD => "fnmadd_d",
            HelperId::Vsetvl => "vsetvl",
            HelperId::VmvIvi => "vmv_ivi",
            HelperId::VmvIvv => "vmv_ivv",
            HelperId::VmergeIvv => "vmerge_ivv",
            HelperId::VmergeIvi => "vmerge_ivi",
            HelperId::VcompressMvv => "vcompress_mvv",
            HelperId::VadcVvm => "vadc_vvm",
            HelperId::VadcVi => "vadc_vi",
            HelperId::VsbcVvm => "vsbc_vvm",
            HelperId::VsbcVi => "vsbc_vi",
            HelperId::VmadcVv => "vmadc_vv",
            HelperId::VmadcVvm => "vmadc_vvm",
            HelperId::VmadcVi => "vmadc_vi",
            HelperId::VmadcVim => "vmadc_vim",
            HelperId::VmsbcVv => "vmsbc_vv",
            HelperId::VmsbcVvm => "vmsbc_vvm",
            HelperId::VmsbcVi => "vmsbc_vi",
            HelperId::VmsbcVim => "vmsbc_vim",
        }
    }
}

/// Every helper symbol the frontend can reference, in registration order.
/// The engine resolves these once at start-up.
pub fn gen_helpers() -> &'static [HelperId] {
    use HelperId::*;
    &[
        RaiseException,
        RaiseExceptionMbadaddr,
        RaiseExceptionDebug,
        Csrrw,
        Csrrs,
        Csrrc,
        Sret,
        Mret,
        Wfi,
        TlbFlush,
        FenceI,
        FaddS,
        FsubS,
        FmulS,
        FdivS,
        FsqrtS,
        FminS,
        FmaxS,
        FeqS,
        FltS,
        FleS,
        FclassS,
        FcvtWS,
        FcvtWuS,
        FcvtLS,
        FcvtLuS,
        FcvtSW,
        FcvtSWu,
        FcvtSL,
        FcvtSLu,
        FmaddS,
        FmsubS,
        FnmsubS,
        FnmaddS,
        FaddD,
        FsubD,
        FmulD,
        FdivD,
        FsqrtD,
        FminD,
        FmaxD,
        FeqD,
        FltD,
        FleD,
        FclassD,
        FcvtWD,
        FcvtWuD,
        FcvtLD,
        FcvtLuD,
        FcvtDW,
        FcvtDWu,
        FcvtDL,
        FcvtDLu,
        FcvtSD,
        FcvtDS,
        FmaddD,
        FmsubD,
        FnmsubD,
        FnmaddD,
        Vsetvl,
        VmvIvi,
        VmvIvv,
        VmergeIvv,
        VmergeIvi,
        VcompressMvv,
        VadcVvm,
        VadcVi,
        VsbcVvm,
        VsbcVi,
        VmadcVv,
        VmadcVvm,
        VmadcVi,
        VmadcVim,
        VmsbcVv,
        VmsbcVvm,
        VmsbcVi,
        VmsbcVim,
    ]
}

/// One recorded IR op. All temps are XLEN-wide values of the target.
#[derive(Clone, PartialEq, Debug)]
pub enum IrOp {
    /// Instruction-start marker for the op-position table.
    InsnStart { pc: u64 },
    Movi { dst: Temp, imm: u64 },
    Mov { dst: Temp, src: Temp },
    Alu { op: AluOp, dst: Temp, a: Temp, b: Temp },
    /// Unsigned widening multiply: (lo, hi) = a * b.
    Mulu2 { lo: Temp, hi: Temp, a: Temp, b: Temp },
    /// Signed widening multiply.
    Muls2 { lo: Temp, hi: Temp, a: Temp, b: Temp },
    Setcond { cond: Cond, dst: Temp, a: Temp, b: Temp },
    /// dst = cond(c1, c2) ? vtrue : vfalse.
    Movcond { cond: Cond, dst: Temp, c1: Temp, c2: Temp, vtrue: Temp, vfalse: Temp },
    Ext32s { dst: Temp, src: Temp },
    Ext32u { dst: Temp, src: Temp },
    /// Direct load of a guest state field, used for enable-bit guards.
    LoadEnv { dst: Temp, field: EnvField },
    GuestLd { dst: Temp, addr: Temp, memop: MemOp, memidx: u32 },
    GuestSt { src: Temp, addr: Temp, memop: MemOp, memidx: u32 },
    SetLabel(Label),
    Brcond { cond: Cond, a: Temp, b: Temp, target: Label },
    Br(Label),
    /// Direct-chain point for jump slot `slot`; always followed by the PC
    /// store and a chained ExitTb.
    GotoTb { slot: u32 },
    /// Return to the engine. `code` 0 is a plain exit; `slot + 1` marks an
    /// exit reached through the matching GotoTb so the engine can patch it.
    ExitTb { code: u64 },
    Call { helper: HelperId, ret: Option<Temp>, args: Vec<Temp> },
}

/// The capability surface the emitter needs from a back-end.
///
/// Methods with default bodies are conveniences composed from the primitive
/// ones; back-ends only override them for better codegen.
pub trait IrBuilder {
    /// Bind a global temp to a guest state slot. Called only during
    /// `translate_init`.
    fn new_global(&mut self, field: GlobalField, name: &'static str) -> Temp;
    fn new_temp(&mut self) -> Temp;
    fn temp_free(&mut self, t: Temp);
    /// Reset the temp-leak sentinel; done once per block.
    fn clear_temp_count(&mut self);
    /// Temps allocated since the last clear that were never freed.
    fn leaked_temps(&self) -> u32;

    fn new_label(&mut self) -> Label;
    fn set_label(&mut self, l: Label);

    fn movi(&mut self, dst: Temp, imm: u64);
    fn mov(&mut self, dst: Temp, src: Temp);
    fn alu(&mut self, op: AluOp, dst: Temp, a: Temp, b: Temp);
    fn mulu2(&mut self, lo: Temp, hi: Temp, a: Temp, b: Temp);
    fn muls2(&mut self, lo: Temp, hi: Temp, a: Temp, b: Temp);
    fn setcond(&mut self, cond: Cond, dst: Temp, a: Temp, b: Temp);
    fn movcond(&mut self, cond: Cond, dst: Temp, c1: Temp, c2: Temp, vtrue: Temp, vfalse: Temp);
    fn ext32s(&mut self, dst: Temp, src: Temp);
    fn ext32u(&mut self, dst: Temp, src: Temp);
    fn load_env(&mut self, dst: Temp, field: EnvField);

    fn guest_ld(&mut self, dst: Temp, addr: Temp, memop: MemOp, memidx: u32);
    fn guest_st(&mut self, src: Temp, addr: Temp, memop: MemOp, memidx: u32);

    fn brcond(&mut self, cond: Cond, a: Temp, b: Temp, target: Label);
    fn br(&mut self, target: Label);
    fn goto_tb(&mut self, slot: u32);
    fn exit_tb(&mut self, code: u64);
    fn call(&mut self, helper: HelperId, ret: Option<Temp>, args: &[Temp]);

    /// Record an instruction start at the current IR position.
    fn insn_start(&mut self, pc: u64);
    fn op_count(&self) -> usize;
    /// Whether the op buffer is close enough to capacity that the block
    /// builder should stop fetching.
    fn near_full(&self) -> bool;

    /* conveniences */

    fn movi_temp(&mut self, imm: u64) -> Temp {
        let t = self.new_temp();
        self.movi(t, imm);
        t
    }

    fn alui(&mut self, op: AluOp, dst: Temp, a: Temp, imm: u64) {
        let t = self.movi_temp(imm);
        self.alu(op, dst, a, t);
        self.temp_free(t);
    }

    fn setcondi(&mut self, cond: Cond, dst: Temp, a: Temp, imm: u64) {
        let t = self.movi_temp(imm);
        self.setcond(cond, dst, a, t);
        self.temp_free(t);
    }

    fn brcondi(&mut self, cond: Cond, a: Temp, imm: u64, target: Label) {
        let t = self.movi_temp(imm);
        self.brcond(cond, a, t, target);
        self.temp_free(t);
    }
}

/// Recording back-end: keeps the op list, the op-position table and the
/// temp accounting the block builder's leak sentinel relies on.
pub struct IrBuffer {
    pub ops: Vec<IrOp>,
    globals: Vec<(GlobalField, &'static str)>,
    next_temp: u32,
    live_temps: u32,
    next_label: u32,
    insn_pcs: FnvHashMap<usize, u64>,
    capacity: usize,
}

/// Default op capacity, mirroring a back-end's finite op buffer.
const DEFAULT_CAPACITY: usize = 16 * 1024;
/// Stop translating when fewer than this many ops fit; a single guest
/// instruction never expands to more.
const CAPACITY_SLACK: usize = 64;

impl IrBuffer {
    pub fn new() -> IrBuffer {
        IrBuffer::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> IrBuffer {
        IrBuffer {
            ops: Vec::new(),
            globals: Vec::new(),
            next_temp: 0,
            live_temps: 0,
            next_label: 0,
            insn_pcs: FnvHashMap::default(),
            capacity,
        }
    }

    /// Begin a fresh block, keeping the registered globals.
    pub fn restart(&mut self) {
        self.ops.clear();
        self.insn_pcs.clear();
        self.next_temp = self.globals.len() as u32;
        self.live_temps = 0;
        self.next_label = 0;
    }

    pub fn globals(&self) -> &[(GlobalField, &'static str)] {
        &self.globals
    }

    /// Guest PC recorded at IR position `pos`, if that position is an
    /// instruction start.
    pub fn insn_start_pc(&self, pos: usize) -> Option<u64> {
        self.insn_pcs.get(&pos).copied()
    }
}

impl Default for IrBuffer {
    fn default() -> Self {
        IrBuffer::new()
    }
}

impl IrBuilder for IrBuffer {
    fn new_global(&mut self, field: GlobalField, name: &'static str) -> Temp {
        assert_eq!(
            self.next_temp as usize,
            self.globals.len(),
            "globals must be registered before any temp is allocated"
        );
        self.globals.push((field, name));
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    fn new_temp(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        self.live_temps += 1;
        t
    }

    fn temp_free(&mut self, t: Temp) {
        debug_assert!((t.0 as usize) >= self.globals.len(), "cannot free a global");
        self.live_temps -= 1;
    }

    fn clear_temp_count(&mut self) {
        self.live_temps = 0;
    }

    fn leaked_temps(&self) -> u32 {
        self.live_temps
    }

    fn new_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    fn set_label(&mut self, l: Label) {
        self.ops.push(IrOp::SetLabel(l));
    }

    fn movi(&mut self, dst: Temp, imm: u64) {
        self.ops.push(IrOp::Movi { dst, imm });
    }

    fn mov(&mut self, dst: Temp, src: Temp) {
        self.ops.push(IrOp::Mov { dst, src });
    }

    fn alu(&mut self, op: AluOp, dst: Temp, a: Temp, b: Temp) {
        self.ops.push(IrOp::Alu { op, dst, a, b });
    }

    fn mulu2(&mut self, lo: Temp, hi: Temp, a: Temp, b: Temp) {
        self.ops.push(IrOp::Mulu2 { lo, hi, a, b });
    }

    fn muls2(&mut self, lo: Temp, hi: Temp, a: Temp, b: Temp) {
        self.ops.push(IrOp::Muls2 { lo, hi, a, b });
    }

    fn setcond(&mut self, cond: Cond, dst: Temp, a: Temp, b: Temp) {
        self.ops.push(IrOp::Setcond { cond, dst, a, b });
    }

    fn movcond(&mut self, cond: Cond, dst: Temp, c1: Temp, c2: Temp, vtrue: Temp, vfalse: Temp) {
        self.ops.push(IrOp::Movcond { cond, dst, c1, c2, vtrue, vfalse });
    }

    fn ext32s(&mut self, dst: Temp, src: Temp) {
        self.ops.push(IrOp::Ext32s { dst, src });
    }

    fn ext32u(&mut self, dst: Temp, src: Temp) {
        self.ops.push(IrOp::Ext32u { dst, src });
    }

    fn load_env(&mut self, dst: Temp, field: EnvField) {
        self.ops.push(IrOp::LoadEnv { dst, field });
    }

    fn guest_ld(&mut self, dst: Temp, addr: Temp, memop: MemOp, memidx: u32) {
        self.ops.push(IrOp::GuestLd { dst, addr, memop, memidx });
    }

    fn guest_st(&mut self, src: Temp, addr: Temp, memop: MemOp, memidx: u32) {
        self.ops.push(IrOp::GuestSt { src, addr, memop, memidx });
    }

    fn brcond(&mut self, cond: Cond, a: Temp, b: Temp, target: Label) {
        self.ops.push(IrOp::Brcond { cond, a, b, target });
    }

    fn br(&mut self, target: Label) {
        self.ops.push(IrOp::Br(target));
    }

    fn goto_tb(&mut self, slot: u32) {
        self.ops.push(IrOp::GotoTb { slot });
    }

    fn exit_tb(&mut self, code: u64) {
        self.ops.push(IrOp::ExitTb { code });
    }

    fn call(&mut self, helper: HelperId, ret: Option<Temp>, args: &[Temp]) {
        self.ops.push(IrOp::Call { helper, ret, args: args.to_vec() });
    }

    fn insn_start(&mut self, pc: u64) {
        self.insn_pcs.insert(self.ops.len(), pc);
        self.ops.push(IrOp::InsnStart { pc });
    }

    fn op_count(&self) -> usize {
        self.ops.len()
    }

    fn near_full(&self) -> bool {
        self.ops.len() + CAPACITY_SLACK >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_accounting() {
        let mut ir = IrBuffer::new();
        let g = ir.new_global(GlobalField::Pc, "pc");
        ir.clear_temp_count();
        let a = ir.new_temp();
        let b = ir.new_temp();
        assert_eq!(ir.leaked_temps(), 2);
        ir.temp_free(a);
        ir.temp_free(b);
        assert_eq!(ir.leaked_temps(), 0);
        assert_eq!(g, Temp(0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_insn_start_table() {
        let mut ir = IrBuffer::new();
        ir.insn_start(0x100);
        let t = ir.movi_temp(1);
        ir.temp_free(t);
        ir.insn_start(0x104);
        assert_eq!(ir.insn_start_pc(0), Some(0x100));
        assert_eq!(ir.insn_start_pc(1), None);
        assert_eq!(ir.insn_start_pc(2), Some(0x104));
    }

    #[test]
    fn test_near_full() {
        let mut ir = IrBuffer::with_capacity(70);
        assert!(!ir.near_full());
        for _ in 0..10 {
            ir.exit_tb(0);
        }
        assert!(ir.near_full());
    }

    #[test]
    fn test_helper_names_are_unique() {
        let helpers = gen_helpers();
        for (i, a) in helpers.iter().enumerate() {
            for b in &helpers[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }
}
