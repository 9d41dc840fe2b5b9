use core::convert::TryFrom;
use core::fmt;

use super::op::{Op, Ordering};
use super::Csr;

#[rustfmt::skip]
const REG_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
    "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6"
];

pub const fn register_name(reg: u8) -> &'static str {
    REG_NAMES[reg as usize]
}

/// CSR operand: the name when the number is known, the raw number otherwise.
struct CsrName(u16);

impl fmt::Display for CsrName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match Csr::try_from(self.0) {
            Ok(csr) => write!(f, "{}", csr),
            Err(()) => write!(f, "{:#x}", self.0),
        }
    }
}

/// `vtype` immediate of the vset* configuration instructions, printed in its
/// canonical `e<sew>,m<lmul>,t?,m?` spelling.
struct VtypeImm(u32);

impl fmt::Display for VtypeImm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sew = 8u32 << (self.0 >> 3 & 0b111);
        let lmul = match self.0 & 0b111 {
            0b101 => "f8",
            0b110 => "f4",
            0b111 => "f2",
            0b000 => "1",
            0b001 => "2",
            0b010 => "4",
            0b011 => "8",
            _ => "?",
        };
        let ta = if self.0 & 0x40 != 0 { "ta" } else { "tu" };
        let ma = if self.0 & 0x80 != 0 { "ma" } else { "mu" };
        write!(f, "e{},m{},{},{}", sew, lmul, ta, ma)
    }
}

impl Op {
    /// The mnemonic without annotations: `amoswap.w.aqrl` yields
    /// "amoswap.w".
    pub fn mnemonic(&self) -> &'static str {
        match *self {
            Op::Illegal => "illegal",
            Op::Lb { .. } => "lb",
            Op::Lh { .. } => "lh",
            Op::Lw { .. } => "lw",
            Op::Ld { .. } => "ld",
            Op::Lbu { .. } => "lbu",
            Op::Lhu { .. } => "lhu",
            Op::Lwu { .. } => "lwu",
            Op::Fence => "fence",
            Op::FenceI => "fence.i",
            Op::Addi { .. } => "addi",
            Op::Slli { .. } => "slli",
            Op::Slti { .. } => "slti",
            Op::Sltiu { .. } => "sltiu",
            Op::Xori { .. } => "xori",
            Op::Srli { .. } => "srli",
            Op::Srai { .. } => "srai",
            Op::Ori { .. } => "ori",
            Op::Andi { .. } => "andi",
            Op::Auipc { .. } => "auipc",
            Op::Addiw { .. } => "addiw",
            Op::Slliw { .. } => "slliw",
            Op::Srliw { .. } => "srliw",
            Op::Sraiw { .. } => "sraiw",
            Op::Sb { .. } => "sb",
            Op::Sh { .. } => "sh",
            Op::Sw { .. } => "sw",
            Op::Sd { .. } => "sd",
            Op::Add { .. } => "add",
            Op::Sub { .. } => "sub",
            Op::Sll { .. } => "sll",
            Op::Slt { .. } => "slt",
            Op::Sltu { .. } => "sltu",
            Op::Xor { .. } => "xor",
            Op::Srl { .. } => "srl",
            Op::Sra { .. } => "sra",
            Op::Or { .. } => "or",
            Op::And { .. } => "and",
            Op::Lui { .. } => "lui",
            Op::Addw { .. } => "addw",
            Op::Subw { .. } => "subw",
            Op::Sllw { .. } => "sllw",
            Op::Srlw { .. } => "srlw",
            Op::Sraw { .. } => "sraw",
            Op::Beq { .. } => "beq",
            Op::Bne { .. } => "bne",
            Op::Blt { .. } => "blt",
            Op::Bge { .. } => "bge",
            Op::Bltu { .. } => "bltu",
            Op::Bgeu { .. } => "bgeu",
            Op::Jalr { .. } => "jalr",
            Op::Jal { .. } => "jal",
            Op::Ecall => "ecall",
            Op::Ebreak => "ebreak",
            Op::Csrrw { .. } => "csrrw",
            Op::Csrrs { .. } => "csrrs",
            Op::Csrrc { .. } => "csrrc",
            Op::Csrrwi { .. } => "csrrwi",
            Op::Csrrsi { .. } => "csrrsi",
            Op::Csrrci { .. } => "csrrci",
            Op::Mul { .. } => "mul",
            Op::Mulh { .. } => "mulh",
            Op::Mulhsu { .. } => "mulhsu",
            Op::Mulhu { .. } => "mulhu",
            Op::Div { .. } => "div",
            Op::Divu { .. } => "divu",
            Op::Rem { .. } => "rem",
            Op::Remu { .. } => "remu",
            Op::Mulw { .. } => "mulw",
            Op::Divw { .. } => "divw",
            Op::Divuw { .. } => "divuw",
            Op::Remw { .. } => "remw",
            Op::Remuw { .. } => "remuw",
            Op::LrW { .. } => "lr.w",
            Op::LrD { .. } => "lr.d",
            Op::ScW { .. } => "sc.w",
            Op::ScD { .. } => "sc.d",
            Op::AmoswapW { .. } => "amoswap.w",
            Op::AmoswapD { .. } => "amoswap.d",
            Op::AmoaddW { .. } => "amoadd.w",
            Op::AmoaddD { .. } => "amoadd.d",
            Op::AmoxorW { .. } => "amoxor.w",
            Op::AmoxorD { .. } => "amoxor.d",
            Op::AmoandW { .. } => "amoand.w",
            Op::AmoandD { .. } => "amoand.d",
            Op::AmoorW { .. } => "amoor.w",
            Op::AmoorD { .. } => "amoor.d",
            Op::AmominW { .. } => "amomin.w",
            Op::AmominD { .. } => "amomin.d",
            Op::AmomaxW { .. } => "amomax.w",
            Op::AmomaxD { .. } => "amomax.d",
            Op::AmominuW { .. } => "amominu.w",
            Op::AmominuD { .. } => "amominu.d",
            Op::AmomaxuW { .. } => "amomaxu.w",
            Op::AmomaxuD { .. } => "amomaxu.d",
            Op::Flw { .. } => "flw",
            Op::Fsw { .. } => "fsw",
            Op::FaddS { .. } => "fadd.s",
            Op::FsubS { .. } => "fsub.s",
            Op::FmulS { .. } => "fmul.s",
            Op::FdivS { .. } => "fdiv.s",
            Op::FsqrtS { .. } => "fsqrt.s",
            Op::FsgnjS { .. } => "fsgnj.s",
            Op::FsgnjnS { .. } => "fsgnjn.s",
            Op::FsgnjxS { .. } => "fsgnjx.s",
            Op::FminS { .. } => "fmin.s",
            Op::FmaxS { .. } => "fmax.s",
            Op::FcvtWS { .. } => "fcvt.w.s",
            Op::FcvtWuS { .. } => "fcvt.wu.s",
            Op::FcvtLS { .. } => "fcvt.l.s",
            Op::FcvtLuS { .. } => "fcvt.lu.s",
            Op::FmvXW { .. } => "fmv.x.w",
            Op::FclassS { .. } => "fclass.s",
            Op::FeqS { .. } => "feq.s",
            Op::FltS { .. } => "flt.s",
            Op::FleS { .. } => "fle.s",
            Op::FcvtSW { .. } => "fcvt.s.w",
            Op::FcvtSWu { .. } => "fcvt.s.wu",
            Op::FcvtSL { .. } => "fcvt.s.l",
            Op::FcvtSLu { .. } => "fcvt.s.lu",
            Op::FmvWX { .. } => "fmv.w.x",
            Op::FmaddS { .. } => "fmadd.s",
            Op::FmsubS { .. } => "fmsub.s",
            Op::FnmsubS { .. } => "fnmsub.s",
            Op::FnmaddS { .. } => "fnmadd.s",
            Op::Fld { .. } => "fld",
            Op::Fsd { .. } => "fsd",
            Op::FaddD { .. } => "fadd.d",
            Op::FsubD { .. } => "fsub.d",
            Op::FmulD { .. } => "fmul.d",
            Op::FdivD { .. } => "fdiv.d",
            Op::FsqrtD { .. } => "fsqrt.d",
            Op::FsgnjD { .. } => "fsgnj.d",
            Op::FsgnjnD { .. } => "fsgnjn.d",
            Op::FsgnjxD { .. } => "fsgnjx.d",
            Op::FminD { .. } => "fmin.d",
            Op::FmaxD { .. } => "fmax.d",
            Op::FcvtSD { .. } => "fcvt.s.d",
            Op::FcvtDS { .. } => "fcvt.d.s",
            Op::FcvtWD { .. } => "fcvt.w.d",
            Op::FcvtWuD { .. } => "fcvt.wu.d",
            Op::FcvtLD { .. } => "fcvt.l.d",
            Op::FcvtLuD { .. } => "fcvt.lu.d",
            Op::FmvXD { .. } => "fmv.x.d",
            Op::FclassD { .. } => "fclass.d",
            Op::FeqD { .. } => "feq.d",
            Op::FltD { .. } => "flt.d",
            Op::FleD { .. } => "fle.d",
            Op::FcvtDW { .. } => "fcvt.d.w",
            Op::FcvtDWu { .. } => "fcvt.d.wu",
            Op::FcvtDL { .. } => "fcvt.d.l",
            Op::FcvtDLu { .. } => "fcvt.d.lu",
            Op::FmvDX { .. } => "fmv.d.x",
            Op::FmaddD { .. } => "fmadd.d",
            Op::FmsubD { .. } => "fmsub.d",
            Op::FnmsubD { .. } => "fnmsub.d",
            Op::FnmaddD { .. } => "fnmadd.d",
            Op::Vsetvli { .. } => "vsetvli",
            Op::Vsetivli { .. } => "vsetivli",
            Op::Vsetvl { .. } => "vsetvl",
            Op::VmvVV { .. } => "vmv.v.v",
            Op::VmvVX { .. } => "vmv.v.x",
            Op::VmvVI { .. } => "vmv.v.i",
            Op::VmergeVVM { .. } => "vmerge.vvm",
            Op::VmergeVXM { .. } => "vmerge.vxm",
            Op::VmergeVIM { .. } => "vmerge.vim",
            Op::VcompressVM { .. } => "vcompress.vm",
            Op::VadcVVM { .. } => "vadc.vvm",
            Op::VadcVXM { .. } => "vadc.vxm",
            Op::VadcVIM { .. } => "vadc.vim",
            Op::VmadcVV { .. } => "vmadc.vv",
            Op::VmadcVVM { .. } => "vmadc.vvm",
            Op::VmadcVX { .. } => "vmadc.vx",
            Op::VmadcVXM { .. } => "vmadc.vxm",
            Op::VmadcVI { .. } => "vmadc.vi",
            Op::VmadcVIM { .. } => "vmadc.vim",
            Op::VsbcVVM { .. } => "vsbc.vvm",
            Op::VsbcVXM { .. } => "vsbc.vxm",
            Op::VmsbcVV { .. } => "vmsbc.vv",
            Op::VmsbcVVM { .. } => "vmsbc.vvm",
            Op::VmsbcVX { .. } => "vmsbc.vx",
            Op::VmsbcVXM { .. } => "vmsbc.vxm",
            Op::Mret => "mret",
            Op::Sret => "sret",
            Op::Wfi => "wfi",
            Op::SfenceVma { .. } => "sfence.vma",
        }
    }

    /// The annotation suffix: ".aqrl" of "amoswap.w.aqrl".
    pub fn suffix(&self) -> &'static str {
        match *self {
            Op::LrW { aqrl, .. }
            | Op::LrD { aqrl, .. }
            | Op::ScW { aqrl, .. }
            | Op::ScD { aqrl, .. }
            | Op::AmoswapW { aqrl, .. }
            | Op::AmoswapD { aqrl, .. }
            | Op::AmoaddW { aqrl, .. }
            | Op::AmoaddD { aqrl, .. }
            | Op::AmoxorW { aqrl, .. }
            | Op::AmoxorD { aqrl, .. }
            | Op::AmoandW { aqrl, .. }
            | Op::AmoandD { aqrl, .. }
            | Op::AmoorW { aqrl, .. }
            | Op::AmoorD { aqrl, .. }
            | Op::AmominW { aqrl, .. }
            | Op::AmominD { aqrl, .. }
            | Op::AmomaxW { aqrl, .. }
            | Op::AmomaxD { aqrl, .. }
            | Op::AmominuW { aqrl, .. }
            | Op::AmominuD { aqrl, .. }
            | Op::AmomaxuW { aqrl, .. }
            | Op::AmomaxuD { aqrl, .. } => match aqrl {
                Ordering::Relaxed => "",
                Ordering::Acquire => ".aq",
                Ordering::Release => ".rl",
                Ordering::SeqCst => ".aqrl",
            },
            _ => "",
        }
    }

    /// Print the operands, with target annotations when `pc` is known.
    fn print(&self, fmt: &mut fmt::Formatter, pc: Option<u64>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        let suffix = self.suffix();
        write!(fmt, "{}{}", mnemonic, suffix)?;

        // Pad to an 8-column operand field, at least one space.
        let len = mnemonic.len() + suffix.len();
        write!(fmt, "{:1$}", "", 8 - len % 8)?;

        match *self {
            Op::Illegal => (),
            Op::Lui { rd, imm } | Op::Auipc { rd, imm } => {
                write!(fmt, "{}, {:#x}", register_name(rd), (imm as u32) >> 12)?
            }
            Op::Jal { rd, imm } => {
                let (sign, uimm) = if imm < 0 { ('-', -imm) } else { ('+', imm) };
                write!(fmt, "{}, pc {} {}", register_name(rd), sign, uimm)?;
                if let Some(pc) = pc {
                    write!(fmt, " <{:x}>", pc.wrapping_add(imm as u64))?;
                }
            }
            Op::Beq { rs1, rs2, imm }
            | Op::Bne { rs1, rs2, imm }
            | Op::Blt { rs1, rs2, imm }
            | Op::Bge { rs1, rs2, imm }
            | Op::Bltu { rs1, rs2, imm }
            | Op::Bgeu { rs1, rs2, imm } => {
                let (sign, uimm) = if imm < 0 { ('-', -imm) } else { ('+', imm) };
                write!(
                    fmt,
                    "{}, {}, pc {} {}",
                    register_name(rs1),
                    register_name(rs2),
                    sign,
                    uimm
                )?;
                if let Some(pc) = pc {
                    write!(fmt, " <{:x}>", pc.wrapping_add(imm as u64))?;
                }
            }
            Op::Lb { rd, rs1, imm }
            | Op::Lh { rd, rs1, imm }
            | Op::Lw { rd, rs1, imm }
            | Op::Ld { rd, rs1, imm }
            | Op::Lbu { rd, rs1, imm }
            | Op::Lhu { rd, rs1, imm }
            | Op::Lwu { rd, rs1, imm }
            // jalr shares the load operand format.
            | Op::Jalr { rd, rs1, imm } => {
                write!(fmt, "{}, {}({})", register_name(rd), imm, register_name(rs1))?
            }
            Op::Fence | Op::FenceI | Op::Ecall | Op::Ebreak | Op::Mret | Op::Sret | Op::Wfi => (),
            Op::SfenceVma { rs1, rs2 } => {
                write!(fmt, "{}, {}", register_name(rs1), register_name(rs2))?
            }
            Op::Sb { rs1, rs2, imm }
            | Op::Sh { rs1, rs2, imm }
            | Op::Sw { rs1, rs2, imm }
            | Op::Sd { rs1, rs2, imm } => {
                write!(fmt, "{}, {}({})", register_name(rs2), imm, register_name(rs1))?
            }
            Op::Addi { rd, rs1, imm }
            | Op::Slti { rd, rs1, imm }
            | Op::Sltiu { rd, rs1, imm }
            | Op::Xori { rd, rs1, imm }
            | Op::Ori { rd, rs1, imm }
            | Op::Andi { rd, rs1, imm }
            | Op::Addiw { rd, rs1, imm }
            | Op::Slli { rd, rs1, imm }
            | Op::Srli { rd, rs1, imm }
            | Op::Srai { rd, rs1, imm }
            | Op::Slliw { rd, rs1, imm }
            | Op::Srliw { rd, rs1, imm }
            | Op::Sraiw { rd, rs1, imm } => {
                write!(fmt, "{}, {}, {}", register_name(rd), register_name(rs1), imm)?
            }
            Op::Add { rd, rs1, rs2 }
            | Op::Sub { rd, rs1, rs2 }
            | Op::Sll { rd, rs1, rs2 }
            | Op::Slt { rd, rs1, rs2 }
            | Op::Sltu { rd, rs1, rs2 }
            | Op::Xor { rd, rs1, rs2 }
            | Op::Srl { rd, rs1, rs2 }
            | Op::Sra { rd, rs1, rs2 }
            | Op::Or { rd, rs1, rs2 }
            | Op::And { rd, rs1, rs2 }
            | Op::Addw { rd, rs1, rs2 }
            | Op::Subw { rd, rs1, rs2 }
            | Op::Sllw { rd, rs1, rs2 }
            | Op::Srlw { rd, rs1, rs2 }
            | Op::Sraw { rd, rs1, rs2 }
            | Op::Mul { rd, rs1, rs2 }
            | Op::Mulh { rd, rs1, rs2 }
            | Op::Mulhsu { rd, rs1, rs2 }
            | Op::Mulhu { rd, rs1, rs2 }
            | Op::Div { rd, rs1, rs2 }
            | Op::Divu { rd, rs1, rs2 }
            | Op::Rem { rd, rs1, rs2 }
            | Op::Remu { rd, rs1, rs2 }
            | Op::Mulw { rd, rs1, rs2 }
            | Op::Divw { rd, rs1, rs2 }
            | Op::Divuw { rd, rs1, rs2 }
            | Op::Remw { rd, rs1, rs2 }
            | Op::Remuw { rd, rs1, rs2 } => write!(
                fmt,
                "{}, {}, {}",
                register_name(rd),
                register_name(rs1),
                register_name(rs2)
            )?,
            Op::Csrrw { rd, rs1, csr } | Op::Csrrs { rd, rs1, csr } | Op::Csrrc { rd, rs1, csr } => {
                write!(fmt, "{}, #{}, {}", register_name(rd), CsrName(csr), register_name(rs1))?
            }
            Op::Csrrwi { rd, imm, csr }
            | Op::Csrrsi { rd, imm, csr }
            | Op::Csrrci { rd, imm, csr } => {
                write!(fmt, "{}, #{}, {}", register_name(rd), CsrName(csr), imm)?
            }
            Op::LrW { rd, rs1, .. } | Op::LrD { rd, rs1, .. } => {
                write!(fmt, "{}, ({})", register_name(rd), register_name(rs1))?
            }
            Op::ScW { rd, rs1, rs2, .. }
            | Op::ScD { rd, rs1, rs2, .. }
            | Op::AmoswapW { rd, rs1, rs2, .. }
            | Op::AmoswapD { rd, rs1, rs2, .. }
            | Op::AmoaddW { rd, rs1, rs2, .. }
            | Op::AmoaddD { rd, rs1, rs2, .. }
            | Op::AmoxorW { rd, rs1, rs2, .. }
            | Op::AmoxorD { rd, rs1, rs2, .. }
            | Op::AmoandW { rd, rs1, rs2, .. }
            | Op::AmoandD { rd, rs1, rs2, .. }
            | Op::AmoorW { rd, rs1, rs2, .. }
            | Op::AmoorD { rd, rs1, rs2, .. }
            | Op::AmominW { rd, rs1, rs2, .. }
            | Op::AmominD { rd, rs1, rs2, .. }
            | Op::AmomaxW { rd, rs1, rs2, .. }
            | Op::AmomaxD { rd, rs1, rs2, .. }
            | Op::AmominuW { rd, rs1, rs2, .. }
            | Op::AmominuD { rd, rs1, rs2, .. }
            | Op::AmomaxuW { rd, rs1, rs2, .. }
            | Op::AmomaxuD { rd, rs1, rs2, .. } => write!(
                fmt,
                "{}, {}, ({})",
                register_name(rd),
                register_name(rs2),
                register_name(rs1)
            )?,
            Op::Flw { frd, rs1, imm } | Op::Fld { frd, rs1, imm } => {
                write!(fmt, "f{}, {}({})", frd, imm, register_name(rs1))?
            }
            Op::Fsw { rs1, frs2, imm } | Op::Fsd { rs1, frs2, imm } => {
                write!(fmt, "f{}, {}({})", frs2, imm, register_name(rs1))?
            }
            Op::FaddS { frd, frs1, frs2, .. }
            | Op::FsubS { frd, frs1, frs2, .. }
            | Op::FmulS { frd, frs1, frs2, .. }
            | Op::FdivS { frd, frs1, frs2, .. }
            | Op::FsgnjS { frd, frs1, frs2 }
            | Op::FsgnjnS { frd, frs1, frs2 }
            | Op::FsgnjxS { frd, frs1, frs2 }
            | Op::FminS { frd, frs1, frs2 }
            | Op::FmaxS { frd, frs1, frs2 }
            | Op::FaddD { frd, frs1, frs2, .. }
            | Op::FsubD { frd, frs1, frs2, .. }
            | Op::FmulD { frd, frs1, frs2, .. }
            | Op::FdivD { frd, frs1, frs2, .. }
            | Op::FsgnjD { frd, frs1, frs2 }
            | Op::FsgnjnD { frd, frs1, frs2 }
            | Op::FsgnjxD { frd, frs1, frs2 }
            | Op::FminD { frd, frs1, frs2 }
            | Op::FmaxD { frd, frs1, frs2 } => write!(fmt, "f{}, f{}, f{}", frd, frs1, frs2)?,
            Op::FsqrtS { frd, frs1, .. }
            | Op::FsqrtD { frd, frs1, .. }
            | Op::FcvtSD { frd, frs1, .. }
            | Op::FcvtDS { frd, frs1, .. } => write!(fmt, "f{}, f{}", frd, frs1)?,
            Op::FcvtWS { rd, frs1, .. }
            | Op::FcvtWuS { rd, frs1, .. }
            | Op::FcvtLS { rd, frs1, .. }
            | Op::FcvtLuS { rd, frs1, .. }
            | Op::FmvXW { rd, frs1 }
            | Op::FclassS { rd, frs1 }
            | Op::FcvtWD { rd, frs1, .. }
            | Op::FcvtWuD { rd, frs1, .. }
            | Op::FcvtLD { rd, frs1, .. }
            | Op::FcvtLuD { rd, frs1, .. }
            | Op::FmvXD { rd, frs1 }
            | Op::FclassD { rd, frs1 } => write!(fmt, "{}, f{}", register_name(rd), frs1)?,
            Op::FcvtSW { frd, rs1, .. }
            | Op::FcvtSWu { frd, rs1, .. }
            | Op::FcvtSL { frd, rs1, .. }
            | Op::FcvtSLu { frd, rs1, .. }
            | Op::FmvWX { frd, rs1 }
            | Op::FcvtDW { frd, rs1, .. }
            | Op::FcvtDWu { frd, rs1, .. }
            | Op::FcvtDL { frd, rs1, .. }
            | Op::FcvtDLu { frd, rs1, .. }
            | Op::FmvDX { frd, rs1 } => write!(fmt, "f{}, {}", frd, register_name(rs1))?,
            Op::FeqS { rd, frs1, frs2 }
            | Op::FltS { rd, frs1, frs2 }
            | Op::FleS { rd, frs1, frs2 }
            | Op::FeqD { rd, frs1, frs2 }
            | Op::FltD { rd, frs1, frs2 }
            | Op::FleD { rd, frs1, frs2 } => {
                write!(fmt, "{}, f{}, f{}", register_name(rd), frs1, frs2)?
            }
            Op::FmaddS { frd, frs1, frs2, frs3, .. }
            | Op::FmsubS { frd, frs1, frs2, frs3, .. }
            | Op::FnmsubS { frd, frs1, frs2, frs3, .. }
            | Op::FnmaddS { frd, frs1, frs2, frs3, .. }
            | Op::FmaddD { frd, frs1, frs2, frs3, .. }
            | Op::FmsubD { frd, frs1, frs2, frs3, .. }
            | Op::FnmsubD { frd, frs1, frs2, frs3, .. }
            | Op::FnmaddD { frd, frs1, frs2, frs3, .. } => {
                write!(fmt, "f{}, f{}, f{}, f{}", frd, frs1, frs2, frs3)?
            }
            Op::Vsetvli { rd, rs1, vtypei } => write!(
                fmt,
                "{}, {}, {}",
                register_name(rd),
                register_name(rs1),
                VtypeImm(vtypei)
            )?,
            Op::Vsetivli { rd, uimm, vtypei } => {
                write!(fmt, "{}, {}, {}", register_name(rd), uimm, VtypeImm(vtypei))?
            }
            Op::Vsetvl { rd, rs1, rs2 } => write!(
                fmt,
                "{}, {}, {}",
                register_name(rd),
                register_name(rs1),
                register_name(rs2)
            )?,
            Op::VmvVV { vd, vs1 } => write!(fmt, "v{}, v{}", vd, vs1)?,
            Op::VmvVX { vd, rs1 } => write!(fmt, "v{}, {}", vd, register_name(rs1))?,
            Op::VmvVI { vd, imm } => write!(fmt, "v{}, {}", vd, imm)?,
            Op::VmergeVVM { vd, vs2, vs1 }
            | Op::VadcVVM { vd, vs2, vs1 }
            | Op::VmadcVVM { vd, vs2, vs1 }
            | Op::VsbcVVM { vd, vs2, vs1 }
            | Op::VmsbcVVM { vd, vs2, vs1 } => {
                write!(fmt, "v{}, v{}, v{}, v0", vd, vs2, vs1)?
            }
            Op::VmergeVXM { vd, vs2, rs1 }
            | Op::VadcVXM { vd, vs2, rs1 }
            | Op::VmadcVXM { vd, vs2, rs1 }
            | Op::VsbcVXM { vd, vs2, rs1 }
            | Op::VmsbcVXM { vd, vs2, rs1 } => {
                write!(fmt, "v{}, v{}, {}, v0", vd, vs2, register_name(rs1))?
            }
            Op::VmergeVIM { vd, vs2, imm }
            | Op::VadcVIM { vd, vs2, imm }
            | Op::VmadcVIM { vd, vs2, imm } => write!(fmt, "v{}, v{}, {}, v0", vd, vs2, imm)?,
            Op::VmadcVV { vd, vs2, vs1 }
            | Op::VmsbcVV { vd, vs2, vs1 }
            | Op::VcompressVM { vd, vs2, vs1 } => write!(fmt, "v{}, v{}, v{}", vd, vs2, vs1)?,
            Op::VmadcVX { vd, vs2, rs1 } | Op::VmsbcVX { vd, vs2, rs1 } => {
                write!(fmt, "v{}, v{}, {}", vd, vs2, register_name(rs1))?
            }
            Op::VmadcVI { vd, vs2, imm } => write!(fmt, "v{}, v{}, {}", vd, vs2, imm)?,
        }

        Ok(())
    }

    /// Pretty-print the instruction with program counter and raw encoding.
    pub fn pretty_print<'a>(&'a self, pc: u64, bits: u32) -> impl fmt::Display + 'a {
        Disasm { pc, bits, op: self }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.print(fmt, None)
    }
}

struct Disasm<'a> {
    pc: u64,
    bits: u32,
    op: &'a Op,
}

impl<'a> fmt::Display for Disasm<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if (self.pc & 0xFFFFFFFF) == self.pc {
            write!(fmt, "{:8x}:       ", self.pc)?;
        } else {
            write!(fmt, "{:16x}:       ", self.pc)?;
        }

        if self.bits & 3 == 3 {
            write!(fmt, "{:08x}", self.bits)?;
        } else {
            write!(fmt, "{:04x}    ", self.bits & 0xFFFF)?;
        }

        write!(fmt, "        ")?;
        self.op.print(fmt, Some(self.pc))
    }
}

#[cfg(test)]
mod tests {
    use crate::decode::decode;
    use crate::{Op, Xlen};

    fn disasm(bits: u32) -> (Op, std::string::String) {
        let op = decode(bits, Xlen::Rv64);
        let text = std::format!("{}", op);
        // Collapse the padded mnemonic column for comparison.
        let mut words = text.splitn(2, ' ');
        let head = words.next().unwrap().to_owned();
        match words.next().map(str::trim_start).filter(|rest| !rest.is_empty()) {
            Some(rest) => (op, std::format!("{} {}", head, rest)),
            None => (op, head),
        }
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(disasm(0x00500093).1, "addi ra, zero, 5");
        assert_eq!(disasm(0x00c58633).1, "add a2, a1, a2");
        assert_eq!(disasm(0x0085f463).1, "bgeu a1, s0, pc + 8");
        assert_eq!(disasm(0x0007b703).1, "ld a4, 0(a5)");
        assert_eq!(disasm(0x02e787b3).1, "mul a5, a5, a4");
        assert_eq!(disasm(0x100527af).1, "lr.w a5, (a0)");
        assert_eq!(disasm(0x1ae7a7af).1, "sc.w.rl a5, a4, (a5)");
        assert_eq!(disasm(0x0d0072d7).1, "vsetvli t0, zero, e32,m1,ta,ma");
    }

    #[test]
    fn test_illegal_prints_illegal() {
        let (op, text) = disasm(0xffff_ffff);
        assert_eq!(op, Op::Illegal);
        assert_eq!(text, "illegal");
    }
}
