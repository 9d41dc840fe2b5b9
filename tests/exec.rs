//! End-to-end scenarios: translate guest code into IR, then execute the IR
//! against a CPU state and a flat guest memory with a small reference
//! evaluator. The evaluator implements exactly the op semantics a real
//! back-end would lower to.

extern crate byteorder;
extern crate pretty_env_logger;
extern crate riscv;
extern crate rvtrans;

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use riscv::Xlen;
use rvtrans::cpu::{
    CpuState, EXCP_ILLEGAL_INST, EXCP_INST_ADDR_MIS, MISA_A, MISA_C, MISA_D, MISA_F, MISA_I,
    MISA_M, MISA_V, MSTATUS_VS,
};
use rvtrans::ir::{AluOp, Cond, EnvField, GlobalField, HelperId, IrBuffer, IrOp, MemOp, Temp};
use rvtrans::translate::{translate_init, CodeMemory, TranslationBlock};
use rvtrans::vector;

/// Identity-mapped guest RAM starting at address 0.
struct Ram(Vec<u8>);

impl Ram {
    fn new(size: usize) -> Ram {
        Ram(vec![0; size])
    }

    fn write_code(&mut self, addr: u64, words: &[u32]) {
        let mut p = addr as usize;
        for w in words {
            LittleEndian::write_u32(&mut self.0[p..p + 4], *w);
            p += 4;
        }
    }
}

impl CodeMemory for Ram {
    fn fetch_u32(&self, pc: u64) -> u32 {
        LittleEndian::read_u32(&self.0[pc as usize..pc as usize + 4])
    }
}

/// Outcome of executing one block of IR.
#[derive(Debug, PartialEq)]
struct Exit {
    exception: Option<(u32, u64)>,
}

struct Evaluator<'a> {
    env: &'a mut CpuState,
    ram: &'a mut Ram,
    temps: Vec<u64>,
}

impl<'a> Evaluator<'a> {
    fn new(env: &'a mut CpuState, ram: &'a mut Ram) -> Evaluator<'a> {
        Evaluator { env, ram, temps: Vec::new() }
    }

    fn read(&self, ir: &IrBuffer, t: Temp) -> u64 {
        let idx = t.0 as usize;
        if idx < ir.globals().len() {
            match ir.globals()[idx].0 {
                GlobalField::Gpr(n) => self.env.gpr[n as usize],
                GlobalField::Fpr(n) => self.env.fpr[n as usize],
                GlobalField::Pc => self.env.pc,
                GlobalField::LoadRes => self.env.load_res,
            }
        } else {
            self.temps.get(idx).copied().unwrap_or(0)
        }
    }

    fn write(&mut self, ir: &IrBuffer, t: Temp, val: u64) {
        let idx = t.0 as usize;
        if idx < ir.globals().len() {
            match ir.globals()[idx].0 {
                GlobalField::Gpr(n) => self.env.gpr[n as usize] = val,
                GlobalField::Fpr(n) => self.env.fpr[n as usize] = val,
                GlobalField::Pc => self.env.pc = val,
                GlobalField::LoadRes => self.env.load_res = val,
            }
        } else {
            if self.temps.len() <= idx {
                self.temps.resize(idx + 1, 0);
            }
            self.temps[idx] = val;
        }
    }

    fn cond(cond: Cond, a: u64, b: u64) -> bool {
        match cond {
            Cond::Eq => a == b,
            Cond::Ne => a != b,
            Cond::Lt => (a as i64) < (b as i64),
            Cond::Ge => (a as i64) >= (b as i64),
            Cond::Ltu => a < b,
            Cond::Geu => a >= b,
            Cond::Gt => (a as i64) > (b as i64),
            Cond::Gtu => a > b,
        }
    }

    fn alu(op: AluOp, a: u64, b: u64) -> u64 {
        match op {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Shl => a << (b & 63),
            AluOp::Shr => a >> (b & 63),
            AluOp::Sar => ((a as i64) >> (b & 63)) as u64,
            AluOp::Mul => a.wrapping_mul(b),
            // The emitter steers the special cases away from the native
            // divide, so a zero divisor can only mean an emitter bug.
            AluOp::Div => (a as i64).wrapping_div(b as i64) as u64,
            AluOp::Divu => a / b,
            AluOp::Rem => (a as i64).wrapping_rem(b as i64) as u64,
            AluOp::Remu => a % b,
        }
    }

    fn run(&mut self, ir: &IrBuffer) -> Exit {
        let mut labels: HashMap<u32, usize> = HashMap::new();
        for (i, op) in ir.ops.iter().enumerate() {
            if let IrOp::SetLabel(l) = op {
                labels.insert(l.0, i);
            }
        }

        let mut pos = 0;
        let mut steps = 0;
        while pos < ir.ops.len() {
            steps += 1;
            assert!(steps < 100_000, "runaway IR execution");
            match &ir.ops[pos] {
                IrOp::InsnStart { .. } | IrOp::SetLabel(_) | IrOp::GotoTb { .. } => (),
                IrOp::Movi { dst, imm } => self.write(ir, *dst, *imm),
                IrOp::Mov { dst, src } => {
                    let v = self.read(ir, *src);
                    self.write(ir, *dst, v);
                }
                IrOp::Alu { op, dst, a, b } => {
                    let v = Self::alu(*op, self.read(ir, *a), self.read(ir, *b));
                    self.write(ir, *dst, v);
                }
                IrOp::Mulu2 { lo, hi, a, b } => {
                    let p = self.read(ir, *a) as u128 * self.read(ir, *b) as u128;
                    self.write(ir, *lo, p as u64);
                    self.write(ir, *hi, (p >> 64) as u64);
                }
                IrOp::Muls2 { lo, hi, a, b } => {
                    let p = self.read(ir, *a) as i64 as i128 * self.read(ir, *b) as i64 as i128;
                    self.write(ir, *lo, p as u64);
                    self.write(ir, *hi, (p >> 64) as u64);
                }
                IrOp::Setcond { cond, dst, a, b } => {
                    let v = Self::cond(*cond, self.read(ir, *a), self.read(ir, *b)) as u64;
                    self.write(ir, *dst, v);
                }
                IrOp::Movcond { cond, dst, c1, c2, vtrue, vfalse } => {
                    let taken = Self::cond(*cond, self.read(ir, *c1), self.read(ir, *c2));
                    let v = if taken { self.read(ir, *vtrue) } else { self.read(ir, *vfalse) };
                    self.write(ir, *dst, v);
                }
                IrOp::Ext32s { dst, src } => {
                    let v = self.read(ir, *src) as i32 as i64 as u64;
                    self.write(ir, *dst, v);
                }
                IrOp::Ext32u { dst, src } => {
                    let v = self.read(ir, *src) as u32 as u64;
                    self.write(ir, *dst, v);
                }
                IrOp::LoadEnv { dst, field } => {
                    let v = match field {
                        EnvField::Mstatus => self.env.mstatus,
                    };
                    self.write(ir, *dst, v);
                }
                IrOp::GuestLd { dst, addr, memop, .. } => {
                    let a = self.read(ir, *addr) as usize;
                    let m = &self.ram.0;
                    let v = match memop {
                        MemOp::I8 => m[a] as i8 as i64 as u64,
                        MemOp::U8 => m[a] as u64,
                        MemOp::I16 => LittleEndian::read_u16(&m[a..]) as i16 as i64 as u64,
                        MemOp::U16 => LittleEndian::read_u16(&m[a..]) as u64,
                        MemOp::I32 => LittleEndian::read_u32(&m[a..]) as i32 as i64 as u64,
                        MemOp::U32 => LittleEndian::read_u32(&m[a..]) as u64,
                        MemOp::I64 => LittleEndian::read_u64(&m[a..]),
                    };
                    self.write(ir, *dst, v);
                }
                IrOp::GuestSt { src, addr, memop, .. } => {
                    let a = self.read(ir, *addr) as usize;
                    let v = self.read(ir, *src);
                    let m = &mut self.ram.0;
                    match memop.size() {
                        1 => m[a] = v as u8,
                        2 => LittleEndian::write_u16(&mut m[a..], v as u16),
                        4 => LittleEndian::write_u32(&mut m[a..], v as u32),
                        _ => LittleEndian::write_u64(&mut m[a..], v),
                    }
                }
                IrOp::Brcond { cond, a, b, target } => {
                    if Self::cond(*cond, self.read(ir, *a), self.read(ir, *b)) {
                        pos = labels[&target.0];
                    }
                }
                IrOp::Br(target) => pos = labels[&target.0],
                IrOp::ExitTb { .. } => return Exit { exception: None },
                IrOp::Call { helper, ret, args } => {
                    let argv: Vec<u64> = args.iter().map(|a| self.read(ir, *a)).collect();
                    match self.call(ir, *helper, ret, &argv) {
                        Ok(stop) => {
                            if stop {
                                return Exit { exception: None };
                            }
                        }
                        Err(exc) => return Exit { exception: Some(exc) },
                    }
                }
            }
            pos += 1;
        }
        Exit { exception: None }
    }

    /// Dispatch a helper call. Returns Ok(true) when the helper ends
    /// execution (exceptions that unwind in a real engine).
    fn call(
        &mut self,
        ir: &IrBuffer,
        helper: HelperId,
        ret: &Option<Temp>,
        args: &[u64],
    ) -> Result<bool, (u32, u64)> {
        let env = &mut *self.env;
        let r = match helper {
            HelperId::RaiseException => return Err((args[0] as u32, 0)),
            HelperId::RaiseExceptionMbadaddr => return Err((args[0] as u32, args[1])),
            HelperId::RaiseExceptionDebug => {
                return Err((rvtrans::cpu::EXCP_DEBUG, 0));
            }
            HelperId::Vsetvl => vector::helper_vsetvl(
                env,
                args[0] as u32,
                args[1] as u32,
                args[2],
                args[3],
                args[4] != 0,
            )
            .map(Some),
            HelperId::VmvIvi => {
                vector::helper_vmv_ivi(env, args[0] as u32, args[1] as i64).map(|_| None)
            }
            HelperId::VmvIvv => {
                vector::helper_vmv_ivv(env, args[0] as u32, args[1] as u32).map(|_| None)
            }
            HelperId::VmergeIvv => {
                vector::helper_vmerge_ivv(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VmergeIvi => {
                vector::helper_vmerge_ivi(env, args[0] as u32, args[1] as u32, args[2] as i64)
                    .map(|_| None)
            }
            HelperId::VcompressMvv => {
                vector::helper_vcompress_mvv(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VadcVvm => {
                vector::helper_vadc_vvm(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VadcVi => {
                vector::helper_vadc_vi(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            HelperId::VsbcVvm => {
                vector::helper_vsbc_vvm(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VsbcVi => {
                vector::helper_vsbc_vi(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            HelperId::VmadcVv => {
                vector::helper_vmadc_vv(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VmadcVvm => {
                vector::helper_vmadc_vvm(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VmadcVi => {
                vector::helper_vmadc_vi(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            HelperId::VmadcVim => {
                vector::helper_vmadc_vim(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            HelperId::VmsbcVv => {
                vector::helper_vmsbc_vv(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VmsbcVvm => {
                vector::helper_vmsbc_vvm(env, args[0] as u32, args[1] as u32, args[2] as u32)
                    .map(|_| None)
            }
            HelperId::VmsbcVi => {
                vector::helper_vmsbc_vi(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            HelperId::VmsbcVim => {
                vector::helper_vmsbc_vim(env, args[0] as u32, args[1] as u32, args[2]).map(|_| None)
            }
            // Scalar helpers (FP, CSR, privilege) are external; none of the
            // scenarios below reach them.
            _ => Ok(None),
        };
        match r {
            Ok(Some(v)) => {
                if let Some(t) = ret {
                    self.write(ir, *t, v);
                }
                Ok(false)
            }
            Ok(None) => {
                if let Some(t) = ret {
                    self.write(ir, *t, 0);
                }
                Ok(false)
            }
            Err(trap) => Err((trap.cause, trap.tval)),
        }
    }
}

fn rv64_env() -> CpuState {
    CpuState::new(Xlen::Rv64, MISA_I | MISA_M | MISA_A | MISA_F | MISA_D | MISA_C | MISA_V, 16)
}

/// Translate one block at env.pc and execute it.
fn run_block(env: &mut CpuState, ram: &mut Ram, max_insns: u32) -> Exit {
    let _ = pretty_env_logger::try_init();
    let mut ir = IrBuffer::new();
    let trans = translate_init(&mut ir, env.xlen);
    let mut tb = TranslationBlock::new(env.pc);
    trans.gen_block(env, &mut tb, ram, &mut ir, max_insns);
    Evaluator::new(env, ram).run(&ir)
}

#[test]
fn test_addi_executes() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    ram.write_code(0x1000, &[0x00500093]); // addi x1, x0, 5
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[1], 5);
    assert_eq!(env.pc, 0x1004);
}

#[test]
fn test_slli_reserved_shamt_raises() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[1] = 1;
    env.gpr[2] = 0xdead;
    ram.write_code(0x1000, &[0x04009113]); // slli x2, x1, 64
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, Some((EXCP_ILLEGAL_INST, 0)));
    assert_eq!(env.gpr[2], 0xdead);
    assert_eq!(env.pc, 0x1000);
}

#[test]
fn test_div_by_zero_returns_all_ones() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[4] = 7;
    ram.write_code(0x1000, &[0x020241b3]); // div x3, x4, x0
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], u64::MAX);
}

#[test]
fn test_divu_by_zero_and_rem_by_zero() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[4] = 7;
    // divu x3, x4, x0; rem x6, x4, x0; remu x7, x4, x0
    ram.write_code(0x1000, &[0x020251b3, 0x02026333, 0x020273b3]);
    let exit = run_block(&mut env, &mut ram, 3);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], u64::MAX);
    assert_eq!(env.gpr[6], 7);
    assert_eq!(env.gpr[7], 7);
}

#[test]
fn test_signed_overflow_division() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[4] = i64::MIN as u64;
    env.gpr[5] = -1i64 as u64;
    // div x3, x4, x5; rem x6, x4, x5
    ram.write_code(0x1000, &[0x025241b3, 0x02526333]);
    let exit = run_block(&mut env, &mut ram, 2);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], i64::MIN as u64);
    assert_eq!(env.gpr[6], 0);
}

#[test]
fn test_divw_special_cases() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[4] = i32::MIN as i64 as u64;
    env.gpr[5] = -1i64 as u64;
    // divw x3, x4, x5; remw x6, x4, x5; divuw x7, x4, x0
    ram.write_code(0x1000, &[0x025241bb, 0x0252633b, 0x020253bb]);
    let exit = run_block(&mut env, &mut ram, 3);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], i32::MIN as i64 as u64);
    assert_eq!(env.gpr[6], 0);
    assert_eq!(env.gpr[7], u64::MAX); // 2^32 - 1 sign-extended
}

#[test]
fn test_branch_misaligned_reports_target() {
    let mut env = CpuState::new(Xlen::Rv32, MISA_I | MISA_M, 16);
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1002;
    env.gpr[1] = 3;
    ram.write_code(0x1002, &[0x00108463]); // beq x1, x1, +8
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, Some((EXCP_INST_ADDR_MIS, 0x100a)));
    assert_eq!(env.pc, 0x1002);
}

#[test]
fn test_branch_taken_and_not_taken() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[1] = 1;
    env.gpr[2] = 2;
    ram.write_code(0x1000, &[0x00208463]); // beq x1, x2, +8
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.pc, 0x1004); // not taken

    env.pc = 0x1000;
    env.gpr[2] = 1;
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.pc, 0x1008); // taken
}

#[test]
fn test_jal_and_jalr_link() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    ram.write_code(0x1000, &[0x008000ef]); // jal x1, +8
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[1], 0x1004);
    assert_eq!(env.pc, 0x1008);

    env.pc = 0x1000;
    env.gpr[2] = 0x2001; // low bit must be masked off
    ram.write_code(0x1000, &[0x00010167]); // jalr x2, x2, 0
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[2], 0x1004);
    assert_eq!(env.pc, 0x2000);
}

#[test]
fn test_load_store_roundtrip() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[1] = 0x2000;
    env.gpr[2] = 0xfedc_ba98_7654_3210;
    // sd x2, 8(x1); lw x3, 8(x1); lbu x4, 11(x1)
    ram.write_code(0x1000, &[0x0020b423, 0x0080a183, 0x00b0c203]);
    let exit = run_block(&mut env, &mut ram, 3);
    assert_eq!(exit.exception, None);
    assert_eq!(LittleEndian::read_u64(&ram.0[0x2008..]), 0xfedc_ba98_7654_3210);
    assert_eq!(env.gpr[3], 0x7654_3210);
    assert_eq!(env.gpr[4], 0x76);
}

#[test]
fn test_mulhsu_against_reference() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    let cases: [(i64, u64); 4] =
        [(-7, 3), (7, u64::MAX), (i64::MIN, u64::MAX), (0x1234_5678_9abc_def0, 0xdead_beef_cafe_f00d)];
    let mulhsu = 0x025221b3; // mulhsu x3, x4, x5
    for (a, b) in cases.iter() {
        env.pc = 0x1000;
        env.gpr[4] = *a as u64;
        env.gpr[5] = *b;
        ram.write_code(0x1000, &[mulhsu]);
        let exit = run_block(&mut env, &mut ram, 1);
        assert_eq!(exit.exception, None);
        let expect = ((*a as i128).wrapping_mul(*b as i128) >> 64) as u64;
        assert_eq!(env.gpr[3], expect, "mulhsu({:#x}, {:#x})", a, b);
    }
}

#[test]
fn test_amoadd_and_sc() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[1] = 0x2000;
    env.gpr[2] = 5;
    LittleEndian::write_u32(&mut ram.0[0x2000..], 7);
    // amoadd.w x3, x2, (x1); sc.w x4, x2, (x1)
    let amoadd = 0b0000000 << 25 | 2 << 20 | 1 << 15 | 0b010 << 12 | 3 << 7 | 0b0101111;
    let sc = 0b0001100 << 25 | 2 << 20 | 1 << 15 | 0b010 << 12 | 4 << 7 | 0b0101111;
    ram.write_code(0x1000, &[amoadd, sc]);
    let exit = run_block(&mut env, &mut ram, 2);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], 7); // pre-op value
    assert_eq!(env.gpr[4], 0); // sc always succeeds
    assert_eq!(LittleEndian::read_u32(&ram.0[0x2000..]), 5); // sc stored over the sum
}

#[test]
fn test_amomax_skips_store_when_memory_wins() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    env.gpr[1] = 0x2000;
    env.gpr[2] = 3;
    LittleEndian::write_u32(&mut ram.0[0x2000..], 9);
    // amomax.w x3, x2, (x1)
    let amomax = 0b1010000 << 25 | 2 << 20 | 1 << 15 | 0b010 << 12 | 3 << 7 | 0b0101111;
    ram.write_code(0x1000, &[amomax]);
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[3], 9);
    assert_eq!(LittleEndian::read_u32(&ram.0[0x2000..]), 9);
}

#[test]
fn test_vsetvli_executes() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.mstatus |= MSTATUS_VS;
    env.pc = 0x1000;
    ram.write_code(0x1000, &[0x0d0072d7]); // vsetvli t0, zero, e32, m1, ta, ma
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    assert_eq!(env.vsew, 32);
    assert_eq!(env.vlmax, 4);
    assert_eq!(env.vl, 4);
    assert!(!env.vill);
    assert_eq!(env.gpr[5], 4);
    assert_eq!(env.pc, 0x1004);
}

#[test]
fn test_vector_move_via_emitted_call() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.mstatus |= MSTATUS_VS;
    env.pc = 0x1000;
    ram.write_code(0x1000, &[0x0d0072d7]); // vsetvli t0, zero, e32, m1, ta, ma
    run_block(&mut env, &mut ram, 1);

    // vmv.v.x v2, x6
    env.gpr[6] = 0x1234_5678;
    let vmv_vx = 0x5e000057 | (2 << 7) | (0b100 << 12) | (6 << 15);
    ram.write_code(env.pc, &[vmv_vx]);
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, None);
    for i in 0..4 {
        assert_eq!(LittleEndian::read_u32(&env.vreg[2 * 16 + i * 4..]), 0x1234_5678);
    }
}

#[test]
fn test_vector_op_with_vs_disabled_raises() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    ram.write_code(0x1000, &[0x0d0072d7]);
    let exit = run_block(&mut env, &mut ram, 1);
    assert_eq!(exit.exception, Some((EXCP_ILLEGAL_INST, 0)));
}

#[test]
fn test_compressed_pair_executes() {
    let mut env = rv64_env();
    let mut ram = Ram::new(0x4000);
    env.pc = 0x1000;
    // c.li x1, 5; c.addi x1, 3 packed into one 32-bit word.
    let c_li: u16 = 0b010_0_00001_00101_01;
    let c_addi: u16 = 0b000_0_00001_00011_01;
    ram.write_code(0x1000, &[(c_addi as u32) << 16 | c_li as u32]);
    let exit = run_block(&mut env, &mut ram, 2);
    assert_eq!(exit.exception, None);
    assert_eq!(env.gpr[1], 8);
    assert_eq!(env.pc, 0x1004);
}
