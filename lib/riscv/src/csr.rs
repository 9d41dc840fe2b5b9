use core::convert::TryFrom;
use core::fmt;
use num_traits::FromPrimitive;

/// CSR numbers the frontend knows by name.
///
/// The two top bits of the number encode read-only-ness and the next two the
/// minimal privilege level, so both predicates are derived rather than
/// tabulated.
#[repr(u16)]
#[derive(Clone, Copy, PartialEq, Eq, FromPrimitive, Debug)]
pub enum Csr {
    /* Floating-point accrued state */
    Fflags = 0x001,
    Frm = 0x002,
    Fcsr = 0x003,

    /* Vector unit */
    Vstart = 0x008,
    Vl = 0xC20,
    Vtype = 0xC21,
    Vlenb = 0xC22,

    /* Unprivileged counters */
    Cycle = 0xC00,
    Time = 0xC01,
    Instret = 0xC02,
    // RV32-only high halves; invalid encodings on RV64.
    Cycleh = 0xC80,
    Timeh = 0xC81,
    Instreth = 0xC82,

    /* Supervisor */
    Sstatus = 0x100,
    Sie = 0x104,
    Stvec = 0x105,
    Scounteren = 0x106,
    Sscratch = 0x140,
    Sepc = 0x141,
    Scause = 0x142,
    Stval = 0x143,
    Sip = 0x144,
    Satp = 0x180,

    /* Machine */
    Mstatus = 0x300,
    Misa = 0x301,
    Medeleg = 0x302,
    Mideleg = 0x303,
    Mie = 0x304,
    Mtvec = 0x305,
    Mcounteren = 0x306,
    Mscratch = 0x340,
    Mepc = 0x341,
    Mcause = 0x342,
    Mtval = 0x343,
    Mip = 0x344,
    Mhartid = 0xF14,
}

impl Csr {
    /// Minimal privilege level required to access the CSR.
    pub fn min_prv_level(self) -> u8 {
        (((self as u16) >> 8) & 0b11) as u8
    }

    pub fn readonly(self) -> bool {
        ((self as u16) >> 10) & 0b11 == 0b11
    }
}

impl TryFrom<u16> for Csr {
    type Error = ();
    fn try_from(value: u16) -> Result<Csr, ()> {
        match Csr::from_u64(value as u64) {
            Some(v) => Ok(v),
            None => Err(()),
        }
    }
}

impl fmt::Display for Csr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match self {
            Csr::Fflags => "fflags",
            Csr::Frm => "frm",
            Csr::Fcsr => "fcsr",
            Csr::Vstart => "vstart",
            Csr::Vl => "vl",
            Csr::Vtype => "vtype",
            Csr::Vlenb => "vlenb",
            Csr::Cycle => "cycle",
            Csr::Time => "time",
            Csr::Instret => "instret",
            Csr::Cycleh => "cycleh",
            Csr::Timeh => "timeh",
            Csr::Instreth => "instreth",
            Csr::Sstatus => "sstatus",
            Csr::Sie => "sie",
            Csr::Stvec => "stvec",
            Csr::Scounteren => "scounteren",
            Csr::Sscratch => "sscratch",
            Csr::Sepc => "sepc",
            Csr::Scause => "scause",
            Csr::Stval => "stval",
            Csr::Sip => "sip",
            Csr::Satp => "satp",
            Csr::Mstatus => "mstatus",
            Csr::Misa => "misa",
            Csr::Medeleg => "medeleg",
            Csr::Mideleg => "mideleg",
            Csr::Mie => "mie",
            Csr::Mtvec => "mtvec",
            Csr::Mcounteren => "mcounteren",
            Csr::Mscratch => "mscratch",
            Csr::Mepc => "mepc",
            Csr::Mcause => "mcause",
            Csr::Mtval => "mtval",
            Csr::Mip => "mip",
            Csr::Mhartid => "mhartid",
        })
    }
}
