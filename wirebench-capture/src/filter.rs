//! Kernel Filter Programs
//!
//! Compiles the ICMP/ICMPv6 accept predicate into a classic BPF program:
//! a frame passes iff `(ether = 0x0800 ∧ ipv4.proto = 1)` or
//! `(ether = 0x86DD ∧ ipv6.next = 58)`. On accept the program returns a
//! large capture length; on reject it returns 0. The same program is
//! installed via `SO_ATTACH_FILTER` on Linux and `BIOCSETF` on BSD-style
//! BPF devices.

use std::fmt;
use std::str::FromStr;

// Classic BPF opcodes (BPF_LD | BPF_H | BPF_ABS etc.).
const OP_LDH_ABS: u16 = 0x28;
const OP_LDB_ABS: u16 = 0x30;
const OP_JEQ_K: u16 = 0x15;
const OP_RET_K: u16 = 0x06;

// Fixed header offsets the classifier inspects.
const OFF_ETHERTYPE: u32 = 12;
const OFF_IPV4_PROTO: u32 = 23;
const OFF_IPV6_NEXT: u32 = 20;

/// Capture length returned on accept (256 KiB, effectively "whole frame").
const ACCEPT_LEN: u32 = 0x0004_0000;

/// One classic BPF instruction, layout-compatible with the kernel's
/// `sock_filter` / `bpf_insn`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpfInsn {
    /// Opcode.
    pub code: u16,
    /// Jump offset when the comparison is true.
    pub jt: u8,
    /// Jump offset when the comparison is false.
    pub jf: u8,
    /// Immediate operand.
    pub k: u32,
}

impl BpfInsn {
    const fn stmt(code: u16, k: u32) -> Self {
        Self { code, jt: 0, jf: 0, k }
    }

    const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

/// Which classifier to install on the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// No filter; every frame passes.
    #[default]
    None,
    /// Accept only ICMP over IPv4 and ICMPv6 over IPv6.
    Icmp,
}

impl FilterKind {
    /// Canonical name used in metadata and baseline compatibility checks.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Icmp => "icmp",
        }
    }

    /// Compile to a classic BPF program, or `None` when no filter is set.
    pub fn compile(self) -> Option<Vec<BpfInsn>> {
        match self {
            FilterKind::None => None,
            FilterKind::Icmp => Some(icmp_program()),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(FilterKind::None),
            "icmp" => Ok(FilterKind::Icmp),
            other => Err(format!("unknown filter: {other} (expected icmp or none)")),
        }
    }
}

/// The ICMP/ICMPv6 classifier, nine instructions.
///
/// ```text
/// (0) ldh [12]              ; A = ethertype
/// (1) jeq #0x0800 -> 2, 4
/// (2) ldb [23]              ; A = IPv4 protocol
/// (3) jeq #1      -> 7, 8
/// (4) jeq #0x86dd -> 5, 8
/// (5) ldb [20]              ; A = IPv6 next header
/// (6) jeq #58     -> 7, 8
/// (7) ret #262144           ; accept
/// (8) ret #0                ; reject
/// ```
fn icmp_program() -> Vec<BpfInsn> {
    vec![
        BpfInsn::stmt(OP_LDH_ABS, OFF_ETHERTYPE),
        BpfInsn::jump(OP_JEQ_K, u32::from(wirebench_core::ETHERTYPE_IPV4), 0, 2),
        BpfInsn::stmt(OP_LDB_ABS, OFF_IPV4_PROTO),
        BpfInsn::jump(OP_JEQ_K, u32::from(wirebench_core::PROTO_ICMP), 3, 4),
        BpfInsn::jump(OP_JEQ_K, u32::from(wirebench_core::ETHERTYPE_IPV6), 0, 3),
        BpfInsn::stmt(OP_LDB_ABS, OFF_IPV6_NEXT),
        BpfInsn::jump(OP_JEQ_K, u32::from(wirebench_core::PROTO_ICMPV6), 0, 1),
        BpfInsn::stmt(OP_RET_K, ACCEPT_LEN),
        BpfInsn::stmt(OP_RET_K, 0),
    ]
}
