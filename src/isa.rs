//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's opcode table. The [`for_each_opcode!`](crate::for_each_opcode)
//! macro holds the canonical opcode definitions and invokes a callback macro
//! for code generation, keeping the table in one place for any module that
//! needs to generate opcode-driven code.
//!
//! This module generates:
//! - The [`BpfOpcode`] enum with fixed wire values
//! - `TryFrom<u8>` for decoding opcode bytes
//! - Accessors for mnemonic, [`Category`] and [`OperandFormat`]
//!
//! Opcode values are wire format: they match what libpcap's compiler and
//! `tcpdump -dd` emit for the classic instructions, and the `0xE0`..`0xE5`
//! block holds the check extensions.

use crate::errors::ValidationError;

/// Broad instruction class, used by the verifier and the tools.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Category {
    /// Packet, scratch and immediate loads into A or X.
    Load,
    /// Scratch stores from A or X.
    Store,
    /// Arithmetic and logic on A.
    Alu,
    /// Unconditional and conditional branches.
    Jump,
    /// Program termination with a result.
    Ret,
    /// Register-to-register transfers.
    Misc,
    /// Check opcodes dispatched through the extension registry.
    Extension,
}

/// How an instruction's dst/src/immediate fields are interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandFormat {
    /// Immediate only (`#k`).
    Immediate,
    /// Absolute packet offset in the immediate (`[k]`).
    MemoryAbs,
    /// Packet offset `X + k` (`[x + k]`).
    MemoryInd,
    /// Scratch slot index in the immediate (`M[k]`).
    MemoryReg,
    /// No operands.
    RegOnly,
    /// Signed relative instruction offset in the immediate (`+k`).
    JumpUncond,
    /// Compared value in the immediate, jt in dst, jf in src.
    JumpCond,
    /// Opcode-specific operand packing.
    Extended,
}

/// Invokes a callback macro with the complete opcode definition list.
///
/// Entry shape: `Name = value, "mnemonic", Category, OperandFormat`.
/// The values are fixed bits; changing any of them breaks wire compatibility
/// with `tcpdump -dd` output (see the static checks at the bottom of this
/// file).
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // Loads into A
            /// A = k
            LdImm = 0x00, "ld", Load, Immediate,
            /// A = u32 at packet[k]
            LdAbsW = 0x20, "ld", Load, MemoryAbs,
            /// A = u16 at packet[k]
            LdAbsH = 0x28, "ldh", Load, MemoryAbs,
            /// A = u8 at packet[k]
            LdAbsB = 0x30, "ldb", Load, MemoryAbs,
            /// A = u32 at packet[X + k]
            LdIndW = 0x40, "ld", Load, MemoryInd,
            /// A = u16 at packet[X + k]
            LdIndH = 0x48, "ldh", Load, MemoryInd,
            /// A = u8 at packet[X + k]
            LdIndB = 0x50, "ldb", Load, MemoryInd,
            /// A = M[k]
            LdMem = 0x60, "ld", Load, MemoryReg,
            /// A = packet length
            LdLen = 0x80, "ld", Load, RegOnly,
            /// A = (packet[k] & 0x0f) << 2, the IPv4 IHL idiom
            LdMsh = 0xA0, "ld", Load, MemoryAbs,

            // Loads into X
            /// X = k
            LdxImm = 0x01, "ldx", Load, Immediate,
            /// X = M[k]
            LdxMem = 0x61, "ldx", Load, MemoryReg,
            /// X = packet length
            LdxLen = 0x81, "ldx", Load, RegOnly,
            /// X = (packet[k] & 0x0f) << 2
            LdxMsh = 0xA1, "ldx", Load, MemoryAbs,
            /// X = (packet[k] & 0x0f) << 2, classic libpcap encoding
            LdxMshB = 0xB1, "ldxb", Load, MemoryAbs,

            // Scratch stores
            /// M[k] = A
            St = 0x02, "st", Store, MemoryReg,
            /// M[k] = X
            Stx = 0x03, "stx", Store, MemoryReg,

            // ALU, immediate operand
            /// A += k
            AddK = 0x04, "add", Alu, Immediate,
            /// A -= k
            SubK = 0x14, "sub", Alu, Immediate,
            /// A *= k
            MulK = 0x24, "mul", Alu, Immediate,
            /// A /= k (k = 0 rejected by the verifier)
            DivK = 0x34, "div", Alu, Immediate,
            /// A |= k
            OrK = 0x44, "or", Alu, Immediate,
            /// A &= k
            AndK = 0x54, "and", Alu, Immediate,
            /// A <<= k
            LshK = 0x64, "lsh", Alu, Immediate,
            /// A >>= k (logical)
            RshK = 0x74, "rsh", Alu, Immediate,
            /// A = -A
            Neg = 0x84, "neg", Alu, RegOnly,
            /// A %= k (k = 0 rejected by the verifier)
            ModK = 0x94, "mod", Alu, Immediate,
            /// A ^= k
            XorK = 0xA4, "xor", Alu, Immediate,

            // ALU, X operand
            /// A += X
            AddX = 0x0C, "add", Alu, RegOnly,
            /// A -= X
            SubX = 0x1C, "sub", Alu, RegOnly,
            /// A *= X
            MulX = 0x2C, "mul", Alu, RegOnly,
            /// A /= X (X = 0 yields A = 0)
            DivX = 0x3C, "div", Alu, RegOnly,
            /// A |= X
            OrX = 0x4C, "or", Alu, RegOnly,
            /// A &= X
            AndX = 0x5C, "and", Alu, RegOnly,
            /// A <<= X
            LshX = 0x6C, "lsh", Alu, RegOnly,
            /// A >>= X (logical)
            RshX = 0x7C, "rsh", Alu, RegOnly,
            /// A %= X (X = 0 yields A = 0)
            ModX = 0x9C, "mod", Alu, RegOnly,
            /// A ^= X
            XorX = 0xAC, "xor", Alu, RegOnly,

            // Jumps
            /// pc += k (signed, relative to the next instruction)
            Ja = 0x05, "ja", Jump, JumpUncond,
            /// if A == k then pc += jt else pc += jf
            JeqK = 0x15, "jeq", Jump, JumpCond,
            /// if A > k then pc += jt else pc += jf
            JgtK = 0x25, "jgt", Jump, JumpCond,
            /// if A >= k then pc += jt else pc += jf
            JgeK = 0x35, "jge", Jump, JumpCond,
            /// if A & k then pc += jt else pc += jf
            JsetK = 0x45, "jset", Jump, JumpCond,
            /// if A == X then pc += jt else pc += jf
            JeqX = 0x1D, "jeq", Jump, JumpCond,
            /// if A > X then pc += jt else pc += jf
            JgtX = 0x2D, "jgt", Jump, JumpCond,
            /// if A >= X then pc += jt else pc += jf
            JgeX = 0x3D, "jge", Jump, JumpCond,
            /// if A & X then pc += jt else pc += jf
            JsetX = 0x4D, "jset", Jump, JumpCond,

            // Returns
            /// terminate with result k
            RetK = 0x06, "ret", Ret, Immediate,
            /// terminate with result A
            RetA = 0x16, "ret", Ret, RegOnly,

            // Misc
            /// X = A
            Tax = 0x07, "tax", Misc, RegOnly,
            /// A = X
            Txa = 0x87, "txa", Misc, RegOnly,

            // Check extensions
            /// verify CRC-32 over [k, k+src), FCS follows the range
            ChkCrc = 0xE0, "chk_crc", Extension, Extended,
            /// verify the layer-3 (IPv4 header) checksum
            ChkL3Csum = 0xE1, "chk_l3_csum", Extension, Extended,
            /// verify the layer-4 (TCP/UDP) checksum
            ChkL4Csum = 0xE2, "chk_l4_csum", Extension, Extended,
            /// flag truncated capture (or visible length below k)
            ChkTrunc = 0xE3, "chk_trunc", Extension, Extended,
            /// assert captured frame length >= k
            ChkFrameLen = 0xE4, "chk_frame_len", Extension, Extended,
            /// assert protocol layer dst sits at offset k
            ChkProtoLoc = 0xE5, "chk_proto_loc", Extension, Extended,
        }
    };
}

macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $value:literal, $mnemonic:literal, $category:ident, $format:ident
        ),* $(,)?
    ) => {
        /// A decoded opcode. The discriminants are the wire values.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        #[repr(u8)]
        pub enum BpfOpcode {
            $(
                $(#[$doc])*
                $name = $value,
            )*
        }

        impl TryFrom<u8> for BpfOpcode {
            type Error = ValidationError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(BpfOpcode::$name), )*
                    _ => Err(ValidationError::UnknownOpcode {
                        index: 0,
                        opcode: value,
                    }),
                }
            }
        }

        impl BpfOpcode {
            /// Returns the mnemonic word printed by the dumper.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( BpfOpcode::$name => $mnemonic, )*
                }
            }

            /// Returns the instruction category.
            pub const fn category(self) -> Category {
                match self {
                    $( BpfOpcode::$name => Category::$category, )*
                }
            }

            /// Returns how dst/src/immediate are interpreted.
            pub const fn format(self) -> OperandFormat {
                match self {
                    $( BpfOpcode::$name => OperandFormat::$format, )*
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl BpfOpcode {
    /// True for packet, scratch and immediate loads.
    pub const fn is_load(self) -> bool {
        matches!(self.category(), Category::Load)
    }

    /// True for scratch stores.
    pub const fn is_store(self) -> bool {
        matches!(self.category(), Category::Store)
    }

    /// True for branch instructions.
    pub const fn is_jump(self) -> bool {
        matches!(self.category(), Category::Jump)
    }

    /// True for `ret #k` and `ret a`.
    pub const fn is_return(self) -> bool {
        matches!(self.category(), Category::Ret)
    }

    /// True for the check opcodes routed through the extension registry.
    pub const fn is_extension(self) -> bool {
        matches!(self.category(), Category::Extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            BpfOpcode::try_from(0xFF),
            Err(ValidationError::UnknownOpcode { opcode: 0xFF, .. })
        ));
    }

    /// Wire values are fixed for `tcpdump -dd` compatibility; any change here
    /// is a breaking format change.
    #[test]
    fn opcode_values_unchanged() {
        // Loads
        assert_eq!(BpfOpcode::LdImm as u8, 0x00);
        assert_eq!(BpfOpcode::LdAbsW as u8, 0x20);
        assert_eq!(BpfOpcode::LdAbsH as u8, 0x28);
        assert_eq!(BpfOpcode::LdAbsB as u8, 0x30);
        assert_eq!(BpfOpcode::LdIndW as u8, 0x40);
        assert_eq!(BpfOpcode::LdIndH as u8, 0x48);
        assert_eq!(BpfOpcode::LdIndB as u8, 0x50);
        assert_eq!(BpfOpcode::LdMem as u8, 0x60);
        assert_eq!(BpfOpcode::LdLen as u8, 0x80);
        assert_eq!(BpfOpcode::LdMsh as u8, 0xA0);
        assert_eq!(BpfOpcode::LdxImm as u8, 0x01);
        assert_eq!(BpfOpcode::LdxMem as u8, 0x61);
        assert_eq!(BpfOpcode::LdxLen as u8, 0x81);
        assert_eq!(BpfOpcode::LdxMsh as u8, 0xA1);
        assert_eq!(BpfOpcode::LdxMshB as u8, 0xB1);

        // Stores
        assert_eq!(BpfOpcode::St as u8, 0x02);
        assert_eq!(BpfOpcode::Stx as u8, 0x03);

        // ALU immediate
        assert_eq!(BpfOpcode::AddK as u8, 0x04);
        assert_eq!(BpfOpcode::SubK as u8, 0x14);
        assert_eq!(BpfOpcode::MulK as u8, 0x24);
        assert_eq!(BpfOpcode::DivK as u8, 0x34);
        assert_eq!(BpfOpcode::OrK as u8, 0x44);
        assert_eq!(BpfOpcode::AndK as u8, 0x54);
        assert_eq!(BpfOpcode::LshK as u8, 0x64);
        assert_eq!(BpfOpcode::RshK as u8, 0x74);
        assert_eq!(BpfOpcode::Neg as u8, 0x84);
        assert_eq!(BpfOpcode::ModK as u8, 0x94);
        assert_eq!(BpfOpcode::XorK as u8, 0xA4);

        // ALU with X: immediate base + 0x08
        assert_eq!(BpfOpcode::AddX as u8, 0x0C);
        assert_eq!(BpfOpcode::SubX as u8, 0x1C);
        assert_eq!(BpfOpcode::MulX as u8, 0x2C);
        assert_eq!(BpfOpcode::DivX as u8, 0x3C);
        assert_eq!(BpfOpcode::OrX as u8, 0x4C);
        assert_eq!(BpfOpcode::AndX as u8, 0x5C);
        assert_eq!(BpfOpcode::LshX as u8, 0x6C);
        assert_eq!(BpfOpcode::RshX as u8, 0x7C);
        assert_eq!(BpfOpcode::ModX as u8, 0x9C);
        assert_eq!(BpfOpcode::XorX as u8, 0xAC);

        // Jumps
        assert_eq!(BpfOpcode::Ja as u8, 0x05);
        assert_eq!(BpfOpcode::JeqK as u8, 0x15);
        assert_eq!(BpfOpcode::JgtK as u8, 0x25);
        assert_eq!(BpfOpcode::JgeK as u8, 0x35);
        assert_eq!(BpfOpcode::JsetK as u8, 0x45);
        assert_eq!(BpfOpcode::JeqX as u8, 0x1D);
        assert_eq!(BpfOpcode::JgtX as u8, 0x2D);
        assert_eq!(BpfOpcode::JgeX as u8, 0x3D);
        assert_eq!(BpfOpcode::JsetX as u8, 0x4D);

        // Returns and misc
        assert_eq!(BpfOpcode::RetK as u8, 0x06);
        assert_eq!(BpfOpcode::RetA as u8, 0x16);
        assert_eq!(BpfOpcode::Tax as u8, 0x07);
        assert_eq!(BpfOpcode::Txa as u8, 0x87);

        // Check extensions
        assert_eq!(BpfOpcode::ChkCrc as u8, 0xE0);
        assert_eq!(BpfOpcode::ChkL3Csum as u8, 0xE1);
        assert_eq!(BpfOpcode::ChkL4Csum as u8, 0xE2);
        assert_eq!(BpfOpcode::ChkTrunc as u8, 0xE3);
        assert_eq!(BpfOpcode::ChkFrameLen as u8, 0xE4);
        assert_eq!(BpfOpcode::ChkProtoLoc as u8, 0xE5);
    }

    #[test]
    fn opcode_categories_unchanged() {
        assert_eq!(BpfOpcode::LdImm.category(), Category::Load);
        assert_eq!(BpfOpcode::LdxMshB.category(), Category::Load);
        assert_eq!(BpfOpcode::St.category(), Category::Store);
        assert_eq!(BpfOpcode::Stx.category(), Category::Store);
        assert_eq!(BpfOpcode::AddK.category(), Category::Alu);
        assert_eq!(BpfOpcode::Neg.category(), Category::Alu);
        assert_eq!(BpfOpcode::XorX.category(), Category::Alu);
        assert_eq!(BpfOpcode::Ja.category(), Category::Jump);
        assert_eq!(BpfOpcode::JsetX.category(), Category::Jump);
        assert_eq!(BpfOpcode::RetK.category(), Category::Ret);
        assert_eq!(BpfOpcode::RetA.category(), Category::Ret);
        assert_eq!(BpfOpcode::Tax.category(), Category::Misc);
        assert_eq!(BpfOpcode::Txa.category(), Category::Misc);
        assert_eq!(BpfOpcode::ChkCrc.category(), Category::Extension);
        assert_eq!(BpfOpcode::ChkProtoLoc.category(), Category::Extension);
    }

    #[test]
    fn opcode_formats_unchanged() {
        assert_eq!(BpfOpcode::LdImm.format(), OperandFormat::Immediate);
        assert_eq!(BpfOpcode::LdAbsW.format(), OperandFormat::MemoryAbs);
        assert_eq!(BpfOpcode::LdIndH.format(), OperandFormat::MemoryInd);
        assert_eq!(BpfOpcode::LdMem.format(), OperandFormat::MemoryReg);
        assert_eq!(BpfOpcode::LdLen.format(), OperandFormat::RegOnly);
        assert_eq!(BpfOpcode::LdMsh.format(), OperandFormat::MemoryAbs);
        assert_eq!(BpfOpcode::St.format(), OperandFormat::MemoryReg);
        assert_eq!(BpfOpcode::AddK.format(), OperandFormat::Immediate);
        assert_eq!(BpfOpcode::AddX.format(), OperandFormat::RegOnly);
        assert_eq!(BpfOpcode::Ja.format(), OperandFormat::JumpUncond);
        assert_eq!(BpfOpcode::JeqK.format(), OperandFormat::JumpCond);
        assert_eq!(BpfOpcode::JeqX.format(), OperandFormat::JumpCond);
        assert_eq!(BpfOpcode::RetK.format(), OperandFormat::Immediate);
        assert_eq!(BpfOpcode::RetA.format(), OperandFormat::RegOnly);
        assert_eq!(BpfOpcode::ChkFrameLen.format(), OperandFormat::Extended);
    }

    #[test]
    fn opcode_count_unchanged() {
        const EXPECTED_COUNT: usize = 57;

        let mut count = 0;
        for byte in 0..=0xFF_u8 {
            count += BpfOpcode::try_from(byte).is_ok() as usize;
        }

        assert_eq!(
            count, EXPECTED_COUNT,
            "opcode count changed: expected {}, found {}",
            EXPECTED_COUNT, count
        );
    }
}
