// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Flag arithmetic for 8- and 16-bit operands.

use super::registers::Psw;

fn width_mask(bits: u32) -> u32 {
    (1u32 << bits) - 1
}

/// Half-carry boundary: nibble for bytes, bit 11 for words.
fn half_mask(bits: u32) -> u32 {
    if bits == 8 {
        0xF
    } else {
        0xFFF
    }
}

fn set_zs(psw: &mut Psw, result: u32, bits: u32, chain_zero: bool) {
    let zero = result & width_mask(bits) == 0;
    let z = if chain_zero {
        psw.contains(Psw::Z) && zero
    } else {
        zero
    };
    psw.set(Psw::Z, z);
    psw.set(Psw::S, result & (1 << (bits - 1)) != 0);
}

/// `a + b (+ carry)`. Sets C, Z, S, OV and HC.
pub fn add(psw: &mut Psw, a: u32, b: u32, with_carry: bool, bits: u32) -> u32 {
    let mask = width_mask(bits);
    let sign = 1 << (bits - 1);
    let carry = (with_carry && psw.contains(Psw::C)) as u32;
    let (a, b) = (a & mask, b & mask);
    let wide = a + b + carry;
    let result = wide & mask;

    let half = half_mask(bits);
    psw.set(Psw::C, wide > mask);
    psw.set(Psw::OV, (a ^ result) & (b ^ result) & sign != 0);
    psw.set(Psw::HC, (a & half) + (b & half) + carry > half);
    set_zs(psw, result, bits, with_carry);
    result
}

/// `a - b (- carry)`. Sets C (borrow), Z, S, OV and HC.
pub fn sub(psw: &mut Psw, a: u32, b: u32, with_carry: bool, bits: u32) -> u32 {
    let mask = width_mask(bits);
    let sign = 1 << (bits - 1);
    let carry = (with_carry && psw.contains(Psw::C)) as u32;
    let (a, b) = (a & mask, b & mask);
    let result = a.wrapping_sub(b).wrapping_sub(carry) & mask;

    let half = half_mask(bits);
    psw.set(Psw::C, a < b + carry);
    psw.set(Psw::OV, (a ^ b) & (a ^ result) & sign != 0);
    psw.set(Psw::HC, (a & half) < (b & half) + carry);
    set_zs(psw, result, bits, with_carry);
    result
}

/// AND/OR/XOR: Z and S from the result, C and OV cleared.
pub fn logic(psw: &mut Psw, result: u32, bits: u32) -> u32 {
    let result = result & width_mask(bits);
    psw.remove(Psw::C | Psw::OV);
    set_zs(psw, result, bits, false);
    result
}

/// MOV and loads: Z and S only.
pub fn zs(psw: &mut Psw, result: u32, bits: u32) -> u32 {
    let result = result & width_mask(bits);
    set_zs(psw, result, bits, false);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Sll,
    Sllc,
    Srl,
    Srlc,
    Sra,
}

/// Byte shifts. `fill` is the neighbouring register for SLLC/SRLC.
/// Only C changes; a width of 0 leaves everything untouched.
pub fn shift(psw: &mut Psw, kind: Shift, value: u8, fill: u8, width: u8) -> u8 {
    let width = (width & 7) as u32;
    if width == 0 {
        return value;
    }
    let v = value as u32;
    let (result, carry) = match kind {
        Shift::Sll => ((v << width) as u8, v >> (8 - width) & 1),
        Shift::Sllc => (
            ((v << 8 | fill as u32) << width >> 8) as u8,
            v >> (8 - width) & 1,
        ),
        Shift::Srl => ((v >> width) as u8, v >> (width - 1) & 1),
        Shift::Srlc => (
            (((fill as u32) << 8 | v) >> width) as u8,
            v >> (width - 1) & 1,
        ),
        Shift::Sra => (((value as i8) >> width) as u8, v >> (width - 1) & 1),
    };
    psw.set(Psw::C, carry != 0);
    result
}

/// Decimal adjust after addition.
pub fn daa(psw: &mut Psw, value: u8) -> u8 {
    let low = value & 0x0F;
    let mut adjust = 0u8;
    let mut carry = psw.contains(Psw::C);
    if psw.contains(Psw::HC) || low > 9 {
        adjust |= 0x06;
    }
    if carry || value > 0x99 {
        adjust |= 0x60;
        carry = true;
    }
    let result = value.wrapping_add(adjust);
    psw.set(Psw::HC, low + (adjust & 0x0F) > 0x0F);
    psw.set(Psw::C, carry);
    set_zs(psw, result as u32, 8, false);
    result
}

/// Decimal adjust after subtraction.
pub fn das(psw: &mut Psw, value: u8) -> u8 {
    let low = value & 0x0F;
    let mut adjust = 0u8;
    let mut carry = psw.contains(Psw::C);
    if psw.contains(Psw::HC) || low > 9 {
        adjust |= 0x06;
    }
    if carry || value > 0x99 {
        adjust |= 0x60;
        carry = true;
    }
    let result = value.wrapping_sub(adjust);
    psw.set(Psw::HC, low < (adjust & 0x0F));
    psw.set(Psw::C, carry);
    set_zs(psw, result as u32, 8, false);
    result
}
