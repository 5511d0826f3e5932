//! Flag rules for the arithmetic and bit operations.

use super::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Registers};

impl Registers {
    fn carry_in(&self) -> u8 {
        u8::from(self.flag(FLAG_C))
    }

    /// `ADD A,v` / `ADC A,v`.
    pub(crate) fn add8(&mut self, value: u8, with_carry: bool) {
        let carry = if with_carry { self.carry_in() } else { 0 };
        let a = self.a;
        let result = a.wrapping_add(value).wrapping_add(carry);
        let half = (a & 0x0F) + (value & 0x0F) + carry > 0x0F;
        let full = u16::from(a) + u16::from(value) + u16::from(carry) > 0xFF;
        self.a = result;
        self.set_flags(result == 0, false, half, full);
    }

    /// `SUB v` / `SBC A,v`.
    pub(crate) fn sub8(&mut self, value: u8, with_carry: bool) {
        let result = self.compare(value, with_carry);
        self.a = result;
    }

    /// `CP v`: flags of `A - v` without storing it.
    pub(crate) fn cp8(&mut self, value: u8) {
        self.compare(value, false);
    }

    fn compare(&mut self, value: u8, with_carry: bool) -> u8 {
        let carry = if with_carry { self.carry_in() } else { 0 };
        let a = self.a;
        let result = a.wrapping_sub(value).wrapping_sub(carry);
        let half = (a & 0x0F) < (value & 0x0F) + carry;
        let full = u16::from(a) < u16::from(value) + u16::from(carry);
        self.set_flags(result == 0, true, half, full);
        result
    }

    pub(crate) fn and8(&mut self, value: u8) {
        self.a &= value;
        self.set_flags(self.a == 0, false, true, false);
    }

    pub(crate) fn xor8(&mut self, value: u8) {
        self.a ^= value;
        self.set_flags(self.a == 0, false, false, false);
    }

    pub(crate) fn or8(&mut self, value: u8) {
        self.a |= value;
        self.set_flags(self.a == 0, false, false, false);
    }

    /// `INC r`: carry is left alone.
    pub(crate) fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let c = self.flag(FLAG_C);
        self.set_flags(result == 0, false, value & 0x0F == 0x0F, c);
        result
    }

    /// `DEC r`: carry is left alone.
    pub(crate) fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let c = self.flag(FLAG_C);
        self.set_flags(result == 0, true, value & 0x0F == 0, c);
        result
    }

    /// `ADD HL,rr`: zero is left alone, carries come from bits 11 and 15.
    pub(crate) fn add16_hl(&mut self, value: u16) {
        let hl = self.hl();
        let result = hl.wrapping_add(value);
        let z = self.flag(FLAG_Z);
        let half = (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF;
        let full = u32::from(hl) + u32::from(value) > 0xFFFF;
        self.set_flags(z, false, half, full);
        self.h = (result >> 8) as u8;
        self.l = result as u8;
    }

    /// `SP + e8` as used by `ADD SP,e8` and `LD HL,SP+e8`. Flags come from
    /// the unsigned low-byte addition.
    pub(crate) fn add_sp_signed(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let result = sp.wrapping_add(offset as i8 as u16);
        let half = (sp & 0x000F) + (u16::from(offset) & 0x000F) > 0x000F;
        let full = (sp & 0x00FF) + u16::from(offset) > 0x00FF;
        self.set_flags(false, false, half, full);
        result
    }

    pub(crate) fn daa(&mut self) {
        let n = self.flag(FLAG_N);
        let h = self.flag(FLAG_H);
        let mut c = self.flag(FLAG_C);
        let mut a = self.a;
        if !n {
            if c || a > 0x99 {
                a = a.wrapping_add(0x60);
                c = true;
            }
            if h || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if c {
                a = a.wrapping_sub(0x60);
            }
            if h {
                a = a.wrapping_sub(0x06);
            }
        }
        self.a = a;
        self.set_flags(a == 0, n, false, c);
    }

    pub(crate) fn cpl(&mut self) {
        self.a = !self.a;
        let (z, c) = (self.flag(FLAG_Z), self.flag(FLAG_C));
        self.set_flags(z, true, true, c);
    }

    pub(crate) fn scf(&mut self) {
        let z = self.flag(FLAG_Z);
        self.set_flags(z, false, false, true);
    }

    pub(crate) fn ccf(&mut self) {
        let z = self.flag(FLAG_Z);
        let c = self.flag(FLAG_C);
        self.set_flags(z, false, false, !c);
    }

    fn shifted(&mut self, result: u8, carry: bool) -> u8 {
        self.set_flags(result == 0, false, false, carry);
        result
    }

    pub(crate) fn rlc(&mut self, v: u8) -> u8 {
        self.shifted(v.rotate_left(1), v & 0x80 != 0)
    }

    pub(crate) fn rrc(&mut self, v: u8) -> u8 {
        self.shifted(v.rotate_right(1), v & 0x01 != 0)
    }

    pub(crate) fn rl(&mut self, v: u8) -> u8 {
        let carry = self.carry_in();
        self.shifted((v << 1) | carry, v & 0x80 != 0)
    }

    pub(crate) fn rr(&mut self, v: u8) -> u8 {
        let carry = self.carry_in() << 7;
        self.shifted((v >> 1) | carry, v & 0x01 != 0)
    }

    pub(crate) fn sla(&mut self, v: u8) -> u8 {
        self.shifted(v << 1, v & 0x80 != 0)
    }

    pub(crate) fn sra(&mut self, v: u8) -> u8 {
        self.shifted((v >> 1) | (v & 0x80), v & 0x01 != 0)
    }

    pub(crate) fn swap(&mut self, v: u8) -> u8 {
        self.shifted(v.rotate_left(4), false)
    }

    pub(crate) fn srl(&mut self, v: u8) -> u8 {
        self.shifted(v >> 1, v & 0x01 != 0)
    }

    pub(crate) fn bit(&mut self, n: u8, v: u8) {
        let c = self.flag(FLAG_C);
        self.set_flags(v & (1 << (n & 7)) == 0, false, true, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs(a: u8, f: u8) -> Registers {
        let mut r = Registers::default();
        r.a = a;
        r.set_f(f);
        r
    }

    #[test]
    fn add_sets_half_and_full_carry() {
        let mut r = regs(0x3A, 0);
        r.add8(0xC6, false);
        assert_eq!(r.a, 0x00);
        assert_eq!(r.f(), FLAG_Z | FLAG_H | FLAG_C);

        let mut r = regs(0x0F, FLAG_C);
        r.add8(0x00, true);
        assert_eq!(r.a, 0x10);
        assert_eq!(r.f(), FLAG_H);
    }

    #[test]
    fn sub_and_compare_borrow() {
        let mut r = regs(0x3E, 0);
        r.sub8(0x3E, false);
        assert_eq!(r.a, 0);
        assert_eq!(r.f(), FLAG_Z | FLAG_N);

        let mut r = regs(0x3B, FLAG_C);
        r.sub8(0x2A, true);
        assert_eq!(r.a, 0x10);
        assert_eq!(r.f(), FLAG_N);

        let mut r = regs(0x3C, 0);
        r.cp8(0x40);
        assert_eq!(r.a, 0x3C);
        assert_eq!(r.f(), FLAG_N | FLAG_C);
    }

    #[test]
    fn inc_and_dec_keep_carry() {
        let mut r = regs(0, FLAG_C);
        assert_eq!(r.inc8(0x0F), 0x10);
        assert_eq!(r.f(), FLAG_H | FLAG_C);
        assert_eq!(r.inc8(0xFF), 0x00);
        assert_eq!(r.f(), FLAG_Z | FLAG_H | FLAG_C);

        let mut r = regs(0, 0);
        assert_eq!(r.dec8(0x10), 0x0F);
        assert_eq!(r.f(), FLAG_N | FLAG_H);
        assert_eq!(r.dec8(0x01), 0x00);
        assert_eq!(r.f(), FLAG_Z | FLAG_N);
    }

    #[test]
    fn add_hl_keeps_zero() {
        let mut r = regs(0, FLAG_Z);
        r.h = 0x8A;
        r.l = 0x23;
        r.add16_hl(0x8A23);
        assert_eq!(r.hl(), 0x1446);
        assert_eq!(r.f(), FLAG_Z | FLAG_H | FLAG_C);
    }

    #[test]
    fn signed_sp_offset_uses_low_byte_carries() {
        let mut r = regs(0, FLAG_Z | FLAG_N);
        r.sp = 0xFFF8;
        assert_eq!(r.add_sp_signed(0x02), 0xFFFA);
        assert_eq!(r.f(), 0);

        r.sp = 0x00FF;
        assert_eq!(r.add_sp_signed(0xFF), 0x00FE);
        assert_eq!(r.f(), FLAG_H | FLAG_C);
    }

    #[test]
    fn daa_adjusts_bcd() {
        let mut r = regs(0x45, 0);
        r.add8(0x38, false);
        r.daa();
        assert_eq!(r.a, 0x83);
        assert!(!r.flag(FLAG_C));

        let mut r = regs(0x83, 0);
        r.sub8(0x38, false);
        r.daa();
        assert_eq!(r.a, 0x45);

        let mut r = regs(0x99, 0);
        r.add8(0x01, false);
        r.daa();
        assert_eq!(r.a, 0x00);
        assert_eq!(r.f(), FLAG_Z | FLAG_C);
    }

    #[test]
    fn rotates_and_shifts() {
        let mut r = regs(0, FLAG_C);
        assert_eq!(r.rl(0x80), 0x01);
        assert_eq!(r.f(), FLAG_C);
        assert_eq!(r.rr(0x01), 0x80);
        assert_eq!(r.sra(0x81), 0xC0);
        assert_eq!(r.srl(0x01), 0x00);
        assert_eq!(r.f(), FLAG_Z | FLAG_C);
        assert_eq!(r.swap(0xF1), 0x1F);
        assert_eq!(r.f(), 0);
    }

    #[test]
    fn bit_test_sets_half_carry() {
        let mut r = regs(0, FLAG_C);
        r.bit(7, 0x7F);
        assert_eq!(r.f(), FLAG_Z | FLAG_H | FLAG_C);
        r.bit(0, 0x01);
        assert_eq!(r.f(), FLAG_H | FLAG_C);
    }
}
