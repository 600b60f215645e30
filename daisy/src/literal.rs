//! Typed integer and floating-point constants with Daisy promotion rules.
//!
//! The operands of a binary operation are promoted to the higher ranked of
//! their two types, in the order `i8 < u8 < i16 < u16 < i32 < u32 < i64 <
//! u64`. Values are stored in 64 bits and normalized after every
//! operation, sign-extended for signed types and masked for unsigned ones,
//! so arithmetic wraps at the declared width.

use std::cmp::Ordering;
use std::fmt;
use std::ops;

use thiserror::Error;

/// Width and signedness of an integer constant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntegerType {
    /// 8-bit signed
    I8 = 0,
    /// 16-bit signed
    I16 = 1,
    /// 32-bit signed
    I32 = 3,
    /// 64-bit signed
    I64 = 7,
    /// 8-bit unsigned
    U8 = 8,
    /// 16-bit unsigned
    U16 = 9,
    /// 32-bit unsigned
    U32 = 11,
    /// 64-bit unsigned
    U64 = 15,
}

const UNSIGNED_BIT: u8 = 8;
const WIDTH_MASK: u8 = 7;

impl IntegerType {
    const fn rank(self) -> u8 {
        match self {
            Self::I8 => 0,
            Self::U8 => 1,
            Self::I16 => 2,
            Self::U16 => 3,
            Self::I32 => 4,
            Self::U32 => 5,
            Self::I64 => 6,
            Self::U64 => 7,
        }
    }

    /// The common type of a binary operation: the higher ranked operand type
    #[must_use]
    pub const fn promote(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Whether values of this type are signed
    #[must_use]
    pub const fn is_signed(self) -> bool {
        self as u8 & UNSIGNED_BIT == 0
    }

    /// Width in bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self as u8 & WIDTH_MASK {
            0 => 8,
            1 => 16,
            3 => 32,
            _ => 64,
        }
    }

    /// The type's Daisy spelling, also used as a literal suffix
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            _ => return None,
        })
    }

    /// Largest magnitude a literal of this type may spell
    const fn max_literal(self) -> u64 {
        if self.is_signed() {
            (1u64 << (self.bits() - 1)) - 1
        } else if self.bits() == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits()) - 1
        }
    }

    const fn normalize(self, v: u64) -> u64 {
        let bits = self.bits();
        if bits == 64 {
            return v;
        }
        let shift = 64 - bits;
        if self.is_signed() {
            (((v << shift) as i64) >> shift) as u64
        } else {
            v & ((1u64 << bits) - 1)
        }
    }
}

impl fmt::Display for IntegerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors produced while converting a numeric literal to a constant
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LiteralError {
    /// The value does not fit any integer type
    #[error("integer literal is too large to be represented in any integer type")]
    TooLarge,
    /// The value does not fit any signed integer type
    #[error("integer literal is too large to be represented in a signed integer type")]
    TooLargeSigned,
    /// The value does not fit the type named by its suffix
    #[error("integer literal is too large to be represented in `{0}` type")]
    TooLargeFor(IntegerType),
    /// The literal has a suffix that names no type
    #[error("invalid suffix `{0}` on numeric literal")]
    InvalidSuffix(String),
    /// The literal has no digits
    #[error("malformed numeric literal")]
    Malformed,
}

/// A typed integer constant
#[derive(Clone, Copy, Debug)]
pub struct IntegerConst {
    ty: IntegerType,
    bits: u64,
}

impl Default for IntegerConst {
    fn default() -> Self {
        Self::new(IntegerType::I32, 0)
    }
}

impl IntegerConst {
    /// A constant of type `ty` from raw bits, truncated to the type's width
    #[must_use]
    pub const fn new(ty: IntegerType, bits: u64) -> Self {
        Self {
            ty,
            bits: ty.normalize(bits),
        }
    }

    /// A signed constant
    #[must_use]
    pub const fn from_i64(ty: IntegerType, v: i64) -> Self {
        Self::new(ty, v as u64)
    }

    /// Parse the digits of a literal in `base` followed by an optional type suffix.
    ///
    /// Without a suffix a decimal literal takes the first of `i32`, `u32`,
    /// `i64`, `u64` that holds it; other bases prefer unsigned types. A bare
    /// `i` suffix selects `i32` or `i64` and a bare `u` suffix `u32` or `u64`.
    ///
    /// # Errors
    /// Returns [`LiteralError`] when the value does not fit the selected type
    /// or the suffix is unknown.
    pub fn from_str_radix(text: &str, base: u32) -> Result<Self, LiteralError> {
        let digits_len = text
            .bytes()
            .take_while(|b| char::from(*b).is_digit(base))
            .count();
        if digits_len == 0 {
            return Err(LiteralError::Malformed);
        }

        let (digits, suffix) = text.split_at(digits_len);
        let mut v: u64 = 0;
        for d in digits.chars().filter_map(|c| c.to_digit(base)) {
            v = v
                .checked_mul(u64::from(base))
                .and_then(|v| v.checked_add(u64::from(d)))
                .ok_or(LiteralError::TooLarge)?;
        }

        let fits = |ty: IntegerType| v <= ty.max_literal();
        let pick = |candidates: &[IntegerType]| candidates.iter().copied().find(|ty| fits(*ty));

        let ty = match suffix {
            "" if base == 10 => pick(&[
                IntegerType::I32,
                IntegerType::U32,
                IntegerType::I64,
                IntegerType::U64,
            ])
            .ok_or(LiteralError::TooLarge)?,
            "" => pick(&[IntegerType::U32, IntegerType::U64]).ok_or(LiteralError::TooLarge)?,
            "i" => pick(&[IntegerType::I32, IntegerType::I64]).ok_or(LiteralError::TooLargeSigned)?,
            "u" => pick(&[IntegerType::U32, IntegerType::U64]).ok_or(LiteralError::TooLarge)?,
            _ => {
                let ty = IntegerType::from_suffix(suffix)
                    .ok_or_else(|| LiteralError::InvalidSuffix(suffix.to_owned()))?;
                if !fits(ty) {
                    return Err(LiteralError::TooLargeFor(ty));
                }
                ty
            }
        };

        Ok(Self::new(ty, v))
    }

    /// The constant's type
    #[must_use]
    pub const fn ty(self) -> IntegerType {
        self.ty
    }

    /// Whether the type is signed
    #[must_use]
    pub const fn is_signed(self) -> bool {
        self.ty.is_signed()
    }

    /// Whether the value is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.bits == 0
    }

    /// The value as a signed 64-bit integer
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.bits as i64
    }

    /// The value as an unsigned 64-bit integer
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.bits
    }

    /// Reinterpret the value as another type
    #[must_use]
    pub const fn convert(self, ty: IntegerType) -> Self {
        Self::new(ty, self.bits)
    }

    fn promoted(self, rhs: Self) -> (IntegerType, Self, Self) {
        let ty = self.ty.promote(rhs.ty);
        (ty, self.convert(ty), rhs.convert(ty))
    }

    fn binary(self, rhs: Self, signed: fn(i64, i64) -> i64, unsigned: fn(u64, u64) -> u64) -> Self {
        let (ty, a, b) = self.promoted(rhs);
        if ty.is_signed() {
            Self::from_i64(ty, signed(a.as_i64(), b.as_i64()))
        } else {
            Self::new(ty, unsigned(a.bits, b.bits))
        }
    }

    /// Division that returns `None` for a zero divisor
    #[must_use]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        (!rhs.is_zero()).then(|| self.binary(rhs, i64::wrapping_div, |a, b| a / b))
    }

    /// Remainder that returns `None` for a zero divisor
    #[must_use]
    pub fn checked_rem(self, rhs: Self) -> Option<Self> {
        (!rhs.is_zero()).then(|| self.binary(rhs, i64::wrapping_rem, |a, b| a % b))
    }
}

impl fmt::Display for IntegerConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_signed() {
            write!(f, "{}", self.as_i64())
        } else {
            write!(f, "{}", self.bits)
        }
    }
}

impl PartialEq for IntegerConst {
    fn eq(&self, other: &Self) -> bool {
        let (_, a, b) = self.promoted(*other);
        a.bits == b.bits
    }
}

impl PartialOrd for IntegerConst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (ty, a, b) = self.promoted(*other);
        Some(if ty.is_signed() {
            a.as_i64().cmp(&b.as_i64())
        } else {
            a.bits.cmp(&b.bits)
        })
    }
}

impl ops::Neg for IntegerConst {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(self.ty, self.bits.wrapping_neg())
    }
}

impl ops::Not for IntegerConst {
    type Output = Self;

    fn not(self) -> Self {
        Self::new(self.ty, !self.bits)
    }
}

impl ops::Add for IntegerConst {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, i64::wrapping_add, u64::wrapping_add)
    }
}

impl ops::Sub for IntegerConst {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, i64::wrapping_sub, u64::wrapping_sub)
    }
}

impl ops::Mul for IntegerConst {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, i64::wrapping_mul, u64::wrapping_mul)
    }
}

impl ops::Div for IntegerConst {
    type Output = Self;

    /// # Panics
    /// Panics if `rhs` is zero, like primitive integer division.
    fn div(self, rhs: Self) -> Self {
        self.binary(rhs, i64::wrapping_div, |a, b| a / b)
    }
}

impl ops::Rem for IntegerConst {
    type Output = Self;

    /// # Panics
    /// Panics if `rhs` is zero, like primitive integer remainder.
    fn rem(self, rhs: Self) -> Self {
        self.binary(rhs, i64::wrapping_rem, |a, b| a % b)
    }
}

impl ops::BitAnd for IntegerConst {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a & b, |a, b| a & b)
    }
}

impl ops::BitOr for IntegerConst {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a | b, |a, b| a | b)
    }
}

impl ops::BitXor for IntegerConst {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a ^ b, |a, b| a ^ b)
    }
}

/// Shift amounts at or beyond 64 shift every bit out.
impl ops::Shl for IntegerConst {
    type Output = Self;

    fn shl(self, rhs: Self) -> Self {
        let (ty, a, b) = self.promoted(rhs);
        let bits = if b.bits >= 64 { 0 } else { a.bits << b.bits };
        Self::new(ty, bits)
    }
}

/// Signed operands shift arithmetically; amounts at or beyond 64 leave only the sign fill.
impl ops::Shr for IntegerConst {
    type Output = Self;

    fn shr(self, rhs: Self) -> Self {
        let (ty, a, b) = self.promoted(rhs);
        let amount = u32::try_from(b.bits.min(63)).unwrap_or(63);
        if ty.is_signed() {
            Self::from_i64(ty, a.as_i64() >> amount)
        } else if b.bits >= 64 {
            Self::new(ty, 0)
        } else {
            Self::new(ty, a.bits >> amount)
        }
    }
}

/// Width of a floating-point constant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatType {
    /// 32-bit
    F32,
    /// 64-bit
    F64,
}

/// A typed floating-point constant; mixed arithmetic promotes to `f64`
#[derive(Clone, Copy, Debug)]
pub enum FloatConst {
    /// 32-bit value
    F32(f32),
    /// 64-bit value
    F64(f64),
}

impl Default for FloatConst {
    fn default() -> Self {
        Self::F32(0.0)
    }
}

impl FloatConst {
    /// Parse a float literal; an `f` or `f32` suffix selects `f32`, anything else `f64`.
    ///
    /// # Errors
    /// Returns [`LiteralError::Malformed`] if the digits do not form a number.
    pub fn parse(text: &str) -> Result<Self, LiteralError> {
        if let Some(digits) = text.strip_suffix("f32").or_else(|| text.strip_suffix('f')) {
            return digits
                .parse::<f32>()
                .map(Self::F32)
                .map_err(|_| LiteralError::Malformed);
        }
        let digits = text.strip_suffix("f64").unwrap_or(text);
        digits
            .parse::<f64>()
            .map(Self::F64)
            .map_err(|_| LiteralError::Malformed)
    }

    /// The constant's type
    #[must_use]
    pub const fn ty(self) -> FloatType {
        match self {
            Self::F32(_) => FloatType::F32,
            Self::F64(_) => FloatType::F64,
        }
    }

    /// The value widened to `f64`
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }

    /// Whether the value is (positive or negative) zero
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.as_f64() == 0.0
    }

    fn binary(self, rhs: Self, f32_op: fn(f32, f32) -> f32, f64_op: fn(f64, f64) -> f64) -> Self {
        match (self, rhs) {
            (Self::F32(a), Self::F32(b)) => Self::F32(f32_op(a, b)),
            (a, b) => Self::F64(f64_op(a.as_f64(), b.as_f64())),
        }
    }
}

impl fmt::Display for FloatConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

impl PartialEq for FloatConst {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for FloatConst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl ops::Neg for FloatConst {
    type Output = Self;

    fn neg(self) -> Self {
        match self {
            Self::F32(v) => Self::F32(-v),
            Self::F64(v) => Self::F64(-v),
        }
    }
}

impl ops::Add for FloatConst {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a + b, |a, b| a + b)
    }
}

impl ops::Sub for FloatConst {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a - b, |a, b| a - b)
    }
}

impl ops::Mul for FloatConst {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a * b, |a, b| a * b)
    }
}

impl ops::Div for FloatConst {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.binary(rhs, |a, b| a / b, |a, b| a / b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(text: &str) -> IntegerConst {
        IntegerConst::from_str_radix(text, 10).unwrap()
    }

    #[test]
    fn decimal_literal_picks_smallest_fitting_type() {
        assert_eq!(int("300").ty(), IntegerType::I32);
        assert_eq!(int("2147483648").ty(), IntegerType::U32);
        assert_eq!(int("4294967296").ty(), IntegerType::I64);
        assert_eq!(int("9223372036854775808").ty(), IntegerType::U64);
        assert_eq!(
            IntegerConst::from_str_radix("18446744073709551616", 10),
            Err(LiteralError::TooLarge)
        );
    }

    #[test]
    fn non_decimal_literal_prefers_unsigned() {
        let v = IntegerConst::from_str_radix("ff", 16).unwrap();
        assert_eq!(v.ty(), IntegerType::U32);
        assert_eq!(v.as_u64(), 255);
        let v = IntegerConst::from_str_radix("100000000", 16).unwrap();
        assert_eq!(v.ty(), IntegerType::U64);
    }

    #[test]
    fn suffixes_select_and_check_type() {
        let v = int("5i64");
        assert_eq!(v.ty(), IntegerType::I64);
        assert_eq!(v.as_i64(), 5);
        assert_eq!(int("200u8").ty(), IntegerType::U8);
        assert_eq!(int("7u").ty(), IntegerType::U32);
        assert_eq!(int("3000000000i").ty(), IntegerType::I64);

        let err = IntegerConst::from_str_radix("300u8", 10).unwrap_err();
        assert_eq!(err, LiteralError::TooLargeFor(IntegerType::U8));
        assert_eq!(
            err.to_string(),
            "integer literal is too large to be represented in `u8` type"
        );
        assert_eq!(
            IntegerConst::from_str_radix("9223372036854775808i", 10),
            Err(LiteralError::TooLargeSigned)
        );
        assert_eq!(
            IntegerConst::from_str_radix("1q", 10),
            Err(LiteralError::InvalidSuffix("q".into()))
        );
    }

    #[test]
    fn arithmetic_promotes_and_wraps() {
        let a = IntegerConst::new(IntegerType::U8, 250);
        let b = IntegerConst::new(IntegerType::U8, 10);
        assert_eq!((a + b).as_u64(), 4);

        let small = IntegerConst::from_i64(IntegerType::I16, -1);
        let wide = IntegerConst::new(IntegerType::U32, 1);
        let sum = small + wide;
        assert_eq!(sum.ty(), IntegerType::U32);
        assert_eq!(sum.as_u64(), 0);

        let neg = -IntegerConst::new(IntegerType::U32, 5);
        assert_eq!(neg.ty(), IntegerType::U32);
        assert_eq!(neg.as_u64(), 0xffff_fffb);
        let neg = -IntegerConst::from_i64(IntegerType::I8, -128);
        assert_eq!(neg.as_i64(), -128);
    }

    #[test]
    fn promotion_follows_rank_order() {
        use IntegerType::*;
        assert_eq!(I64.promote(U32), I64);
        assert_eq!(U32.promote(I64), I64);
        assert_eq!(U8.promote(I16), I16);
        assert_eq!(I32.promote(U32), U32);
        assert_eq!(U64.promote(I8), U64);

        let diff = IntegerConst::new(U8, 0) - IntegerConst::new(I16, 1);
        assert_eq!(diff.ty(), I16);
        assert_eq!(diff.as_i64(), -1);
        assert!(IntegerConst::from_i64(I64, -1) < IntegerConst::new(U32, 1));
    }

    #[test]
    fn comparisons_use_promoted_signedness() {
        let minus_one = IntegerConst::from_i64(IntegerType::I32, -1);
        let zero_u = IntegerConst::new(IntegerType::U32, 0);
        let zero_i = IntegerConst::default();
        assert!(minus_one < zero_i);
        // -1 as u32 is 0xffff_ffff
        assert!(minus_one > zero_u);
        assert_eq!(IntegerConst::new(IntegerType::I8, 3), IntegerConst::new(IntegerType::U64, 3));
    }

    #[test]
    fn shifts_saturate_beyond_width() {
        let one = IntegerConst::new(IntegerType::I64, 1);
        let big = IntegerConst::new(IntegerType::I64, 70);
        assert!((one << big).is_zero());
        let minus = IntegerConst::from_i64(IntegerType::I64, -8);
        assert_eq!((minus >> big).as_i64(), -1);
        assert_eq!((minus >> IntegerConst::new(IntegerType::I64, 1)).as_i64(), -4);
    }

    #[test]
    fn division_by_zero_is_reported_by_checked_ops() {
        let seven = int("7");
        assert!(seven.checked_div(IntegerConst::default()).is_none());
        assert_eq!(seven.checked_rem(int("4")).map(IntegerConst::as_i64), Some(3));
    }

    #[test]
    fn float_suffix_selects_width() {
        assert_eq!(FloatConst::parse("1.5f").unwrap().ty(), FloatType::F32);
        assert_eq!(FloatConst::parse("1.5f32").unwrap().ty(), FloatType::F32);
        assert_eq!(FloatConst::parse("1.5").unwrap().ty(), FloatType::F64);
        assert_eq!(FloatConst::parse("2e3f64").unwrap().as_f64(), 2000.0);

        let mixed = FloatConst::F32(1.5) + FloatConst::F64(2.0);
        assert_eq!(mixed.ty(), FloatType::F64);
        assert_eq!(mixed, FloatConst::F64(3.5));
    }
}
