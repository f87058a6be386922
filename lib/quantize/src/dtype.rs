use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpType {
    pub sign: bool,
    pub exponent: u8,
    pub mantissa: u8,
}

const fn mask(x: u8) -> u32 {
    ((1u64 << x) - 1) as _
}

/// Count leading zeros in an n-bit value (not the full 32-bit value)
const fn clz_n(val: u32, n: u8) -> u8 {
    if val == 0 {
        n
    } else {
        (n as u32 - (32 - val.leading_zeros())) as u8
    }
}

impl FpType {
    pub const F16: Self = FpType {
        sign: true,
        exponent: 5,
        mantissa: 10,
    };

    /// Truncated-precision float: the upper half of an `F32`.
    pub const BF16: Self = FpType {
        sign: true,
        exponent: 8,
        mantissa: 7,
    };

    pub const F32: Self = FpType {
        sign: true,
        exponent: 8,
        mantissa: 23,
    };

    pub const fn size_in_bits(self) -> u8 {
        self.sign as u8 + self.exponent + self.mantissa
    }

    const fn bias(self) -> i32 {
        (mask(self.exponent) >> 1) as i32
    }

    /// Widen a bit pattern of this type into an `F32` bit pattern.
    ///
    /// The conversion is exact for every type with at most 8 exponent bits and 23 mantissa bits. Subnormal
    /// sources are normalized when `F32` has the wider exponent range, infinities and NaNs keep their sign and
    /// (shifted) payload.
    pub const fn widen_to_f32_bits(self, bits: u32) -> u32 {
        assert!(self.exponent <= 8 && self.mantissa <= 23);

        let sign = if self.sign {
            (bits >> (self.exponent + self.mantissa)) & 1
        } else {
            0
        };

        let mantissa_bits = bits & mask(self.mantissa);
        let exponent_mask = mask(self.exponent);
        let exponent = (bits >> self.mantissa) & exponent_mask;
        let shift = 23 - self.mantissa;

        let (converted_exponent, converted_mantissa) = match exponent {
            0 if mantissa_bits == 0 => (0, 0),
            // Same exponent range, so a subnormal stays subnormal.
            0 if self.exponent == 8 => (0, mantissa_bits << shift),
            0 => {
                // value = mantissa * 2^(1 - bias - m); move the leading one into the implicit bit.
                let normalize_shift = clz_n(mantissa_bits, self.mantissa) + 1;
                let unbiased = 1 - self.bias() - normalize_shift as i32;
                let normalized = (mantissa_bits << normalize_shift) & mask(self.mantissa);
                ((unbiased + 127) as u32, normalized << shift)
            }
            _ if exponent == exponent_mask => (0xFF, mantissa_bits << shift),
            _ => (
                (exponent as i32 - self.bias() + 127) as u32,
                mantissa_bits << shift,
            ),
        };

        sign << 31 | converted_exponent << 23 | converted_mantissa
    }

    /// Convert bits to f32. Only lower `size_in_bits()` bits are used.
    pub const fn convert_bits_to_f32(self, bits: u32) -> f32 {
        f32::from_bits(self.widen_to_f32_bits(bits & mask(self.size_in_bits())))
    }

    /// Convert f32 to bits, rounding to nearest even.
    ///
    /// Returns `None` for types without a narrowing implementation (anything other than `F32`, `BF16`, `F16`).
    pub fn bits_from_f32(self, float: f32) -> Option<u32> {
        match self {
            Self::F32 => Some(float.to_bits()),
            Self::BF16 => Some(half::bf16::from_f32(float).to_bits() as u32),
            Self::F16 => Some(half::f16::from_f32(float).to_bits() as u32),
            _ => None,
        }
    }
}

/// Decode a truncated-precision float pattern. Lossless: the low 16 mantissa bits are zero by definition.
pub const fn bf16_to_f32(pattern: u16) -> f32 {
    FpType::BF16.convert_bits_to_f32(pattern as u32)
}

#[test]
fn test_f32() {
    let ty = FpType::F32;

    assert_eq!(ty.convert_bits_to_f32(0f32.to_bits()), 0f32);
    assert_eq!(ty.convert_bits_to_f32(1f32.to_bits()), 1f32);
    assert_eq!(
        ty.convert_bits_to_f32(f32::INFINITY.to_bits()),
        f32::INFINITY
    );
    assert_eq!(
        ty.convert_bits_to_f32(f32::NEG_INFINITY.to_bits()),
        f32::NEG_INFINITY
    );
    assert_eq!(
        ty.widen_to_f32_bits(f32::MIN_POSITIVE.to_bits() >> 1),
        f32::MIN_POSITIVE.to_bits() >> 1
    );
}

#[test]
fn test_bf16_constants() {
    assert_eq!(bf16_to_f32(0x0000), 0.0);
    assert_eq!(bf16_to_f32(0x3F80), 1.0);
    assert_eq!(bf16_to_f32(0xBF80), -1.0);
    assert_eq!(bf16_to_f32(0x4049), 3.140625);
    assert_eq!(bf16_to_f32(0x7F80), f32::INFINITY);
    assert_eq!(bf16_to_f32(0xFF80), f32::NEG_INFINITY);
    assert!(bf16_to_f32(0x7FC0).is_nan());
    assert_eq!(bf16_to_f32(0x8000).to_bits(), 0x8000_0000);
}

#[test]
fn test_bf16_is_zero_extension() {
    for pattern in 0..=u16::MAX {
        assert_eq!(bf16_to_f32(pattern).to_bits(), (pattern as u32) << 16);
        assert_eq!(
            bf16_to_f32(pattern).to_bits(),
            half::bf16::from_bits(pattern).to_f32().to_bits(),
            "pattern {pattern:#06x}"
        );
    }
}

#[test]
fn test_f16() {
    use half::f16;

    let ty = FpType::F16;

    assert_eq!(ty.convert_bits_to_f32(f16::ZERO.to_bits() as u32), 0f32);
    assert_eq!(ty.convert_bits_to_f32(f16::ONE.to_bits() as u32), 1f32);
    assert_eq!(
        ty.convert_bits_to_f32(f16::INFINITY.to_bits() as u32),
        f32::INFINITY
    );
    assert_eq!(
        ty.convert_bits_to_f32(f16::NEG_INFINITY.to_bits() as u32),
        f32::NEG_INFINITY
    );

    for bits in 0..=u16::MAX {
        let expected = f16::from_bits(bits).to_f32();
        let actual = ty.convert_bits_to_f32(bits as u32);
        if expected.is_nan() {
            assert!(actual.is_nan(), "pattern {bits:#06x}");
        } else {
            assert_eq!(actual.to_bits(), expected.to_bits(), "pattern {bits:#06x}");
        }
    }
}

#[test]
fn test_e4m3_subnormal() {
    // E4M3: bias 7, subnormal value = (mantissa / 8) * 2^(1 - 7).
    let ty = FpType {
        sign: true,
        exponent: 4,
        mantissa: 3,
    };

    assert_eq!(ty.convert_bits_to_f32(0x07), 0.875 * 2f32.powi(-6));
    assert_eq!(ty.convert_bits_to_f32(0x87), -0.875 * 2f32.powi(-6));
    assert_eq!(ty.convert_bits_to_f32(0x01), 0.125 * 2f32.powi(-6));
    assert_eq!(ty.convert_bits_to_f32(0x04), 0.5 * 2f32.powi(-6));
    assert_eq!(ty.convert_bits_to_f32(0x00), 0.0);

    assert_eq!(ty.convert_bits_to_f32(0x38), 1.0);
    assert_eq!(ty.convert_bits_to_f32(0x3F), 1.875);
}

#[test]
fn test_narrowing_rounds_to_nearest_even() {
    assert_eq!(FpType::BF16.bits_from_f32(1.0), Some(0x3F80));
    assert_eq!(FpType::BF16.bits_from_f32(30.0), Some(0x41F0));
    // 1 + 2^-8 is halfway between two BF16 values and rounds to the even one.
    assert_eq!(FpType::BF16.bits_from_f32(1.0 + 2f32.powi(-8)), Some(0x3F80));
    assert_eq!(FpType::F16.bits_from_f32(1.0), Some(0x3C00));
    assert_eq!(FpType::F32.bits_from_f32(2.5), Some(2.5f32.to_bits()));
    assert_eq!(
        FpType {
            sign: true,
            exponent: 4,
            mantissa: 3
        }
        .bits_from_f32(1.0),
        None
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntType {
    pub width: u32,
    pub signed: bool,
}

impl IntType {
    pub const I8: Self = IntType {
        width: 8,
        signed: true,
    };

    const fn mask(self) -> u32 {
        if self.width >= 32 {
            0xFFFFFFFFu32
        } else {
            ((1u64 << self.width) - 1) as u32
        }
    }

    /// Saturates at `u8::MAX`, so an oversized width never wraps into a valid one.
    pub const fn size_in_bits(self) -> u8 {
        if self.width > u8::MAX as u32 {
            u8::MAX
        } else {
            self.width as u8
        }
    }

    /// Smallest and largest representable value.
    pub const fn range(self) -> (i64, i64) {
        if self.signed {
            (-(1i64 << (self.width - 1)), (1i64 << (self.width - 1)) - 1)
        } else {
            (0, (1i64 << self.width) - 1)
        }
    }

    /// Two's-complement bits of `value`, clamped into range first.
    pub const fn bits_from_i64(self, value: i64) -> u32 {
        let (min, max) = self.range();
        let clamped = if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        };
        (clamped as u32) & self.mask()
    }

    /// Interpret bits as an integer, sign-extending signed types.
    pub const fn convert_bits_to_i64(self, bits: u32) -> i64 {
        let masked_bits = bits & self.mask();
        if self.signed && (masked_bits >> (self.width - 1)) & 1 == 1 {
            masked_bits as i64 - (1i64 << self.width)
        } else {
            masked_bits as i64
        }
    }
}

#[test]
fn test_int8_twos_complement() {
    let ty = IntType::I8;

    assert_eq!(ty.range(), (-128, 127));
    assert_eq!(ty.bits_from_i64(-1), 0xFF);
    assert_eq!(ty.bits_from_i64(-10), 0xF6);
    assert_eq!(ty.bits_from_i64(127), 0x7F);
    assert_eq!(ty.bits_from_i64(300), 0x7F);
    assert_eq!(ty.bits_from_i64(-300), 0x80);
    assert_eq!(ty.convert_bits_to_i64(0xF6), -10);
    assert_eq!(ty.convert_bits_to_i64(0x180), -128);
    assert_eq!(ty.convert_bits_to_i64(0x80), -128);

    let unsigned = IntType {
        width: 8,
        signed: false,
    };
    assert_eq!(unsigned.convert_bits_to_i64(0xF6), 246);

    let oversized = IntType {
        width: 264,
        signed: true,
    };
    assert_eq!(oversized.size_in_bits(), u8::MAX);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Fp(FpType),
    Int(IntType),
}

impl From<FpType> for DataType {
    fn from(value: FpType) -> Self {
        Self::Fp(value)
    }
}

impl From<IntType> for DataType {
    fn from(value: IntType) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DataType::Fp(FpType::BF16) => write!(f, "bf16"),
            DataType::Fp(FpType::F16) => write!(f, "f16"),
            DataType::Fp(FpType::F32) => write!(f, "f32"),
            DataType::Fp(FpType { exponent, mantissa, .. }) => {
                write!(f, "e{exponent}m{mantissa}")
            }
            DataType::Int(IntType { width, signed: true }) => write!(f, "int{width}"),
            DataType::Int(IntType { width, signed: false }) => write!(f, "uint{width}"),
        }
    }
}
