use crate::bitreader::{self, BitReader};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // crate
    #[error(transparent)]
    BitReader(#[from] bitreader::Error),
    // mod
    #[error("field range multiplier collapsed to zero")]
    ZeroRangeMultiplier,
    #[error("unable to represent the field range within {0} bits")]
    UnrepresentableRange(i32),
}

pub type Result<T> = std::result::Result<T, Error>;

const QFE_ROUNDDOWN: i32 = 1 << 0;
const QFE_ROUNDUP: i32 = 1 << 1;
const QFE_ENCODE_ZERO_EXACTLY: i32 = 1 << 2;
const QFE_ENCODE_INTEGERS_EXACTLY: i32 = 1 << 3;

/// Decoder for CNetworkedQuantizedFloat-style fields: a value quantized into
/// `bit_count` steps over `[low_value, high_value]`, with optional exact
/// encodings for the bounds, zero and integers selected by the encode flags.
#[derive(Debug, Clone)]
pub struct QuantizedFloat {
    bit_count: i32,
    low_value: f32,
    high_value: f32,

    flags: i32,
    decode_multiplier: f32,
}

impl QuantizedFloat {
    pub fn new(bit_count: i32, encode_flags: i32, low_value: f32, high_value: f32) -> Result<Self> {
        let mut qf = Self {
            bit_count,
            low_value,
            high_value,
            flags: validate_flags(encode_flags, low_value, high_value),
            decode_multiplier: 0.0,
        };
        qf.initialize()?;
        Ok(qf)
    }

    fn initialize(&mut self) -> Result<()> {
        let mut quanta = 1u64 << self.bit_count;

        if self.flags & QFE_ROUNDDOWN != 0 {
            let offset = (self.high_value - self.low_value) / quanta as f32;
            self.high_value -= offset;
        } else if self.flags & QFE_ROUNDUP != 0 {
            let offset = (self.high_value - self.low_value) / quanta as f32;
            self.low_value += offset;
        }

        if self.flags & QFE_ENCODE_INTEGERS_EXACTLY != 0 {
            let delta = (self.high_value as i32 - self.low_value as i32).max(1);
            let true_range = 1u64 << bits_needed_for(delta as i64);

            let mut n_bits = self.bit_count;
            while (1u64 << n_bits) < true_range {
                n_bits += 1;
            }
            if n_bits > self.bit_count {
                self.bit_count = n_bits;
                quanta = 1u64 << self.bit_count;
            }

            let float_range = true_range as f32;
            let offset = float_range / quanta as f32;
            self.high_value = self.low_value + float_range - offset;
        }

        let high_low_multiplier =
            assign_range_multiplier(self.bit_count, self.high_value - self.low_value)?;
        if high_low_multiplier == 0.0 {
            return Err(Error::ZeroRangeMultiplier);
        }
        self.decode_multiplier = 1.0 / (quanta - 1) as f32;

        // if one of the special encodings already falls on a representable
        // quantum the flag is redundant and the encoder drops its marker bit
        if self.flags & QFE_ROUNDDOWN != 0
            && self.quantize(self.low_value, high_low_multiplier) == self.low_value
        {
            self.flags &= !QFE_ROUNDDOWN;
        }
        if self.flags & QFE_ROUNDUP != 0
            && self.quantize(self.high_value, high_low_multiplier) == self.high_value
        {
            self.flags &= !QFE_ROUNDUP;
        }
        if self.flags & QFE_ENCODE_ZERO_EXACTLY != 0
            && self.quantize(0.0, high_low_multiplier) == 0.0
        {
            self.flags &= !QFE_ENCODE_ZERO_EXACTLY;
        }

        Ok(())
    }

    fn quantize(&self, value: f32, high_low_multiplier: f32) -> f32 {
        if value < self.low_value {
            return self.low_value;
        }
        if value > self.high_value {
            return self.high_value;
        }

        let i = ((value - self.low_value) * high_low_multiplier) as i32;
        self.low_value + (self.high_value - self.low_value) * (i as f32 * self.decode_multiplier)
    }

    pub fn decode(&self, br: &mut BitReader) -> Result<f32> {
        if self.flags & QFE_ROUNDDOWN != 0 && br.read_bool()? {
            return Ok(self.low_value);
        }
        if self.flags & QFE_ROUNDUP != 0 && br.read_bool()? {
            return Ok(self.high_value);
        }
        if self.flags & QFE_ENCODE_ZERO_EXACTLY != 0 && br.read_bool()? {
            return Ok(0.0);
        }
        let v = br.read_ubit32(self.bit_count as usize)?;
        Ok(self.low_value + (self.high_value - self.low_value) * v as f32 * self.decode_multiplier)
    }
}

fn validate_flags(mut flags: i32, low_value: f32, high_value: f32) -> i32 {
    // when a bound is exactly zero and encoded exactly, the zero flag is moot
    if (low_value == 0.0 && flags & QFE_ROUNDDOWN != 0)
        || (high_value == 0.0 && flags & QFE_ROUNDUP != 0)
    {
        flags &= !QFE_ENCODE_ZERO_EXACTLY;
    }

    // encode-zero on a zero bound degenerates into encoding that bound
    if low_value == 0.0 && flags & QFE_ENCODE_ZERO_EXACTLY != 0 {
        flags |= QFE_ROUNDDOWN;
        flags &= !QFE_ENCODE_ZERO_EXACTLY;
    }
    if high_value == 0.0 && flags & QFE_ENCODE_ZERO_EXACTLY != 0 {
        flags |= QFE_ROUNDUP;
        flags &= !QFE_ENCODE_ZERO_EXACTLY;
    }

    // a range that doesn't span zero can't encode zero specially
    if !(low_value < 0.0 && high_value > 0.0) {
        flags &= !QFE_ENCODE_ZERO_EXACTLY;
    }

    if flags & QFE_ENCODE_INTEGERS_EXACTLY != 0 {
        flags &= !(QFE_ROUNDUP | QFE_ROUNDDOWN | QFE_ENCODE_ZERO_EXACTLY);
    }

    flags
}

// AssignRangeMultiplier from public/dt_send.cpp
fn assign_range_multiplier(n_bits: i32, range: f32) -> Result<f32> {
    let high_value: u32 = if n_bits == 32 {
        0xFFFFFFFE
    } else {
        (1u32 << n_bits) - 1
    };

    let mut high_low_mul = if range.abs() <= 0.001 {
        high_value as f32
    } else {
        high_value as f32 / range
    };

    // squeeze the multiplier down until the highest value quantizes into range
    if high_low_mul * range > high_value as f32 {
        const MULTIPLIERS: [f32; 5] = [0.9999, 0.99, 0.9, 0.8, 0.7];
        let mut fixed = false;
        for multiplier in MULTIPLIERS {
            high_low_mul = (high_value as f32 / range) * multiplier;
            if high_low_mul * range <= high_value as f32 {
                fixed = true;
                break;
            }
        }
        if !fixed {
            return Err(Error::UnrepresentableRange(n_bits));
        }
    }

    Ok(high_low_mul)
}

fn bits_needed_for(x: i64) -> i32 {
    if x == 0 {
        return 0;
    }
    64 - (x as u64).leading_zeros() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_range() {
        // 8 bits over [0, 255]: the quantum grid lands on integers
        let qf = QuantizedFloat::new(8, 0, 0.0, 255.0).unwrap();

        let buf = [128u8];
        let mut br = BitReader::new(&buf);
        let v = qf.decode(&mut br).unwrap();
        assert!((v - 128.0).abs() < 0.01, "got {v}");
    }

    #[test]
    fn test_rounddown_low_bound_is_exact() {
        // the low bound always lands on quantum zero, so the encoder drops
        // the round-down marker bit and the quantum is read directly
        let qf = QuantizedFloat::new(10, QFE_ROUNDDOWN, 1.0, 100.0).unwrap();

        let buf = [0u8, 0];
        let mut br = BitReader::new(&buf);
        assert_eq!(qf.decode(&mut br).unwrap(), 1.0);
        assert_eq!(br.pos(), 10);
    }

    #[test]
    fn test_zero_bit_range_is_rejected() {
        assert!(QuantizedFloat::new(0, 0, 0.0, 1.0).is_err());
    }
}
