//! Rencode encoder choosing the most compact form for each value

use super::{
    CHR_DICT, CHR_FALSE, CHR_FLOAT32, CHR_FLOAT64, CHR_INT, CHR_INT1, CHR_INT2, CHR_INT4,
    CHR_INT8, CHR_LIST, CHR_NONE, CHR_TERM, CHR_TRUE, DICT_FIXED_COUNT, DICT_FIXED_START,
    EncodeError, INT_NEG_FIXED_COUNT, INT_NEG_FIXED_START, INT_POS_FIXED_COUNT,
    INT_POS_FIXED_START, LIST_FIXED_COUNT, LIST_FIXED_START, MAX_DEPTH, MAX_INT_LENGTH,
    STR_FIXED_COUNT, STR_FIXED_START, Value,
};

/// Wire width used for floats.
///
/// Deluge peers accept both; 32-bit is the conventional default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatWidth {
    #[default]
    Bits32,
    Bits64,
}

/// Encodes `value` with 32-bit floats.
///
/// # Errors
///
/// - `EncodeError::IntegerOverflow` - If an integer needs 64 or more decimal digits
/// - `EncodeError::NestingTooDeep` - If containers nest beyond the depth limit
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    encode_with(value, FloatWidth::default())
}

/// Encodes `value` using the given float width.
///
/// # Errors
///
/// - `EncodeError::IntegerOverflow` - If an integer needs 64 or more decimal digits
/// - `EncodeError::NestingTooDeep` - If containers nest beyond the depth limit
pub fn encode_with(value: &Value, float_width: FloatWidth) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    Encoder { float_width }.write_value(value, &mut out, 0)?;
    Ok(out)
}

struct Encoder {
    float_width: FloatWidth,
}

impl Encoder {
    fn write_value(
        &self,
        value: &Value,
        out: &mut Vec<u8>,
        depth: usize,
    ) -> Result<(), EncodeError> {
        match value {
            Value::Int(number) => write_int(*number, out),
            Value::Float(number) => {
                self.write_float(*number, out);
                Ok(())
            }
            Value::Str(text) => {
                write_bytes(text.as_bytes(), out);
                Ok(())
            }
            Value::Bytes(bytes) => {
                write_bytes(bytes, out);
                Ok(())
            }
            Value::Bool(flag) => {
                out.push(if *flag { CHR_TRUE } else { CHR_FALSE });
                Ok(())
            }
            Value::Null => {
                out.push(CHR_NONE);
                Ok(())
            }
            Value::List(items) => {
                let depth = enter(depth)?;
                if items.len() < LIST_FIXED_COUNT {
                    out.push(LIST_FIXED_START + items.len() as u8);
                    for item in items {
                        self.write_value(item, out, depth)?;
                    }
                } else {
                    out.push(CHR_LIST);
                    for item in items {
                        self.write_value(item, out, depth)?;
                    }
                    out.push(CHR_TERM);
                }
                Ok(())
            }
            Value::Map(entries) => {
                let depth = enter(depth)?;
                let fixed = entries.len() < DICT_FIXED_COUNT;
                out.push(if fixed {
                    DICT_FIXED_START + entries.len() as u8
                } else {
                    CHR_DICT
                });
                for (key, entry) in entries {
                    self.write_value(key, out, depth)?;
                    self.write_value(entry, out, depth)?;
                }
                if !fixed {
                    out.push(CHR_TERM);
                }
                Ok(())
            }
        }
    }

    fn write_float(&self, number: f64, out: &mut Vec<u8>) {
        match self.float_width {
            FloatWidth::Bits32 => {
                out.push(CHR_FLOAT32);
                out.extend_from_slice(&(number as f32).to_be_bytes());
            }
            FloatWidth::Bits64 => {
                out.push(CHR_FLOAT64);
                out.extend_from_slice(&number.to_be_bytes());
            }
        }
    }
}

fn enter(depth: usize) -> Result<usize, EncodeError> {
    if depth >= MAX_DEPTH {
        return Err(EncodeError::NestingTooDeep { limit: MAX_DEPTH });
    }
    Ok(depth + 1)
}

fn write_int(number: i128, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if (0..INT_POS_FIXED_COUNT as i128).contains(&number) {
        out.push(INT_POS_FIXED_START + number as u8);
    } else if (-(INT_NEG_FIXED_COUNT as i128)..0).contains(&number) {
        out.push((INT_NEG_FIXED_START as i128 - 1 - number) as u8);
    } else if let Ok(small) = i8::try_from(number) {
        out.push(CHR_INT1);
        out.extend_from_slice(&small.to_be_bytes());
    } else if let Ok(short) = i16::try_from(number) {
        out.push(CHR_INT2);
        out.extend_from_slice(&short.to_be_bytes());
    } else if let Ok(word) = i32::try_from(number) {
        out.push(CHR_INT4);
        out.extend_from_slice(&word.to_be_bytes());
    } else if let Ok(long) = i64::try_from(number) {
        out.push(CHR_INT8);
        out.extend_from_slice(&long.to_be_bytes());
    } else {
        let digits = number.to_string();
        if digits.len() >= MAX_INT_LENGTH {
            return Err(EncodeError::IntegerOverflow {
                digits: digits.len(),
            });
        }
        out.push(CHR_INT);
        out.extend_from_slice(digits.as_bytes());
        out.push(CHR_TERM);
    }
    Ok(())
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.len() < STR_FIXED_COUNT {
        out.push(STR_FIXED_START + bytes.len() as u8);
    } else {
        out.extend_from_slice(bytes.len().to_string().as_bytes());
        out.push(b':');
    }
    out.extend_from_slice(bytes);
}
