//! Rencode decoder dispatching on the leading typecode byte

use super::{CHR_TERM, DecodeError, MAX_DEPTH, MAX_INT_LENGTH, Typecode, Value};

/// Decodes exactly one value from `data`.
///
/// # Errors
///
/// - `DecodeError::TrailingBytes` - If bytes remain after the first value
/// - Any other `DecodeError` - If the value itself is malformed
pub fn decode(data: &[u8]) -> Result<Value, DecodeError> {
    let mut decoder = Decoder { data, pos: 0 };
    let value = decoder.read_value(0)?;

    if decoder.pos != data.len() {
        return Err(DecodeError::TrailingBytes {
            consumed: decoder.pos,
            remaining: data.len() - decoder.pos,
        });
    }

    Ok(value)
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let offset = self.pos;
        let typecode = *self
            .data
            .get(offset)
            .ok_or(DecodeError::Truncated { offset })?;

        match Typecode::classify(typecode) {
            Typecode::PosFixed(value) => {
                self.pos += 1;
                Ok(Value::Int(value.into()))
            }
            Typecode::NegFixed(value) => {
                self.pos += 1;
                Ok(Value::Int(value.into()))
            }
            Typecode::Int1 => {
                let bytes = self.take_fixed::<1>()?;
                Ok(Value::Int(i8::from_be_bytes(bytes).into()))
            }
            Typecode::Int2 => {
                let bytes = self.take_fixed::<2>()?;
                Ok(Value::Int(i16::from_be_bytes(bytes).into()))
            }
            Typecode::Int4 => {
                let bytes = self.take_fixed::<4>()?;
                Ok(Value::Int(i32::from_be_bytes(bytes).into()))
            }
            Typecode::Int8 => {
                let bytes = self.take_fixed::<8>()?;
                Ok(Value::Int(i64::from_be_bytes(bytes).into()))
            }
            Typecode::Float32 => {
                let bytes = self.take_fixed::<4>()?;
                Ok(Value::Float(f32::from_be_bytes(bytes).into()))
            }
            Typecode::Float64 => {
                let bytes = self.take_fixed::<8>()?;
                Ok(Value::Float(f64::from_be_bytes(bytes)))
            }
            Typecode::True => {
                self.pos += 1;
                Ok(Value::Bool(true))
            }
            Typecode::False => {
                self.pos += 1;
                Ok(Value::Bool(false))
            }
            Typecode::None => {
                self.pos += 1;
                Ok(Value::Null)
            }
            Typecode::Int => self.read_decimal_int(),
            Typecode::StrDecimal => self.read_decimal_string(),
            Typecode::StrFixed(length) => {
                self.pos += 1;
                let bytes = self.take(length)?;
                Ok(string_value(bytes))
            }
            Typecode::List => {
                let depth = self.enter(depth)?;
                self.pos += 1;
                let mut items = Vec::new();
                while !self.at_terminator()? {
                    items.push(self.read_value(depth)?);
                }
                self.pos += 1;
                Ok(Value::List(items))
            }
            Typecode::ListFixed(count) => {
                let depth = self.enter(depth)?;
                self.pos += 1;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth)?);
                }
                Ok(Value::List(items))
            }
            Typecode::Dict => {
                let depth = self.enter(depth)?;
                self.pos += 1;
                let mut entries = Vec::new();
                while !self.at_terminator()? {
                    let key = self.read_value(depth)?;
                    let value = self.read_value(depth)?;
                    entries.push((key, value));
                }
                self.pos += 1;
                Ok(Value::Map(entries))
            }
            Typecode::DictFixed(count) => {
                let depth = self.enter(depth)?;
                self.pos += 1;
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_value(depth)?;
                    let value = self.read_value(depth)?;
                    entries.push((key, value));
                }
                Ok(Value::Map(entries))
            }
            Typecode::Term => Err(DecodeError::UnexpectedTerminator { offset }),
            Typecode::Unknown(typecode) => Err(DecodeError::UnknownTypecode { typecode, offset }),
        }
    }

    /// `61 <digits> 127`: integer too wide for the fixed-width forms.
    fn read_decimal_int(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos + 1;
        let end = self.find(CHR_TERM, start)?;
        let digits = &self.data[start..end];

        if digits.len() >= MAX_INT_LENGTH {
            return Err(DecodeError::Overflow { offset: start });
        }

        let magnitude = match digits.split_first() {
            Some((b'-', rest)) => {
                if rest.first() == Some(&b'0') {
                    return Err(DecodeError::NegativeLeadingZero { offset: start });
                }
                rest
            }
            Some((b'0', rest)) if !rest.is_empty() => {
                return Err(DecodeError::RedundantLeadingZero { offset: start });
            }
            _ => digits,
        };
        if magnitude.is_empty() || !magnitude.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidDigits { offset: start });
        }

        // Only ASCII digits and an optional sign remain, so UTF-8 is guaranteed.
        let text = std::str::from_utf8(digits).map_err(|_| DecodeError::InvalidDigits {
            offset: start,
        })?;
        let value = text
            .parse::<i128>()
            .map_err(|_| DecodeError::IntegerOutOfRange { offset: start })?;

        self.pos = end + 1;
        Ok(Value::Int(value))
    }

    /// `<length>:<bytes>`: string too long for the fixed-length forms.
    fn read_decimal_string(&mut self) -> Result<Value, DecodeError> {
        let start = self.pos;
        let colon = self.find(b':', start)?;
        let digits = &self.data[start..colon];

        if digits.len() >= MAX_INT_LENGTH {
            return Err(DecodeError::Overflow { offset: start });
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(DecodeError::RedundantLeadingZero { offset: start });
        }
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidDigits { offset: start });
        }

        let length = std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.parse::<usize>().ok())
            .ok_or(DecodeError::Overflow { offset: start })?;

        self.pos = colon + 1;
        let bytes = self.take(length)?;
        Ok(string_value(bytes))
    }

    fn enter(&self, depth: usize) -> Result<usize, DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::NestingTooDeep {
                limit: MAX_DEPTH,
                offset: self.pos,
            });
        }
        Ok(depth + 1)
    }

    fn at_terminator(&self) -> Result<bool, DecodeError> {
        self.data
            .get(self.pos)
            .map(|byte| *byte == CHR_TERM)
            .ok_or(DecodeError::Truncated { offset: self.pos })
    }

    fn find(&self, needle: u8, from: usize) -> Result<usize, DecodeError> {
        self.data
            .get(from..)
            .and_then(|rest| rest.iter().position(|byte| *byte == needle))
            .map(|relative| from + relative)
            .ok_or(DecodeError::Truncated {
                offset: self.data.len(),
            })
    }

    fn take(&mut self, length: usize) -> Result<&[u8], DecodeError> {
        let end = self
            .pos
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated {
                offset: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skips the typecode byte and reads an `N`-byte big-endian payload.
    fn take_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.pos += 1;
        let bytes = self.take(N)?;
        let mut payload = [0u8; N];
        payload.copy_from_slice(bytes);
        Ok(payload)
    }
}

fn string_value(bytes: &[u8]) -> Value {
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Value::Str(text),
        Err(error) => Value::Bytes(error.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_integers() {
        assert_eq!(decode(&[0]).unwrap(), Value::Int(0));
        assert_eq!(decode(&[43]).unwrap(), Value::Int(43));
        assert_eq!(decode(&[70]).unwrap(), Value::Int(-1));
        assert_eq!(decode(&[101]).unwrap(), Value::Int(-32));
    }

    #[test]
    fn test_decode_big_endian_widths() {
        assert_eq!(decode(&[62, 0x80]).unwrap(), Value::Int(-128));
        assert_eq!(decode(&[63, 0x7f, 0xff]).unwrap(), Value::Int(32767));
        assert_eq!(decode(&[63, 0x80, 0x00]).unwrap(), Value::Int(-32768));
        assert_eq!(
            decode(&[64, 0x00, 0x01, 0x00, 0x00]).unwrap(),
            Value::Int(65536)
        );
        assert_eq!(
            decode(&[65, 0, 0, 0, 1, 0, 0, 0, 0]).unwrap(),
            Value::Int(1 << 32)
        );
        assert_eq!(
            decode(&[66, 0x3f, 0xc0, 0x00, 0x00]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            decode(&[44, 0xc0, 0x04, 0, 0, 0, 0, 0, 0]).unwrap(),
            Value::Float(-2.5)
        );
    }

    #[test]
    fn test_decode_decimal_integer() {
        let mut data = vec![61];
        data.extend_from_slice(b"-170141183460469231731687303715884105728");
        data.push(127);
        assert_eq!(decode(&data).unwrap(), Value::Int(i128::MIN));

        assert_eq!(decode(b"=0\x7f").unwrap(), Value::Int(0));
        assert_eq!(decode(b"=-5\x7f").unwrap(), Value::Int(-5));
    }

    #[test]
    fn test_decode_rejects_decimal_overflow() {
        let mut data = vec![61];
        data.extend(std::iter::repeat_n(b'9', 65));
        data.push(127);
        assert!(matches!(decode(&data), Err(DecodeError::Overflow { .. })));

        let mut data = vec![61];
        data.extend(std::iter::repeat_n(b'1', 64));
        data.push(127);
        assert!(matches!(decode(&data), Err(DecodeError::Overflow { .. })));
    }

    #[test]
    fn test_decode_rejects_redundant_leading_zero() {
        assert_eq!(
            decode(b"=012\x7f"),
            Err(DecodeError::RedundantLeadingZero { offset: 1 })
        );
        assert_eq!(
            decode(b"=00\x7f"),
            Err(DecodeError::RedundantLeadingZero { offset: 1 })
        );
        assert_eq!(
            decode(b"00:"),
            Err(DecodeError::RedundantLeadingZero { offset: 0 })
        );
        assert_eq!(
            decode(b"03:abc"),
            Err(DecodeError::RedundantLeadingZero { offset: 0 })
        );
    }

    #[test]
    fn test_decode_rejects_negative_leading_zero() {
        assert_eq!(
            decode(b"=-05\x7f"),
            Err(DecodeError::NegativeLeadingZero { offset: 1 })
        );
        assert_eq!(
            decode(b"=-0\x7f"),
            Err(DecodeError::NegativeLeadingZero { offset: 1 })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_digits() {
        assert!(matches!(
            decode(b"=+5\x7f"),
            Err(DecodeError::InvalidDigits { .. })
        ));
        assert!(matches!(
            decode(b"=-\x7f"),
            Err(DecodeError::InvalidDigits { .. })
        ));
        assert!(matches!(
            decode(b"=\x7f"),
            Err(DecodeError::InvalidDigits { .. })
        ));
        assert!(matches!(
            decode(b"1a:x"),
            Err(DecodeError::InvalidDigits { .. })
        ));
    }

    #[test]
    fn test_decode_strings() {
        assert_eq!(decode(&[128]).unwrap(), Value::Str(String::new()));
        assert_eq!(
            decode(&[131, b'a', b'b', b'c']).unwrap(),
            Value::from("abc")
        );
        assert_eq!(decode(b"0:").unwrap(), Value::Str(String::new()));
        assert_eq!(decode(b"5:hello").unwrap(), Value::from("hello"));
        assert_eq!(
            decode(&[130, 0xff, 0xfe]).unwrap(),
            Value::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_decode_containers() {
        // Fixed list of [1, "a"] and terminated map {"k": true}.
        assert_eq!(
            decode(&[194, 1, 129, b'a']).unwrap(),
            Value::List(vec![Value::Int(1), Value::from("a")])
        );
        assert_eq!(
            decode(&[60, 129, b'k', 67, 127]).unwrap(),
            Value::Map(vec![(Value::from("k"), Value::Bool(true))])
        );
        assert_eq!(decode(&[59, 127]).unwrap(), Value::List(vec![]));
        assert_eq!(decode(&[102]).unwrap(), Value::Map(vec![]));
    }

    #[test]
    fn test_decode_preserves_map_order() {
        let value = decode(&[104, 129, b'z', 1, 129, b'a', 2]).unwrap();
        let keys: Vec<_> = value
            .as_map()
            .unwrap()
            .iter()
            .map(|(key, _)| key.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert_eq!(
            decode(&[1, 2]),
            Err(DecodeError::TrailingBytes {
                consumed: 1,
                remaining: 1
            })
        );
    }

    #[test]
    fn test_decode_rejects_truncation() {
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[59, 1]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[60, 1]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[61, b'1']), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[64, 0, 1]), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[133, b'a']), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(b"9:short"), Err(DecodeError::Truncated { .. })));
        assert!(matches!(decode(&[195, 1]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_decode_rejects_bare_terminator_and_unknown_typecodes() {
        assert_eq!(
            decode(&[127]),
            Err(DecodeError::UnexpectedTerminator { offset: 0 })
        );
        assert_eq!(
            decode(&[45]),
            Err(DecodeError::UnknownTypecode {
                typecode: 45,
                offset: 0
            })
        );
    }

    #[test]
    fn test_decode_limits_nesting() {
        let data = vec![193u8; MAX_DEPTH + 2];
        assert!(matches!(
            decode(&data),
            Err(DecodeError::NestingTooDeep { .. })
        ));
    }
}
