use std::fmt::{Display, Write as _};

use rust_decimal::Decimal;

use crate::line_protocol::escape_string_value;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Float(f64),
    Integer(i64),
    UInteger(u64),
    Boolean(bool),
    String(String),
    Decimal(Decimal),
}

impl FieldValue {
    /// Quoted string field built from any displayable value.
    pub fn display<T: Display>(value: T) -> Self {
        FieldValue::String(value.to_string())
    }

    /// Whether the value is dropped at encode time: nulls and non-finite floats.
    pub fn is_defined(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    pub(crate) fn serialize(&self, buf: &mut String) {
        // Writing into a String cannot fail.
        let _ = match self {
            FieldValue::Null => Ok(()),
            FieldValue::Float(v) => write!(buf, "{v}"),
            FieldValue::Integer(v) => write!(buf, "{v}i"),
            FieldValue::UInteger(v) => write!(buf, "{v}u"),
            FieldValue::Boolean(v) => write!(buf, "{v}"),
            FieldValue::Decimal(v) => write!(buf, "{v}"),
            FieldValue::String(v) => {
                buf.push('"');
                escape_string_value(buf, v);
                buf.push('"');
                Ok(())
            }
        };
    }
}

pub trait Encode: std::fmt::Debug {
    fn encode(self) -> FieldValue;
}

impl<T: Encode + Clone> Encode for &T {
    fn encode(self) -> FieldValue {
        self.clone().encode()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> FieldValue {
        match self {
            Some(v) => v.encode(),
            None => FieldValue::Null,
        }
    }
}

impl Encode for () {
    fn encode(self) -> FieldValue {
        FieldValue::Null
    }
}

macro_rules! encode_as {
    ($variant:ident, $target:ty, $($ty:ty),+) => {
        $(
            impl Encode for $ty {
                fn encode(self) -> FieldValue {
                    FieldValue::$variant(self as $target)
                }
            }
        )+
    };
}

encode_as!(Float, f64, f64);

/// Widens through the shortest decimal form so `0.1f32` stays `0.1`.
impl Encode for f32 {
    fn encode(self) -> FieldValue {
        FieldValue::Float(self.to_string().parse().unwrap_or(f64::from(self)))
    }
}
encode_as!(Integer, i64, i8, i16, i32, i64, isize);
encode_as!(UInteger, u64, u8, u16, u32, u64, usize);

impl Encode for bool {
    fn encode(self) -> FieldValue {
        FieldValue::Boolean(self)
    }
}

impl Encode for &str {
    fn encode(self) -> FieldValue {
        FieldValue::String(self.to_string())
    }
}

impl Encode for String {
    fn encode(self) -> FieldValue {
        FieldValue::String(self)
    }
}

impl Encode for Decimal {
    fn encode(self) -> FieldValue {
        FieldValue::Decimal(self)
    }
}

impl Encode for FieldValue {
    fn encode(self) -> FieldValue {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn render(value: impl Encode) -> String {
        let mut buf = String::new();
        value.encode().serialize(&mut buf);
        buf
    }

    #[test]
    fn numeric_suffixes() {
        assert_eq!(render(42i64), "42i");
        assert_eq!(render(-7i8), "-7i");
        assert_eq!(render(42u32), "42u");
        assert_eq!(render(u64::MAX), "18446744073709551615u");
        assert_eq!(render(1.5f64), "1.5");
        assert_eq!(render(2.0f32), "2");
        assert_eq!(render(0.1f32), "0.1");
        assert_eq!(render(-3.3f32), "-3.3");
        assert_eq!(render(0.0000001f64), "0.0000001");
        assert_eq!(render(Decimal::from_str("123.450").unwrap()), "123.450");
    }

    #[test]
    fn booleans_and_strings() {
        assert_eq!(render(true), "true");
        assert_eq!(render(false), "false");
        assert_eq!(render("say \"hi\" \\o/"), r#""say \"hi\" \\o/""#);
        assert_eq!(render(FieldValue::display(std::net::Ipv4Addr::LOCALHOST)), "\"127.0.0.1\"");
    }

    #[test]
    fn undefined_values() {
        assert!(!None::<i64>.encode().is_defined());
        assert!(!f64::NAN.encode().is_defined());
        assert!(!f64::INFINITY.encode().is_defined());
        assert!(!f32::NEG_INFINITY.encode().is_defined());
        assert!(!f32::NAN.encode().is_defined());
        assert!(0.0f64.encode().is_defined());
        assert!(Some("x").encode().is_defined());
    }
}
