use super::codec::PayloadCursor;
use super::Error;
use encoding_rs::WINDOWS_1252;
use std::fmt::Write;

/// mask for the type lengths TYLE_*
pub const TYPE_INFO_MASK_TYLE: u32 = 0x0000_000f;

pub const TYPE_INFO_BOOL: u32 = 0x0000_0010;
pub const TYPE_INFO_SINT: u32 = 0x0000_0020;
pub const TYPE_INFO_UINT: u32 = 0x0000_0040;
pub const TYPE_INFO_FLOA: u32 = 0x0000_0080;
/// array of standard types
pub const TYPE_INFO_ARAY: u32 = 0x0000_0100;
pub const TYPE_INFO_STRG: u32 = 0x0000_0200;
pub const TYPE_INFO_RAWD: u32 = 0x0000_0400;
/// additional information to a variable (name and unit)
pub const TYPE_INFO_VARI: u32 = 0x0000_0800;
/// fixed-point encoding with quantization and offset
pub const TYPE_INFO_FIXP: u32 = 0x0000_1000;
/// additional trace information
pub const TYPE_INFO_TRAI: u32 = 0x0000_2000;
/// struct arguments
pub const TYPE_INFO_STRU: u32 = 0x0000_4000;
/// mask for the string/uint codings SCOD_*
pub const TYPE_INFO_MASK_SCOD: u32 = 0x0003_8000;

pub const TYLE_8BIT: u32 = 1;
pub const TYLE_16BIT: u32 = 2;
pub const TYLE_32BIT: u32 = 3;
pub const TYLE_64BIT: u32 = 4;
pub const TYLE_128BIT: u32 = 5;

pub const SCOD_ASCII: u32 = 0x0000_0000;
pub const SCOD_UTF8: u32 = 0x0000_8000;
pub const SCOD_HEX: u32 = 0x0001_0000;
pub const SCOD_BIN: u32 = 0x0001_8000;

/// The packed 32-bit type descriptor leading every verbose argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo(pub u32);

impl TypeInfo {
    #[inline]
    pub fn is_bool(self) -> bool {
        self.0 & TYPE_INFO_BOOL > 0
    }
    #[inline]
    pub fn is_sint(self) -> bool {
        self.0 & TYPE_INFO_SINT > 0
    }
    #[inline]
    pub fn is_uint(self) -> bool {
        self.0 & TYPE_INFO_UINT > 0
    }
    #[inline]
    pub fn is_float(self) -> bool {
        self.0 & TYPE_INFO_FLOA > 0
    }
    #[inline]
    pub fn is_string(self) -> bool {
        self.0 & TYPE_INFO_STRG > 0
    }
    #[inline]
    pub fn is_raw(self) -> bool {
        self.0 & TYPE_INFO_RAWD > 0
    }
    #[inline]
    pub fn is_variable(self) -> bool {
        self.0 & TYPE_INFO_VARI > 0
    }

    /// the width subfield (TYLE_*)
    #[inline]
    pub fn tyle(self) -> u32 {
        self.0 & TYPE_INFO_MASK_TYLE
    }

    /// the string/uint coding subfield (SCOD_*)
    #[inline]
    pub fn scod(self) -> u32 {
        self.0 & TYPE_INFO_MASK_SCOD
    }

    /// fixed-point, trace-info and struct arguments
    #[inline]
    pub fn is_unsupported_kind(self) -> bool {
        self.0 & (TYPE_INFO_FIXP | TYPE_INFO_TRAI | TYPE_INFO_STRU) > 0
    }
}

/// Render `noar` typed arguments from `payload` into `text`.
///
/// Arguments are separated by one space, with no trailing space.
pub(crate) fn append_args(
    text: &mut String,
    payload: &[u8],
    noar: u8,
    big_endian: bool,
) -> Result<(), Error> {
    let mut cur = PayloadCursor::new(payload);
    for nr_arg in 0..noar {
        if nr_arg > 0 {
            text.push(' ');
        }
        append_one(text, &mut cur, big_endian)?;
    }
    Ok(())
}

fn append_one(text: &mut String, cur: &mut PayloadCursor, big_endian: bool) -> Result<(), Error> {
    let info = TypeInfo(cur.extract::<u32>(big_endian)?);

    if info.is_string() {
        if info.is_variable() {
            return Err(Error::invalid("string argument with a variable name"));
        }
        return append_string(text, cur, big_endian, info.scod());
    }
    if info.is_uint() {
        return append_uint(text, cur, big_endian, info.tyle(), info.scod());
    }
    if info.is_sint() {
        return append_sint(text, cur, big_endian, info.tyle());
    }
    if info.is_float() {
        return append_float(text, cur, big_endian, info.tyle());
    }
    if info.is_bool() {
        text.push_str(if cur.extract_bool()? { "true" } else { "false" });
        return Ok(());
    }
    if info.is_raw() {
        return append_raw(text, cur, big_endian);
    }
    if info.is_unsupported_kind() {
        return Err(Error::invalid(
            "fixed-point, trace-info and struct arguments are not supported",
        ));
    }
    Err(Error::invalid(format!(
        "unknown argument type 0x{:08x}",
        info.0
    )))
}

fn append_string(
    text: &mut String,
    cur: &mut PayloadCursor,
    big_endian: bool,
    scod: u32,
) -> Result<(), Error> {
    let len: u16 = cur.extract(big_endian)?;
    // reject before any length arithmetic, len - 1 must not underflow
    if len == 0 {
        return Err(Error::invalid("string argument with length 0"));
    }
    match scod {
        SCOD_ASCII => {
            let bytes = cur.take(len as usize)?;
            if bytes[len as usize - 1] != 0 {
                return Err(Error::invalid("string is not null-terminated"));
            }
            let (s, _) = WINDOWS_1252.decode_without_bom_handling(&bytes[..len as usize - 1]);
            text.push_str(&s);
            Ok(())
        }
        SCOD_UTF8 => Err(Error::invalid("utf-8 string arguments are not supported")),
        _ => Err(Error::invalid("invalid string coding")),
    }
}

fn append_raw(text: &mut String, cur: &mut PayloadCursor, big_endian: bool) -> Result<(), Error> {
    let len: u16 = cur.extract(big_endian)?;
    let bytes = cur.take(len as usize)?;
    text.reserve(bytes.len() * 2);
    for b in bytes {
        write!(text, "{:02X}", b)?;
    }
    Ok(())
}

fn append_uint(
    text: &mut String,
    cur: &mut PayloadCursor,
    big_endian: bool,
    tyle: u32,
    scod: u32,
) -> Result<(), Error> {
    match tyle {
        TYLE_8BIT => append_coded_int(text, cur.extract::<u8>(big_endian)?, scod),
        TYLE_16BIT => append_coded_int(text, cur.extract::<u16>(big_endian)?, scod),
        TYLE_32BIT => append_coded_int(text, cur.extract::<u32>(big_endian)?, scod),
        TYLE_64BIT => append_coded_int(text, cur.extract::<u64>(big_endian)?, scod),
        TYLE_128BIT => Err(Error::invalid(
            "128-bit integer arguments are not supported",
        )),
        _ => Err(Error::invalid("unknown argument width")),
    }
}

/// hex if SCOD_HEX, binary if SCOD_BIN, decimal otherwise
fn append_coded_int<T>(text: &mut String, val: T, scod: u32) -> Result<(), Error>
where
    T: funty::Integral + itoa::Integer,
{
    match scod {
        SCOD_HEX => write!(text, "{:#x}", val)?,
        SCOD_BIN => write!(text, "{:#b}", val)?,
        _ => text.push_str(itoa::Buffer::new().format(val)),
    }
    Ok(())
}

fn append_sint(
    text: &mut String,
    cur: &mut PayloadCursor,
    big_endian: bool,
    tyle: u32,
) -> Result<(), Error> {
    let mut itoa_buf = itoa::Buffer::new();
    let formatted = match tyle {
        TYLE_8BIT => itoa_buf.format(cur.extract::<i8>(big_endian)?),
        TYLE_16BIT => itoa_buf.format(cur.extract::<i16>(big_endian)?),
        TYLE_32BIT => itoa_buf.format(cur.extract::<i32>(big_endian)?),
        TYLE_64BIT => itoa_buf.format(cur.extract::<i64>(big_endian)?),
        TYLE_128BIT => {
            return Err(Error::invalid(
                "128-bit integer arguments are not supported",
            ))
        }
        _ => return Err(Error::invalid("unknown argument width")),
    };
    text.push_str(formatted);
    Ok(())
}

fn append_float(
    text: &mut String,
    cur: &mut PayloadCursor,
    big_endian: bool,
    tyle: u32,
) -> Result<(), Error> {
    match tyle {
        TYLE_32BIT => write!(text, "{}", cur.extract::<f32>(big_endian)?)?,
        TYLE_64BIT => write!(text, "{}", cur.extract::<f64>(big_endian)?)?,
        _ => return Err(Error::invalid("unknown argument width")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlt::ErrorKind;

    fn render(payload: &[u8], noar: u8, big_endian: bool) -> Result<String, Error> {
        let mut text = String::new();
        append_args(&mut text, payload, noar, big_endian)?;
        Ok(text)
    }

    fn le_arg(type_info: u32, data: &[u8]) -> Vec<u8> {
        let mut v = type_info.to_le_bytes().to_vec();
        v.extend_from_slice(data);
        v
    }

    mod strings {
        use super::*;

        #[test]
        fn ascii() {
            let mut p = le_arg(TYPE_INFO_STRG, &5u16.to_le_bytes());
            p.extend_from_slice(b"abcd\0");
            assert_eq!(render(&p, 1, false).unwrap(), "abcd");
        }

        #[test]
        fn zero_length_rejected() {
            let p = le_arg(TYPE_INFO_STRG, &0u16.to_le_bytes());
            let err = render(&p, 1, false).unwrap_err();
            assert!(err.to_string().contains("length 0"));
        }

        #[test]
        fn missing_null_terminator() {
            let mut p = le_arg(TYPE_INFO_STRG, &4u16.to_le_bytes());
            p.extend_from_slice(b"abcd");
            let err = render(&p, 1, false).unwrap_err();
            assert!(err.to_string().contains("not null-terminated"));
        }

        #[test]
        fn utf8_unsupported() {
            let mut p = le_arg(TYPE_INFO_STRG | SCOD_UTF8, &3u16.to_le_bytes());
            p.extend_from_slice(b"ab\0");
            let err = render(&p, 1, false).unwrap_err();
            assert!(err.to_string().contains("utf-8"));
        }

        #[test]
        fn hex_coding_on_string_rejected() {
            let mut p = le_arg(TYPE_INFO_STRG | SCOD_HEX, &3u16.to_le_bytes());
            p.extend_from_slice(b"ab\0");
            assert!(render(&p, 1, false).is_err());
        }

        #[test]
        fn variable_string_rejected() {
            let p = le_arg(TYPE_INFO_STRG | TYPE_INFO_VARI, &3u16.to_le_bytes());
            assert!(render(&p, 1, false).is_err());
        }
    }

    mod raw {
        use super::*;

        #[test]
        fn uppercase_hex_no_separators() {
            let mut p = le_arg(TYPE_INFO_RAWD, &3u16.to_le_bytes());
            p.extend_from_slice(&[0xde, 0xad, 0xbe]);
            assert_eq!(render(&p, 1, false).unwrap(), "DEADBE");
        }

        #[test]
        fn empty_raw() {
            let p = le_arg(TYPE_INFO_RAWD, &0u16.to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "");
        }

        #[test]
        fn raw_longer_than_payload() {
            let mut p = le_arg(TYPE_INFO_RAWD, &9u16.to_le_bytes());
            p.extend_from_slice(&[1, 2]);
            let err = render(&p, 1, false).unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::InvalidData(_)));
        }
    }

    mod uints {
        use super::*;

        #[test]
        fn decimal_widths() {
            let p = le_arg(TYPE_INFO_UINT | TYLE_8BIT, &[200u8]);
            assert_eq!(render(&p, 1, false).unwrap(), "200");
            let p = le_arg(TYPE_INFO_UINT | TYLE_16BIT, &40000u16.to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "40000");
            let p = le_arg(TYPE_INFO_UINT | TYLE_32BIT, &3_000_000_000u32.to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "3000000000");
            let p = le_arg(
                TYPE_INFO_UINT | TYLE_64BIT,
                &18_000_000_000_000_000_000u64.to_le_bytes(),
            );
            assert_eq!(render(&p, 1, false).unwrap(), "18000000000000000000");
        }

        #[test]
        fn hex_coding_single_rendering() {
            let p = le_arg(
                TYPE_INFO_UINT | TYLE_32BIT | SCOD_HEX,
                &0x12345678u32.to_le_bytes(),
            );
            assert_eq!(render(&p, 1, false).unwrap(), "0x12345678");
        }

        #[test]
        fn bin_coding_single_rendering() {
            let p = le_arg(TYPE_INFO_UINT | TYLE_8BIT | SCOD_BIN, &[5u8]);
            assert_eq!(render(&p, 1, false).unwrap(), "0b101");
        }

        #[test]
        fn big_endian_value() {
            let mut p = (TYPE_INFO_UINT | TYLE_32BIT).to_be_bytes().to_vec();
            p.extend_from_slice(&0x12345678u32.to_be_bytes());
            assert_eq!(render(&p, 1, true).unwrap(), "305419896");
        }

        #[test]
        fn tyle_128_unsupported() {
            let p = le_arg(TYPE_INFO_UINT | TYLE_128BIT, &[0u8; 16]);
            assert!(render(&p, 1, false).is_err());
        }

        #[test]
        fn tyle_zero_unknown() {
            let p = le_arg(TYPE_INFO_UINT, &[0u8; 4]);
            assert!(render(&p, 1, false).is_err());
        }
    }

    mod sints {
        use super::*;

        #[test]
        fn negative_values() {
            let p = le_arg(TYPE_INFO_SINT | TYLE_8BIT, &(-7i8).to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "-7");
            let p = le_arg(TYPE_INFO_SINT | TYLE_32BIT, &(-100000i32).to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "-100000");
            let p = le_arg(TYPE_INFO_SINT | TYLE_64BIT, &i64::MIN.to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "-9223372036854775808");
        }

        #[test]
        fn tyle_128_unsupported() {
            let p = le_arg(TYPE_INFO_SINT | TYLE_128BIT, &[0u8; 16]);
            assert!(render(&p, 1, false).is_err());
        }
    }

    mod floats {
        use super::*;

        #[test]
        fn single_and_double() {
            let p = le_arg(TYPE_INFO_FLOA | TYLE_32BIT, &1.5f32.to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "1.5");
            let p = le_arg(TYPE_INFO_FLOA | TYLE_64BIT, &(-0.25f64).to_le_bytes());
            assert_eq!(render(&p, 1, false).unwrap(), "-0.25");
        }

        #[test]
        fn other_widths_rejected() {
            let p = le_arg(TYPE_INFO_FLOA | TYLE_16BIT, &[0u8; 2]);
            assert!(render(&p, 1, false).is_err());
        }
    }

    mod bools {
        use super::*;

        #[test]
        fn words_lowercase() {
            let p = le_arg(TYPE_INFO_BOOL | TYLE_8BIT, &[1u8]);
            assert_eq!(render(&p, 1, false).unwrap(), "true");
            let p = le_arg(TYPE_INFO_BOOL | TYLE_8BIT, &[0u8]);
            assert_eq!(render(&p, 1, false).unwrap(), "false");
        }
    }

    mod dispatch {
        use super::*;

        #[test]
        fn unsupported_kinds_fail() {
            for kind in [TYPE_INFO_FIXP, TYPE_INFO_TRAI, TYPE_INFO_STRU] {
                let p = le_arg(kind, &[0u8; 8]);
                let err = render(&p, 1, false).unwrap_err();
                assert!(err.to_string().contains("not supported"), "kind {kind:#x}");
            }
        }

        #[test]
        fn unknown_type_fails() {
            let p = le_arg(TYPE_INFO_ARAY, &[0u8; 8]);
            let err = render(&p, 1, false).unwrap_err();
            assert!(err.to_string().contains("unknown argument type"));
        }

        #[test]
        fn args_separated_by_single_space() {
            let mut p = le_arg(TYPE_INFO_UINT | TYLE_8BIT, &[1u8]);
            p.extend_from_slice(&le_arg(TYPE_INFO_BOOL | TYLE_8BIT, &[1u8]));
            let mut s = le_arg(TYPE_INFO_STRG, &3u16.to_le_bytes());
            s.extend_from_slice(b"ab\0");
            p.extend_from_slice(&s);
            assert_eq!(render(&p, 3, false).unwrap(), "1 true ab");
        }

        #[test]
        fn zero_args_empty_output() {
            assert_eq!(render(&[], 0, false).unwrap(), "");
        }

        #[test]
        fn missing_type_info_fails() {
            let p = [0u8, 1];
            assert!(render(&p, 1, false).is_err());
        }
    }
}
