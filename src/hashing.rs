//! MD5 digests over key tuples.
//!
//! A tuple is rendered the way Python's `str(tuple)` renders it, then hashed,
//! so digests line up with keys already stored by the loading jobs. Text uses
//! `repr` quoting, absent values are `None`, floats use the shortest
//! round-trip form and a one-element tuple keeps its trailing comma.

use std::fmt::Write;

use md5::{Digest, Md5};

use crate::schema::dataset::NULL_SENTINEL;
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart<'a> {
    None,
    /// Cleared cell; only hashed into in-memory content keys.
    Cleared,
    Text(&'a str),
    Float(f64),
}

impl<'a> KeyPart<'a> {
    /// Tabular cell as a key element; the `"null"` sentinel counts as absent.
    pub fn from_frame_text(value: Option<&'a str>) -> Self {
        match value {
            None => Self::None,
            Some(NULL_SENTINEL) => Self::None,
            Some(s) => Self::Text(s),
        }
    }

    pub fn from_cell(value: &'a CellValue) -> Self {
        match value {
            CellValue::Null => Self::None,
            CellValue::Cleared => Self::Cleared,
            CellValue::Text(s) => Self::Text(s),
            CellValue::Number(n) => Self::Float(*n),
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Self::None => out.push_str("None"),
            Self::Cleared => out.push_str("Cleared"),
            Self::Text(s) => out.push_str(&str_repr(s)),
            Self::Float(f) => out.push_str(&float_repr(*f)),
        }
    }
}

/// Shortest round-trip float text, with `.0` on integral values and
/// scientific notation outside `1e-4 <= |x| < 1e16`.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.into();
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if value != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let plain = value.to_string();
    if plain.contains('.') {
        plain
    } else {
        plain + ".0"
    }
}

/// Quoted text with Python `repr` quoting and escapes.
pub fn str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if is_printable(c) => out.push(c),
            c => {
                let code = u32::from(c);
                // Writing to a String cannot fail.
                let _ = match code {
                    0..=0xff => write!(out, "\\x{code:02x}"),
                    0x100..=0xffff => write!(out, "\\u{code:04x}"),
                    _ => write!(out, "\\U{code:08x}"),
                };
            }
        }
    }
    out.push(quote);
    out
}

fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !(c.is_control()
        || c.is_whitespace()
        || matches!(c, '\u{ad}' | '\u{200b}'..='\u{200f}' | '\u{2060}'..='\u{2064}' | '\u{feff}'))
}

pub fn render_tuple(parts: &[KeyPart<'_>]) -> String {
    let mut out = String::from("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        part.render(&mut out);
    }
    if parts.len() == 1 {
        out.push(',');
    }
    out.push(')');
    out
}

/// Hex MD5 of the rendered tuple.
pub fn tuple_digest(parts: &[KeyPart<'_>]) -> String {
    let mut hasher = Md5::new();
    hasher.update(render_tuple(parts).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_rendering() {
        let parts = [KeyPart::Text("Energy"), KeyPart::None, KeyPart::Float(25.0)];
        assert_eq!(render_tuple(&parts), "('Energy', None, 25.0)");
        assert_eq!(render_tuple(&[KeyPart::Text("CO2")]), "('CO2',)");
        assert_eq!(render_tuple(&[]), "()");
    }

    #[test]
    fn sentinel_is_absent() {
        assert_eq!(KeyPart::from_frame_text(Some("null")), KeyPart::None);
        assert_eq!(KeyPart::from_frame_text(None), KeyPart::None);
        assert_eq!(KeyPart::from_frame_text(Some("CO2")), KeyPart::Text("CO2"));
    }

    #[test]
    fn digests_match_stored_keys() {
        assert_eq!(tuple_digest(&[]), "bcd8b0c2eb1fce714eab6cef0d771acc");
        assert_eq!(
            tuple_digest(&[KeyPart::Text("CO2")]),
            "df8a28deb211972cbdb96c7ebaacda20"
        );
        assert_eq!(
            tuple_digest(&[KeyPart::Text("Energy"), KeyPart::None, KeyPart::Float(25.0)]),
            "b20619f408b98187de03666a24a44610"
        );
        assert_eq!(
            tuple_digest(&[KeyPart::Text("it's")]),
            "1f667e439d7f72028911bd1970035f59"
        );
    }

    #[test]
    fn text_quoting_and_escapes() {
        assert_eq!(str_repr("Energy"), "'Energy'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\"b'c\n\\"), "'a\"b\\'c\\n\\\\'");
        assert_eq!(str_repr("\u{a0}\u{7}"), "'\\xa0\\x07'");
        assert_eq!(str_repr("Émissions"), "'Émissions'");
    }

    #[test]
    fn float_forms() {
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(28.0), "28.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(123456789.5), "123456789.5");
        assert_eq!(
            tuple_digest(&[
                KeyPart::Float(1e16),
                KeyPart::Float(1.5e-5),
                KeyPart::Float(0.0001),
                KeyPart::Float(-0.0),
                KeyPart::Float(123456789.5),
            ]),
            "83797651c7976558af52fb7cb7a4a950"
        );
    }

    #[test]
    fn float_and_text_hash_differently() {
        assert_ne!(
            tuple_digest(&[KeyPart::Float(25.0)]),
            tuple_digest(&[KeyPart::Text("25")])
        );
    }

    #[test]
    fn cleared_differs_from_absent() {
        assert_ne!(
            tuple_digest(&[KeyPart::Cleared]),
            tuple_digest(&[KeyPart::None])
        );
    }
}
