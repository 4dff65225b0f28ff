//! Binary `numeric` wire format, kept as decimal text so no precision is lost.
//!
//! The value is a header of four 16-bit fields (`ndigits`, `weight`, `sign`, `dscale`)
//! followed by `ndigits` base-10000 digit groups, most significant first. `weight` is
//! the power of 10000 of the first group.

use std::error::Error;

use tokio_postgres::types::{FromSql, Type};
use tokio_util::bytes::{BufMut, BytesMut};

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_POS_INF: u16 = 0xD000;
const SIGN_NEG_INF: u16 = 0xF000;
const GROUP_DIGITS: usize = 4;

type BoxError = Box<dyn Error + Sync + Send>;

/// A `numeric` cell rendered as decimal text (`"12.50"`, `"NaN"`, `"-Infinity"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, BoxError> {
    match raw.get(at..at + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err("numeric value is truncated".into()),
    }
}

/// Render a binary `numeric` as decimal text with exactly `dscale` fractional digits.
///
/// # Errors
/// Returns an error when the buffer is shorter than its header claims.
pub fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    let weight = i32::from(i16::from_be_bytes(read_u16(raw, 2)?.to_be_bytes()));
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);

    match sign {
        SIGN_NAN => return Ok("NaN".into()),
        SIGN_POS_INF => return Ok("Infinity".into()),
        SIGN_NEG_INF => return Ok("-Infinity".into()),
        _ => {}
    }

    let groups = (0..ndigits)
        .map(|i| read_u16(raw, 8 + 2 * i))
        .collect::<Result<Vec<_>, _>>()?;
    let group = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| groups.get(p))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == SIGN_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for pos in 1..=weight {
            out.push_str(&format!("{:04}", group(pos)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + GROUP_DIGITS);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Encode decimal text (`"-12.50"`, `"NaN"`, `"Infinity"`) as a binary `numeric`.
///
/// # Errors
/// Returns an error for anything that is not a plain decimal literal.
pub fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let text = text.trim();
    let special = if text.eq_ignore_ascii_case("nan") {
        Some(SIGN_NAN)
    } else if text.eq_ignore_ascii_case("infinity") || text.eq_ignore_ascii_case("+infinity") {
        Some(SIGN_POS_INF)
    } else if text.eq_ignore_ascii_case("-infinity") {
        Some(SIGN_NEG_INF)
    } else {
        None
    };
    if let Some(sign) = special {
        write_header(out, 0, 0, sign, 0);
        return Ok(());
    }

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(format!("invalid numeric literal {text:?}").into());
    }
    let dscale = u16::try_from(frac_part.len())?;

    let int_part = int_part.trim_start_matches('0');
    let int_pad = (GROUP_DIGITS - int_part.len() % GROUP_DIGITS) % GROUP_DIGITS;
    let frac_pad = (GROUP_DIGITS - frac_part.len() % GROUP_DIGITS) % GROUP_DIGITS;
    let digits: Vec<u8> = std::iter::repeat_n(0, int_pad)
        .chain(int_part.bytes().map(|b| b - b'0'))
        .chain(frac_part.bytes().map(|b| b - b'0'))
        .chain(std::iter::repeat_n(0, frac_pad))
        .collect();

    let mut groups: Vec<u16> = digits
        .chunks(GROUP_DIGITS)
        .map(|chunk| chunk.iter().fold(0_u16, |acc, d| acc * 10 + u16::from(*d)))
        .collect();
    let mut weight = i32::try_from((int_pad + int_part.len()) / GROUP_DIGITS)? - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i32::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    if groups.is_empty() {
        write_header(out, 0, 0, SIGN_POS, dscale);
        return Ok(());
    }
    let sign = if negative { SIGN_NEG } else { SIGN_POS };
    write_header(
        out,
        u16::try_from(groups.len())?,
        i16::try_from(weight)?,
        sign,
        dscale,
    );
    for g in groups {
        out.put_u16(g);
    }
    Ok(())
}

fn write_header(out: &mut BytesMut, ndigits: u16, weight: i16, sign: u16, dscale: u16) {
    out.put_u16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
}
