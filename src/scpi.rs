// IEEE 488.2 / SCPI message formats shared by every instrument

use std::io::Cursor;
use std::str;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, InstrumentError, Result};

lazy_static! {
    static ref IDN_RE: Regex = Regex::new(r"^([^,]+),([^,]+),([^,]+),([^,\s]+)").unwrap();
    static ref ERR_RE: Regex = Regex::new(r#"^\s*([+-]?\d+)\s*(?:,\s*"?(.*?)"?)?\s*$"#).unwrap();
}

fn protocol(msg: impl Into<String>) -> Error { Error::Protocol(msg.into()) }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idn {
    pub manufacturer: String,
    pub model: String,
    pub serial_num: String,
    pub fw_version: String,
}

impl Idn {
    pub fn parse(s: &str) -> Result<Self> {
        let cap = IDN_RE.captures(s.trim())
            .ok_or_else(|| protocol(format!("Unable to parse *IDN? response '{}'", s.trim())))?;
        Ok(Idn {
            manufacturer: cap[1].trim().to_owned(),
            model: cap[2].trim().to_owned(),
            serial_num: cap[3].trim().to_owned(),
            fw_version: cap[4].trim().to_owned(),
        })
    }
}

/// `*OPT?` lists options separated by commas; instruments without options answer `0` or nothing
pub fn parse_options(s: &str) -> Vec<String> {
    s.split(',')
        .map(|o| o.trim().trim_matches('"').to_owned())
        .filter(|o| !o.is_empty() && o != "0")
        .collect()
}

pub fn parse_error_entry(s: &str) -> Result<InstrumentError> {
    let cap = ERR_RE.captures(s)
        .ok_or_else(|| protocol(format!("Unable to parse error queue entry '{}'", s.trim())))?;
    let code = cap[1].parse::<i32>()
        .map_err(|_| protocol(format!("Error code out of range in '{}'", s.trim())))?;
    let message = cap.get(2).map(|m| m.as_str().to_owned()).unwrap_or_default();
    Ok(InstrumentError { code, message })
}

/// Single-quoted SCPI string parameter
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Payload of an arbitrary block response.  `#<n><len><data>` is definite length;
/// `#0<data>` runs to the end of the message, minus the terminator.
pub fn parse_block(resp: &[u8]) -> Result<&[u8]> {
    if resp.first() != Some(&b'#') {
        return Err(protocol("Block data must start with '#'"));
    }

    let digits = resp.get(1)
        .and_then(|d| (*d as char).to_digit(10))
        .ok_or_else(|| protocol("Missing length digit count in block header"))? as usize;

    if digits == 0 {
        let body = &resp[2..];
        return Ok(body.strip_suffix(b"\n").unwrap_or(body));
    }

    let len_bytes = resp.get(2..(2 + digits))
        .ok_or_else(|| protocol("Block header truncated"))?;
    let len = str::from_utf8(len_bytes).ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| protocol("Invalid length in block header"))?;

    let start = 2 + digits;
    resp.get(start..(start + len))
        .ok_or_else(|| protocol(format!("Block announces {} bytes but only {} arrived", len, resp.len() - start)))
}

pub fn format_block(data: &[u8]) -> Vec<u8> {
    let len = data.len().to_string();
    let mut ans = format!("#{}{}", len.len(), len).into_bytes();
    ans.extend_from_slice(data);
    ans
}

pub fn parse_ascii_floats(s: &str) -> Result<Vec<f64>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(vec![]);
    }

    s.split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|_| protocol(format!("Unable to parse '{}' as a float", v.trim()))))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinFloatFormat {
    Single4BytesLe,
    Single4BytesBe,
    Double8BytesLe,
    Double8BytesBe,
}

impl Default for BinFloatFormat {
    fn default() -> Self { BinFloatFormat::Single4BytesLe }
}

impl BinFloatFormat {
    pub fn width(self) -> usize {
        match self {
            BinFloatFormat::Single4BytesLe | BinFloatFormat::Single4BytesBe => 4,
            BinFloatFormat::Double8BytesLe | BinFloatFormat::Double8BytesBe => 8,
        }
    }
}

pub fn decode_binary_floats(data: &[u8], format: BinFloatFormat) -> Result<Vec<f64>> {
    if data.len() % format.width() != 0 {
        return Err(protocol(format!("{} bytes of binary data is not a whole number of {}-byte samples", data.len(), format.width())));
    }

    let n = data.len() / format.width();
    let mut rdr = Cursor::new(data);
    let mut ans: Vec<f64> = Vec::with_capacity(n);
    for _ in 0..n {
        let x = match format {
            BinFloatFormat::Single4BytesLe => rdr.read_f32::<LittleEndian>()? as f64,
            BinFloatFormat::Single4BytesBe => rdr.read_f32::<BigEndian>()? as f64,
            BinFloatFormat::Double8BytesLe => rdr.read_f64::<LittleEndian>()?,
            BinFloatFormat::Double8BytesBe => rdr.read_f64::<BigEndian>()?,
        };
        ans.push(x);
    }

    Ok(ans)
}
