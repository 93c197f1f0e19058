use std::io::{self, Cursor, Error, ErrorKind};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub struct Packer {
	pub buff:Vec<u8>
}

// Reads from `pos` instead of shifting the buffer so large waveform replies stay linear
pub struct Unpacker {
	buff:Vec<u8>,
	pos:usize,
}

impl Default for Packer {
	fn default() -> Self { Self::new() }
}

impl Packer {

	pub fn new() -> Self { Packer{buff: Vec::new()} }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn get_buf(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }

	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> {
		if b { self.pack_i32(1) }
		else { self.pack_i32(0) }
	}

	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);

		// Ensure alignment
		while self.buff.len() % 4 != 0 { self.buff.push(0); }
		Ok(())
	}

}

impl Default for Unpacker {
	fn default() -> Self { Self::new() }
}

impl Unpacker {

	pub fn new() -> Self { Unpacker{buff: Vec::new(), pos: 0} }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> usize { self.buff.len() - self.pos }
	pub fn all_data_consumed(&self) -> bool { self.remaining() == 0 }

	pub fn skip(&mut self, n:usize) -> io::Result<()> {
		if n%4 != 0 {
			return Err(err("Only skip multiples of four bytes in order to maintain alignment"));
		}
		if n > self.remaining() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Tried to skip past the end of the buffer"));
		}
		self.pos += n;
		Ok(())
	}

	pub fn get_remaining_bytes(&self) -> &[u8] { &self.buff[self.pos..] }

	pub fn unpack_u32(&mut self) -> io::Result<u32> {
		let ans:u32 = Cursor::new(self.get_remaining_bytes()).read_u32::<BigEndian>()?;
		self.pos += 4;
		Ok(ans)
	}

	pub fn unpack_i32(&mut self) -> io::Result<i32> {
		let ans:i32 = Cursor::new(self.get_remaining_bytes()).read_i32::<BigEndian>()?;
		self.pos += 4;
		Ok(ans)
	}

	// An enum is just an i32 with a restricted set of values.  We can't check that this value is in the restricted set at this
	// level because it depends on the application, so for our purposes here, an enum is the same as an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			x => Err(Error::new(ErrorKind::InvalidData, format!("Expected 0 or 1 in unpack_bool but got {}", x))),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		if n > self.remaining() {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Opaque length runs past the end of the buffer"));
		}
		let ans:Vec<u8> = self.buff[self.pos..(self.pos + n)].to_vec();

		// Skip the padding, which may be missing after the final item
		let padded = (n + 3) & !3;
		self.pos = (self.pos + padded).min(self.buff.len());
		Ok(ans)
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opaque_is_padded_to_four_bytes() {
		let mut packer = Packer::new();
		packer.pack_variable_len_opaque(b"inst0").unwrap();
		assert_eq!(packer.get_buf(), &[0, 0, 0, 5, b'i', b'n', b's', b't', b'0', 0, 0, 0]);

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.get_buf());
		assert_eq!(unpacker.unpack_variable_len_opaque().unwrap(), b"inst0".to_vec());
		assert!(unpacker.all_data_consumed());
	}

	#[test]
	fn mixed_values_unpack_in_order() {
		let mut packer = Packer::new();
		packer.pack_u32(0x0607af).unwrap();
		packer.pack_i32(-3).unwrap();
		packer.pack_bool(true).unwrap();

		let mut unpacker = Unpacker::new();
		unpacker.reset(packer.get_buf());
		assert_eq!(unpacker.unpack_u32().unwrap(), 0x0607af);
		assert_eq!(unpacker.unpack_i32().unwrap(), -3);
		assert!(unpacker.unpack_bool().unwrap());
		assert!(unpacker.unpack_u32().is_err());
	}

	#[test]
	fn bad_bool_is_an_error() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0, 2]);
		assert_eq!(unpacker.unpack_bool().unwrap_err().kind(), ErrorKind::InvalidData);
	}

	#[test]
	fn opaque_longer_than_buffer_is_rejected() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0, 0, 0, 16, 1, 2, 3, 4]);
		assert!(unpacker.unpack_variable_len_opaque().is_err());
	}

	#[test]
	fn skip_keeps_alignment() {
		let mut unpacker = Unpacker::new();
		unpacker.reset(&[0; 8]);
		assert!(unpacker.skip(3).is_err());
		unpacker.skip(4).unwrap();
		assert_eq!(unpacker.remaining(), 4);
		assert!(unpacker.skip(8).is_err());
	}
}
