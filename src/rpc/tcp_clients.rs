use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::{debug, trace};

use crate::xdr;
use super::{xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x80000000;

// Record marking (RFC 5531 section 11): each fragment is preceded by a u32 holding its length, with the
// high bit set on the last fragment of the record
pub fn write_record<W: Write>(stream:&mut W, record:&[u8]) -> io::Result<()> {
	let mut send_bytes:Vec<u8> = Vec::with_capacity(record.len() + 4);
	send_bytes.write_u32::<BigEndian>(record.len() as u32 | LAST_FRAGMENT)?;
	send_bytes.extend_from_slice(record);
	stream.write_all(&send_bytes)?;
	stream.flush()
}

pub fn read_record<R: Read>(stream:&mut R) -> io::Result<Vec<u8>> {
	let mut record:Vec<u8> = vec![];

	let mut last:bool = false;
	while !last {
		let x:u32 = stream.read_u32::<BigEndian>()?;

		last = (x & LAST_FRAGMENT) != 0;
		let n = (x & !LAST_FRAGMENT) as usize;

		let start = record.len();
		record.resize(start + n, 0);
		stream.read_exact(&mut record[start..])?;
	}

	Ok(record)
}

pub struct TcpClient {
	pub stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32) -> io::Result<Self> {
		let stream = TcpStream::connect(addr)?;
		stream.set_nodelay(true)?;
		debug!("Connected RPC program {:#x} v{} to {}", prog, vers, stream.peer_addr()?);
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	pub fn set_read_timeout(&mut self, timeout:Option<Duration>) -> io::Result<()> {
		self.stream.set_read_timeout(timeout)
	}

	// Bumps the xid and leaves the packer holding a call header; arguments get packed after this
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends whatever is in the packer and leaves the results of the matching reply in the unpacker
	pub fn do_call(&mut self) -> io::Result<()> {
		trace!("RPC call xid={} ({} bytes)", self.lastxid, self.packer.get_buf().len());
		write_record(&mut self.stream, self.packer.get_buf())?;

		loop {
			let reply:Vec<u8> = read_record(&mut self.stream)?;

			// Load the response into the unpacker and make sure the xid matches
			self.unpacker.reset(&reply);

			let (xid, _) = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				// Packet from the present
				return Ok(());
			} else if xid < self.lastxid {
				// Packet from the past, probably the answer to a call that timed out
				debug!("Discarding stale RPC reply xid={} (expecting {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, format!("Got reply xid={} ahead of the last call xid={}", xid, self.lastxid)));
			}
		}
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn multi_fragment_record_is_joined() {
		let mut wire:Vec<u8> = vec![];
		wire.write_u32::<BigEndian>(4).unwrap();
		wire.extend_from_slice(&[1, 2, 3, 4]);
		wire.write_u32::<BigEndian>(4 | LAST_FRAGMENT).unwrap();
		wire.extend_from_slice(&[5, 6, 7, 8]);

		let record = read_record(&mut Cursor::new(wire)).unwrap();
		assert_eq!(record, vec![1, 2, 3, 4, 5, 6, 7, 8]);
	}

	#[test]
	fn written_record_reads_back() {
		let mut wire:Vec<u8> = vec![];
		write_record(&mut wire, &[9, 9, 9, 9]).unwrap();
		assert_eq!(&wire[..4], &[0x80, 0, 0, 4]);
		assert_eq!(read_record(&mut Cursor::new(wire)).unwrap(), vec![9, 9, 9, 9]);
	}

	#[test]
	fn truncated_record_is_an_error() {
		let mut wire:Vec<u8> = vec![];
		wire.write_u32::<BigEndian>(8 | LAST_FRAGMENT).unwrap();
		wire.extend_from_slice(&[1, 2, 3]);
		assert!(read_record(&mut Cursor::new(wire)).is_err());
	}
}
