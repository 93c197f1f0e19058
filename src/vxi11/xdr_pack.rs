use std::io::{self, Error, ErrorKind};

use crate::xdr::{Packer, Unpacker};

use super::{CreateLinkParms, DeviceGenericParms, DeviceReadParms, DeviceWriteParms};

pub fn pack_create_link_parms(packer:&mut Packer, p:&CreateLinkParms) -> io::Result<()> {
	if !p.device.is_ascii() {
		return Err(Error::new(ErrorKind::InvalidInput, "VXI-11 device names must be ASCII"));
	}
	packer.pack_i32(p.client_id)?;
	packer.pack_bool(p.lock_device)?;
	packer.pack_u32(p.lock_timeout)?;
	packer.pack_variable_len_opaque(p.device.as_bytes())
}

pub fn unpack_create_link_parms(unpacker:&mut Unpacker) -> io::Result<CreateLinkParms> {
	let client_id    = unpacker.unpack_i32()?;
	let lock_device  = unpacker.unpack_bool()?;
	let lock_timeout = unpacker.unpack_u32()?;
	let device = String::from_utf8(unpacker.unpack_variable_len_opaque()?)
		.map_err(|_| Error::new(ErrorKind::InvalidData, "Device name is not UTF-8"))?;
	Ok(CreateLinkParms{ client_id, lock_device, lock_timeout, device })
}

pub fn pack_device_write_parms(packer:&mut Packer, p:&DeviceWriteParms, data:&[u8]) -> io::Result<()> {
	packer.pack_i32(p.link)?;
	packer.pack_u32(p.io_timeout)?;
	packer.pack_u32(p.lock_timeout)?;
	packer.pack_i32(p.flags)?;
	packer.pack_variable_len_opaque(data)
}

pub fn unpack_device_write_parms(unpacker:&mut Unpacker) -> io::Result<(DeviceWriteParms, Vec<u8>)> {
	let link         = unpacker.unpack_i32()?;
	let io_timeout   = unpacker.unpack_u32()?;
	let lock_timeout = unpacker.unpack_u32()?;
	let flags        = unpacker.unpack_i32()?;
	let data         = unpacker.unpack_variable_len_opaque()?;
	Ok((DeviceWriteParms{ link, io_timeout, lock_timeout, flags }, data))
}

pub fn pack_device_read_parms(packer:&mut Packer, p:&DeviceReadParms) -> io::Result<()> {
	packer.pack_i32(p.link)?;
	packer.pack_u32(p.request_size)?;
	packer.pack_u32(p.io_timeout)?;
	packer.pack_u32(p.lock_timeout)?;
	packer.pack_i32(p.flags)?;
	packer.pack_i32(p.term_char)
}

pub fn unpack_device_read_parms(unpacker:&mut Unpacker) -> io::Result<DeviceReadParms> {
	Ok(DeviceReadParms{
		link:         unpacker.unpack_i32()?,
		request_size: unpacker.unpack_u32()?,
		io_timeout:   unpacker.unpack_u32()?,
		lock_timeout: unpacker.unpack_u32()?,
		flags:        unpacker.unpack_i32()?,
		term_char:    unpacker.unpack_i32()?,
	})
}

pub fn pack_device_generic_parms(packer:&mut Packer, p:&DeviceGenericParms) -> io::Result<()> {
	packer.pack_i32(p.link)?;
	packer.pack_i32(p.flags)?;
	packer.pack_u32(p.lock_timeout)?;
	packer.pack_u32(p.io_timeout)
}

pub fn unpack_device_generic_parms(unpacker:&mut Unpacker) -> io::Result<DeviceGenericParms> {
	Ok(DeviceGenericParms{
		link:         unpacker.unpack_i32()?,
		flags:        unpacker.unpack_i32()?,
		lock_timeout: unpacker.unpack_u32()?,
		io_timeout:   unpacker.unpack_u32()?,
	})
}

// Responses.  The client only unpacks these, a server (or a test double) packs them.

pub fn pack_device_error(packer:&mut Packer, error:i32) -> io::Result<()> {
	packer.pack_i32(error)
}

pub fn pack_create_link_resp(packer:&mut Packer, error:i32, link:i32, abort_port:u32, max_recv_size:u32) -> io::Result<()> {
	packer.pack_i32(error)?;
	packer.pack_i32(link)?;
	packer.pack_u32(abort_port)?;
	packer.pack_u32(max_recv_size)
}

pub fn pack_device_write_resp(packer:&mut Packer, error:i32, size:u32) -> io::Result<()> {
	packer.pack_i32(error)?;
	packer.pack_u32(size)
}

pub fn pack_device_read_resp(packer:&mut Packer, error:i32, reason:i32, data:&[u8]) -> io::Result<()> {
	packer.pack_i32(error)?;
	packer.pack_i32(reason)?;
	packer.pack_variable_len_opaque(data)
}

pub fn pack_device_read_stb_resp(packer:&mut Packer, error:i32, stb:u8) -> io::Result<()> {
	packer.pack_i32(error)?;
	packer.pack_u32(stb as u32)
}
