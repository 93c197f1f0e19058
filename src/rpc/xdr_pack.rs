use std::io;

use crate::xdr::Packer;
use crate::rpc::{CALL, RPCVERSION, REPLY, MSG_ACCEPTED, SUCCESS, CallHeader, OpaqueAuth};

pub fn pack_auth(packer:&mut Packer, auth:&OpaqueAuth) -> io::Result<()> {
	packer.pack_enum(auth.flavor)?;
	packer.pack_variable_len_opaque(&auth.body)
}

pub fn pack_callheader(packer:&mut Packer, hdr:&CallHeader, cred:&OpaqueAuth, verf:&OpaqueAuth) -> io::Result<()> {
	packer.pack_u32(hdr.xid)?;
	packer.pack_enum(CALL)?;
	packer.pack_u32(RPCVERSION)?;
	packer.pack_u32(hdr.prog)?;
	packer.pack_u32(hdr.vers)?;
	packer.pack_u32(hdr.prc)?;
	pack_auth(packer, cred)?;
	pack_auth(packer, verf)
}

pub fn pack_callheader_no_auth(packer:&mut Packer, xid:u32, prog:u32, vers:u32, prc:u32) -> io::Result<()> {
	let none = OpaqueAuth::none();
	pack_callheader(packer, &CallHeader{ xid, prog, vers, prc }, &none, &none)
}

// Accepted, successful reply.  The procedure's results follow.
pub fn pack_replyheader(packer:&mut Packer, xid:u32, verf:&OpaqueAuth) -> io::Result<()> {
	packer.pack_u32(xid)?;
	packer.pack_enum(REPLY)?;
	packer.pack_enum(MSG_ACCEPTED)?;
	pack_auth(packer, verf)?;
	packer.pack_enum(SUCCESS)
}

pub fn pack_mapping(packer:&mut Packer, prog:u32, vers:u32, prot:u32, port:u32) -> io::Result<()> {
	packer.pack_u32(prog)?;
	packer.pack_u32(vers)?;
	packer.pack_u32(prot)?;
	packer.pack_u32(port)
}
