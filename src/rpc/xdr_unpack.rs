use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{CALL, REPLY, RPCVERSION, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SUCCESS, CallHeader, OpaqueAuth};

fn err(msg:String) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<OpaqueAuth> {
	let flavor:i32   = unpacker.unpack_enum()?;
	let body:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok(OpaqueAuth{ flavor, body })
}

pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<(u32, OpaqueAuth)> {
	let xid:u32 = unpacker.unpack_u32()?;

	let mtype:i32 = unpacker.unpack_enum()?;
	if mtype != REPLY { return Err(err(format!("Expected REPLY message type for xid {} but got {}", xid, mtype))); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					return Err(err(format!("Message denied, server supports RPC versions {} to {}", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					return Err(err(format!("Message denied due to AUTH_ERROR (status {})", stat)))
				},
				x => return Err(err(format!("Message denied for an unknown reason ({})", x))),
			}
		},
		MSG_ACCEPTED => { },
		x => return Err(err(format!("Neither MSG_DENIED nor MSG_ACCEPTED in reply header ({})", x))),
	}

	let verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok((xid, verf)),
		PROG_UNAVAIL  => Err(err("Program unavailable".to_owned())),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(err(format!("Program mismatch, server supports versions {} to {}", low, high)))
		},
		PROC_UNAVAIL  => Err(err("Procedure unavailable".to_owned())),
		GARBAGE_ARGS  => Err(err("Server could not decode the call arguments".to_owned())),
		x             => Err(err(format!("Call failed for unknown reason ({})", x))),
	}
}

// Server side of the exchange; credentials are read and discarded
pub fn unpack_callheader(unpacker:&mut Unpacker) -> io::Result<CallHeader> {
	let xid:u32 = unpacker.unpack_u32()?;

	let mtype:i32 = unpacker.unpack_enum()?;
	if mtype != CALL { return Err(err(format!("Expected CALL message type but got {}", mtype))); }

	let rpcvers:u32 = unpacker.unpack_u32()?;
	if rpcvers != RPCVERSION { return Err(err(format!("Unsupported RPC version {}", rpcvers))); }

	let prog:u32 = unpacker.unpack_u32()?;
	let vers:u32 = unpacker.unpack_u32()?;
	let prc:u32  = unpacker.unpack_u32()?;
	unpack_auth(unpacker)?;
	unpack_auth(unpacker)?;

	Ok(CallHeader{ xid, prog, vers, prc })
}
