use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use rtb2000::rpc::port_mapping::{Mapping, Protocol, TcpPortMapperClient, PMAPPROC_GETPORT};
use rtb2000::rpc::tcp_clients::{read_record, write_record};
use rtb2000::rpc::{xdr_pack as rpc_pack, xdr_unpack as rpc_unpack, OpaqueAuth};
use rtb2000::transport::Transport;
use rtb2000::vxi11::xdr_pack::*;
use rtb2000::vxi11::*;
use rtb2000::xdr::{Packer, Unpacker};

const MAX_RECV_SIZE: u32 = 16;
const READ_CHUNK: usize = 1000;
const LINK_ID: i32 = 7;

#[derive(Debug, Default)]
struct Transcript {
    device: String,
    // (bytes, END flag) for every DEVICE_WRITE
    writes: Vec<(usize, bool)>,
    // Every complete message the device took in
    messages: Vec<Vec<u8>>,
    reads: usize,
    cleared: bool,
    destroyed: bool,
}

// Ways a real device may answer that the client has to cope with
#[derive(Debug, Clone, Copy, Default)]
struct Quirks {
    // Accept only the first half (rounded up) of every DEVICE_WRITE
    half_writes: bool,
    // Mark every chunk but the last with REQCNT only
    reqcnt_chunks: bool,
    // Finish responses with CHR instead of END
    end_on_chr: bool,
}

fn reply(stream: &mut TcpStream, xid: u32, body: impl FnOnce(&mut Packer)) {
    let mut packer = Packer::new();
    rpc_pack::pack_replyheader(&mut packer, xid, &OpaqueAuth::none()).unwrap();
    body(&mut packer);
    write_record(stream, packer.get_buf()).unwrap();
}

// Answers *IDN? with a short line and DATA? with a block bigger than one read chunk
fn answer(msg: &[u8]) -> Vec<u8> {
    if msg.ends_with(b"DATA?") {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut block = rtb2000::scpi::format_block(&payload);
        block.push(b'\n');
        block
    } else {
        b"Rohde&Schwarz,RTB2004,1333.1005k04/102345,02.300\n".to_vec()
    }
}

fn spawn_core_server() -> (u16, JoinHandle<Transcript>) {
    spawn_quirky_core_server(Quirks::default())
}

fn spawn_quirky_core_server(quirks: Quirks) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut t = Transcript::default();
        let mut incoming: Vec<u8> = vec![];
        let mut outgoing: Vec<u8> = vec![];
        let mut unpacker = Unpacker::new();

        loop {
            let record = read_record(&mut stream).unwrap();
            unpacker.reset(&record);
            let hdr = rpc_unpack::unpack_callheader(&mut unpacker).unwrap();
            assert_eq!(hdr.prog, DEVICE_CORE_PROG);

            match hdr.prc {
                CREATE_LINK => {
                    let parms = unpack_create_link_parms(&mut unpacker).unwrap();
                    t.device = parms.device;
                    reply(&mut stream, hdr.xid, |p| pack_create_link_resp(p, 0, LINK_ID, 0, MAX_RECV_SIZE).unwrap());
                }
                DEVICE_WRITE => {
                    let (parms, data) = unpack_device_write_parms(&mut unpacker).unwrap();
                    assert_eq!(parms.link, LINK_ID);
                    assert!(data.len() <= MAX_RECV_SIZE as usize);
                    let end = parms.flags & OPERATION_FLAGS_END_ONLY != 0;
                    t.writes.push((data.len(), end));
                    let accepted = if quirks.half_writes { (data.len() + 1) / 2 } else { data.len() };
                    incoming.extend_from_slice(&data[..accepted]);
                    if end && accepted == data.len() {
                        outgoing = answer(&incoming);
                        t.messages.push(std::mem::take(&mut incoming));
                    }
                    reply(&mut stream, hdr.xid, |p| pack_device_write_resp(p, 0, accepted as u32).unwrap());
                }
                DEVICE_READ => {
                    let parms = unpack_device_read_parms(&mut unpacker).unwrap();
                    let n = outgoing.len().min(READ_CHUNK).min(parms.request_size as usize);
                    let chunk: Vec<u8> = outgoing.drain(..n).collect();
                    let reason = match (outgoing.is_empty(), quirks.end_on_chr, quirks.reqcnt_chunks) {
                        (true, true, _) => REASON_CHR,
                        (true, false, _) => REASON_END,
                        (false, _, true) => REASON_REQCNT,
                        (false, _, false) => 0,
                    };
                    t.reads += 1;
                    reply(&mut stream, hdr.xid, |p| pack_device_read_resp(p, 0, reason, &chunk).unwrap());
                }
                DEVICE_READSTB => {
                    unpack_device_generic_parms(&mut unpacker).unwrap();
                    reply(&mut stream, hdr.xid, |p| pack_device_read_stb_resp(p, 0, 0x04).unwrap());
                }
                DEVICE_CLEAR => {
                    unpack_device_generic_parms(&mut unpacker).unwrap();
                    t.cleared = true;
                    reply(&mut stream, hdr.xid, |p| pack_device_error(p, 0).unwrap());
                }
                DESTROY_LINK => {
                    assert_eq!(unpacker.unpack_i32().unwrap(), LINK_ID);
                    t.destroyed = true;
                    reply(&mut stream, hdr.xid, |p| pack_device_error(p, 0).unwrap());
                    return t;
                }
                other => panic!("unexpected procedure {}", other),
            }
        }
    });

    (port, handle)
}

#[test]
fn core_channel_round_trip() {
    let (port, server) = spawn_core_server();

    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    core.create_link(DEFAULT_DEVICE).unwrap();
    assert_eq!(core.link().unwrap().max_recv_size, MAX_RECV_SIZE);

    // 35 bytes against a 16 byte receive limit
    let cmd = b"FORM REAL,32;:CHAN1:DATA:POIN DATA?";
    let resp = core.ask(cmd).unwrap();
    let payload = rtb2000::scpi::parse_block(&resp).unwrap();
    assert_eq!(payload.len(), 3000);
    assert_eq!(payload[251], 0);

    let idn = core.ask(b"*IDN?").unwrap();
    assert!(idn.starts_with(b"Rohde&Schwarz,RTB2004"));

    assert_eq!(Transport::read_stb(&mut core).unwrap(), 0x04);
    Transport::clear(&mut core).unwrap();
    Transport::close(&mut core).unwrap();
    assert!(core.link().is_none());

    let t = server.join().unwrap();
    assert_eq!(t.device, "inst0");
    assert_eq!(&t.writes[..3], &[(16, false), (16, false), (3, true)]);
    assert_eq!(t.writes[3], (5, true));
    assert_eq!(t.messages, vec![cmd.to_vec(), b"*IDN?".to_vec()]);
    // 3007 bytes of block read 1000 at a time, plus one read for *IDN?
    assert_eq!(t.reads, 4 + 1);
    assert!(t.cleared);
    assert!(t.destroyed);
}

#[test]
fn operations_without_a_link_fail() {
    let (port, server) = spawn_core_server();
    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    assert_eq!(core.write(b"*IDN?").unwrap_err().kind(), ErrorKind::NotConnected);
    assert!(core.read().is_err());

    core.create_link(DEFAULT_DEVICE).unwrap();
    assert!(core.create_link(DEFAULT_DEVICE).is_err());
    core.destroy_link().unwrap();
    server.join().unwrap();
}

// Answers one GETPORT call with a reply per (xid offset, port) entry
fn spawn_port_mapper(replies: Vec<(i64, u32)>) -> (u16, JoinHandle<Mapping>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let record = read_record(&mut stream).unwrap();
        let mut unpacker = Unpacker::new();
        unpacker.reset(&record);
        let hdr = rpc_unpack::unpack_callheader(&mut unpacker).unwrap();
        assert_eq!(hdr.prc, PMAPPROC_GETPORT);

        let program = unpacker.unpack_u32().unwrap();
        let version = unpacker.unpack_u32().unwrap();
        let protocol = if unpacker.unpack_u32().unwrap() == 6 { Protocol::TCP } else { Protocol::UDP };
        let port = unpacker.unpack_u32().unwrap();

        for (offset, answer_port) in replies {
            let xid = (hdr.xid as i64 + offset) as u32;
            reply(&mut stream, xid, |p| p.pack_u32(answer_port).unwrap());
        }
        Mapping { program, version, protocol, port }
    });

    (port, handle)
}

fn core_mapping() -> Mapping {
    Mapping { program: DEVICE_CORE_PROG, version: DEVICE_CORE_VERS, protocol: Protocol::TCP, port: 0 }
}

#[test]
fn port_mapper_finds_core_channel() {
    let (port, server) = spawn_port_mapper(vec![(0, 1024)]);
    let mut pmap = TcpPortMapperClient::connect(("127.0.0.1", port)).unwrap();
    assert_eq!(pmap.get_port(&core_mapping()).unwrap(), 1024);

    let seen = server.join().unwrap();
    assert_eq!(seen.program, DEVICE_CORE_PROG);
    assert_eq!(seen.version, DEVICE_CORE_VERS);
    assert_eq!(seen.protocol, Protocol::TCP);
}

#[test]
fn unregistered_program_is_not_found() {
    let (port, server) = spawn_port_mapper(vec![(0, 0)]);
    let mut pmap = TcpPortMapperClient::connect(("127.0.0.1", port)).unwrap();
    assert_eq!(pmap.get_port(&core_mapping()).unwrap_err().kind(), ErrorKind::NotFound);
    server.join().unwrap();
}

#[test]
fn stale_reply_is_skipped() {
    // A late answer to an earlier call arrives before the real one
    let (port, server) = spawn_port_mapper(vec![(-1, 9999), (0, 4000)]);
    let mut pmap = TcpPortMapperClient::connect(("127.0.0.1", port)).unwrap();
    assert_eq!(pmap.get_port(&core_mapping()).unwrap(), 4000);
    server.join().unwrap();
}

#[test]
fn reply_from_the_future_is_rejected() {
    let (port, server) = spawn_port_mapper(vec![(1, 4000)]);
    let mut pmap = TcpPortMapperClient::connect(("127.0.0.1", port)).unwrap();
    assert_eq!(pmap.get_port(&core_mapping()).unwrap_err().kind(), ErrorKind::InvalidData);
    server.join().unwrap();
}

#[test]
fn partially_accepted_write_is_resent() {
    let (port, server) = spawn_quirky_core_server(Quirks { half_writes: true, ..Quirks::default() });
    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    core.create_link(DEFAULT_DEVICE).unwrap();

    core.write(b"TIM:ACQT 0.01").unwrap();
    core.destroy_link().unwrap();

    let t = server.join().unwrap();
    // 13 bytes: 7 accepted, then 3 of 6, 2 of 3, 1 of 1
    assert_eq!(t.writes, vec![(13, true), (6, true), (3, true), (1, true)]);
    assert_eq!(t.messages, vec![b"TIM:ACQT 0.01".to_vec()]);
}

#[test]
fn partial_accepts_across_chunks_keep_end_for_the_last() {
    let (port, server) = spawn_quirky_core_server(Quirks { half_writes: true, ..Quirks::default() });
    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    core.create_link(DEFAULT_DEVICE).unwrap();

    // 21 bytes against the 16 byte receive limit
    let cmd = b"CHAN1:RANG 5.0;OFFS 0";
    core.write(cmd).unwrap();
    core.destroy_link().unwrap();

    let t = server.join().unwrap();
    let ends: Vec<bool> = t.writes.iter().map(|&(_, end)| end).collect();
    assert!(!ends[0]);
    assert!(*ends.last().unwrap());
    assert_eq!(t.writes.iter().filter(|&&(n, _)| n == 16).count(), 1);
    assert_eq!(t.messages, vec![cmd.to_vec()]);
}

#[test]
fn read_finishes_on_term_char() {
    let (port, server) = spawn_quirky_core_server(Quirks { end_on_chr: true, ..Quirks::default() });
    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    core.create_link(DEFAULT_DEVICE).unwrap();

    let idn = core.ask(b"*IDN?").unwrap();
    assert!(idn.ends_with(b"\n"));
    core.destroy_link().unwrap();

    let t = server.join().unwrap();
    assert_eq!(t.reads, 1);
}

#[test]
fn read_continues_after_request_count_chunks() {
    let (port, server) = spawn_quirky_core_server(Quirks { reqcnt_chunks: true, ..Quirks::default() });
    let mut core = CoreClient::connect_port("127.0.0.1", port).unwrap();
    core.create_link(DEFAULT_DEVICE).unwrap();

    let resp = core.ask(b"CHAN1:DATA?").unwrap();
    assert_eq!(rtb2000::scpi::parse_block(&resp).unwrap().len(), 3000);
    core.destroy_link().unwrap();

    let t = server.join().unwrap();
    assert_eq!(t.reads, 4);
}
