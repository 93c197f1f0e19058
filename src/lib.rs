// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Plain SCPI over a TCP socket, for instruments (or networks) where VXI-11 isn't an option
pub mod socket;

// VISA resource strings and the transports they select
pub mod resource;
pub mod transport;

// IEEE 488.2 message formats: blocks, float lists, error queue entries
pub mod scpi;

// An SCPI session on top of a transport, with OPC synchronisation and error queue checking
pub mod instrument;

// Module for devices driven through an instrument session
pub mod devices;

pub mod config;
pub mod error;

pub use error::{Error, Result};
pub use instrument::Instrument;
pub use devices::rtb2000::Rtb2000;
