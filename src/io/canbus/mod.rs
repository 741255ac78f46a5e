// src/io/canbus/mod.rs
//
// CanBus text protocol spoken by the charger's serial adapter:
//
//   CanBus <Rx|Tx> [0x]<hex id> <byte> <byte> ...\n
//
// Each byte is exactly two hex digits. One frame per line.

pub mod codec;
pub mod reassembler;
pub mod session;

pub use codec::{format_canbus_line, parse_canbus_line, CanBusCodec};
pub use reassembler::{
    Events, OverflowPolicy, ReassemblerConfig, StreamEvent, StreamReassembler,
    DEFAULT_MAX_BUFFERED,
};
pub use session::{SessionConfig, TransportSession};
