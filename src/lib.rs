// src/lib.rs
//
// Serial CAN-bus bridge library. The `io` module turns `CanBus Rx/Tx` text
// lines from a serial adapter into frame events; `charger` decodes the EVO
// charger packets those frames carry.

#[macro_use]
pub mod logging;

pub mod charger;
pub mod io;
pub mod settings;
