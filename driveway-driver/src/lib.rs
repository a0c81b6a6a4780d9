//! Provider seams consumed by the driveway mesh core.
//!
//! The core never talks to hardware or persistence directly; everything
//! passes through the traits in this crate. The application wires concrete
//! implementations (radio glue, NVS-backed storage, RTC) at bring-up, and
//! tests substitute in-memory fakes.

#![cfg_attr(not(test), no_std)]

pub mod kv;
pub mod radio;
pub mod telemetry;
pub mod time;

pub use kv::{KvStore, MemKv, StrValue, MAX_KEY_LEN};
pub use radio::{Radio, RadioError};
pub use telemetry::{
    BoardTemp, Cooling, Direction, PmsTelemetry, RelayBank, SensorSnapshot, SensorSource,
    TfLunaPair, MAX_TF_LUNA_PAIRS,
};
pub use time::{Monotonic, Rtc};
