//! # Shared Types Crate
//!
//! Cross-crate data model for the Window-Mesh interop bus: peer identity,
//! the wire envelope, payload validation, and the library-controller
//! contract every domain module implements.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary
//!   lives here.
//! - **Envelope Integrity**: all traffic between peers is one of the three
//!   `WireEnvelope` shapes; responses correlate by `CommandId` only.
//! - **Validate at the Gate**: payloads are checked by `Decoder`s at the
//!   bridge boundary, inbound and outbound; invalid data never crosses.

pub mod controller;
pub mod decoder;
pub mod entities;
pub mod envelope;
pub mod operations;

pub use controller::{ControlArgs, ControllerConfig, ControllerError, ControllerStatus, LibController};
pub use decoder::{Decoder, DecodeError, DynDecoder, ObjectDecoder, ValueKind};
pub use entities::{Instance, InstanceId, RawIdentity};
pub use envelope::{error_codes, CommandId, WireEnvelope, WireError};
pub use operations::{BridgeOperation, CallContext, OperationRegistry};
