//! Domain types of the interop bus.

pub mod errors;
pub mod methods;

pub use errors::InteropError;
pub use methods::{
    HandlerFuture, InstanceFilter, InvocationResult, MethodDefinition, MethodHandler,
    MethodTarget,
};
