//! Gate orchestration — middleware, server, and origin pass-through.

pub mod handler;
pub mod server;

pub use handler::{GateContext, Rejection, gate_middleware};
pub use server::Gate;
