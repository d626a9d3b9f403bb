#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]

pub mod call;
pub mod calls;
pub mod config;
pub mod crypto;
pub mod event;
pub mod extrinsic;
pub mod multisig;

pub use call::{CallDescriptor, Value};
