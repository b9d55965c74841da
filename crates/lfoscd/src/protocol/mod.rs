//! Protocol dispatch engine.
//!
//! Every supported wire protocol is represented by a [`ProtocolAdapter`].
//! Listeners hand raw input to the [`ProtocolRegistry`], which asks each
//! adapter in registration order to recognise it, refines the first match
//! into a [`ProtocolData`], and routes it to the adapter owning the target
//! protocol.

mod adapter;
mod data;
mod errors;
mod registry;
mod tokenizer;

pub use self::adapter::{CommandContext, ProtocolAdapter, RawInput, configure_decoded, decode};
pub use self::data::{Argument, ProtocolData};
pub use self::errors::{ProtocolError, RegistryError};
pub use self::registry::ProtocolRegistry;
pub use self::tokenizer::{classify, tokenize};

const PROTOCOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::protocol");
