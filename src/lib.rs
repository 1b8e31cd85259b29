//! ECHONET Lite application-layer protocol core: frame codec, per-object
//! property store, and the request/response dispatch engine.
//!
//! See [`node::Node`] for the entry point.

pub mod codec;
pub mod error;
pub mod eoj;
pub mod node;
pub mod store;

pub use codec::{Esv, Frame, Property};
pub use error::{CodecError, EchonetError};
pub use eoj::{Eoj, CONTROLLER, NODE_PROFILE};
pub use node::{Callback, Node, NodeConfig};
pub use store::{MapKind, PropertyStore, PropertyValue};
