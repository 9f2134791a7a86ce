//! Value codec: formats, byte order, typed values and rational approximation.
//!
//! Every function here takes the byte order as an explicit argument. Nested
//! blocks that use a different order than their parent simply pass their own
//! [`ByteOrder`] down; nothing is stored globally.

pub mod format;
pub mod order;
pub mod rational;
pub mod value;

pub use format::Format;
pub use order::ByteOrder;
pub use rational::{rationalize, rationalize_bounded};
pub use value::{decode, encode, encode_into, Encoded, Value};
