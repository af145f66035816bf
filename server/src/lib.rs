//! Language server bridging editors to the external `quillc` compiler CLI.
//!
//! The server speaks JSON-RPC over byte streams, shells out to `quillc`
//! with an `analyze` or `fmt` mode flag, and translates the compiler's
//! textual output into published diagnostics or a whole-document
//! formatting edit.

pub mod codec;
pub mod protocol;
pub mod server;

pub mod analysis;
pub mod compiler;
pub mod documents;
pub mod formatting;
pub mod settings;
