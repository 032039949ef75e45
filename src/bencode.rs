//! Bencode decoding and encoding ([BEP-3]).
//!
//! HTTP trackers answer scrape requests with a bencoded dictionary:
//!
//! ```text
//! d5:filesd20:<info hash>d8:completei5e10:downloadedi42e10:incompletei3eeee
//! ```
//!
//! This module only carries what that response format needs: a [`Value`]
//! tree, a strict [`decode`] and a canonical [`encode`] (the latter is used
//! to build tracker bodies in tests and tooling).
//!
//! # Examples
//!
//! ```
//! use tscrape::bencode::{decode, Value};
//!
//! let value = decode(b"d8:completei5ee").unwrap();
//! assert_eq!(value.get(b"complete").and_then(Value::as_integer), Some(5));
//! ```
//!
//! Decoding rejects leading zeros, non-string dictionary keys, nesting deeper
//! than 64 levels and trailing bytes after the top-level value.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
