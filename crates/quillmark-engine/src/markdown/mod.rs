//! The markdown boundary: text in, block tree out, and back again.

mod parse;
mod serialize;

pub use parse::parse_markdown;
pub use serialize::serialize_markdown;
