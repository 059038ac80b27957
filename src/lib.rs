#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod bitreader;
pub mod compression;
pub mod entityclasses;
pub mod fieldpath;
pub mod fieldvalue;
pub mod flattenedserializers;
pub mod instancebaseline;
pub mod parser;
pub mod propertyserializers;
pub mod protos;
pub mod quantizedfloat;
pub mod stringtables;

pub use parser::Parser;
