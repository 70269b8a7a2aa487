pub mod assemble;
pub mod catalog;
pub mod geodesic;
pub mod import;
pub mod parse;
pub mod timezone;
