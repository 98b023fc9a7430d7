//! Small shared building blocks.
//!
//! - [`BitSet`] - Growable bit vector used for per-symbol boolean tables
//! - [`xml`] - Owned element tree for linker descriptors

mod bitset;
pub mod xml;

pub use bitset::BitSet;
pub use xml::XmlElement;
