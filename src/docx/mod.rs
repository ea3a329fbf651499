pub mod document;
pub mod drawing;
pub mod package;
pub mod rels;
pub mod table;
pub mod wml;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;
