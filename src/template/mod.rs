pub mod blocks;
pub mod logframe;
pub mod placeholder;
pub mod records;

pub use blocks::{append_table, insert_bullet_list, insert_image, ImageTarget};
pub use placeholder::{resolve, PolicyTable, ReplacePolicy, Replacements, ResolveReport};
