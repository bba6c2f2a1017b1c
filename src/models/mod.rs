pub mod entity;
pub mod field;
pub mod record;

pub use entity::*;
pub use field::*;
pub use record::*;
