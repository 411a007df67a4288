pub mod translations;

pub use translations::{render, translate, Language, Phrase};
