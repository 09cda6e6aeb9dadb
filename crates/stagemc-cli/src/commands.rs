pub mod fold;
pub mod template;
