pub mod dom;
pub mod submit;
