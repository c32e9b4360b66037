pub mod math;
pub mod sanitize;
pub mod text;
