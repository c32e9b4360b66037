pub mod plan;
pub mod route;
pub mod session;
