pub mod descriptor;
pub mod error;
pub mod legacy;
pub mod request;
pub mod resolution;
pub mod resolver;
pub mod runtime;
pub mod store;
pub mod topdir;
pub mod version;
