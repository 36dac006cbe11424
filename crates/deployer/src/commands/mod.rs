pub mod deploy;
pub mod probe;
pub mod teardown;
pub mod validate;
