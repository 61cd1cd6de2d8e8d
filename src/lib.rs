pub mod board;
pub mod flash;
pub mod layout;
pub mod nvram;
pub mod probe;
pub mod registry;
