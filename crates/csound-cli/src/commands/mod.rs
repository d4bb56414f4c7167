pub mod ast;
pub mod message;
pub mod opcodes;
pub mod play;
pub mod utilities;
