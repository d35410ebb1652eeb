/// Command recording module

pub mod command_buffer;

pub use command_buffer::*;
