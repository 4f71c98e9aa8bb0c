pub mod channels;
pub mod command;
