pub mod poll;
pub mod realtime;
