pub mod payload;
pub mod time;
