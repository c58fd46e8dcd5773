pub mod check;
pub mod evidence;
pub mod run;
pub mod schema;
