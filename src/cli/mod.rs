pub mod command;
pub mod probe;
pub mod run;
