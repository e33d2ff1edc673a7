pub mod budget;
pub mod check;
pub mod cleanup;
pub mod config;
pub mod locate;
pub mod run;
pub mod status;
