pub mod auto_save;
pub mod engine;
mod worker;
