pub mod capture_source;
pub mod engine_observer;
pub mod result_handler;
pub mod stream_sink;
