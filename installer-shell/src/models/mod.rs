pub mod message;
pub mod runtime_data;
pub mod state;
