pub mod device;
pub mod discovery;
pub mod models;
pub mod parameters;
pub mod settings;
