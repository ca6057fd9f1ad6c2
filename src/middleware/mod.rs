// Middleware modules
pub mod capture;
pub mod logging;

pub use logging::{http_logger, HttpLogger};
