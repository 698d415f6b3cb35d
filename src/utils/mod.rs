pub mod logging;

pub use logging::{init_tracing, log_startup, print_final_summary};
