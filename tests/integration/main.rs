//! Cross-crate property checks over generated graphs

mod scenario;
