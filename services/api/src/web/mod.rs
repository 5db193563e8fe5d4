pub mod callback;
pub mod rest;
pub mod state;

// Re-export the handlers so the binary that builds the router can reach them
// without digging through submodules.
pub use callback::local_callback_handler;
pub use rest::{email_in_db_handler, hello_handler, root_handler};
