pub mod server;

pub use server::CommandListener;
