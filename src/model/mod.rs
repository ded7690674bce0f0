pub mod connection;
pub mod interface;
pub mod skapp;

pub use connection::ConnectionInfo;
pub use interface::ProviderInterface;
pub use skapp::SkappInfo;
