pub mod permission;
pub mod session;

pub use permission::PermissionManager;
pub use session::IdentitySessionManager;
