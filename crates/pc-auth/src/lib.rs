pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::{Claims, JwtService};
pub use middleware::{audit_middleware, AuthMiddleware};
pub use models::AuthContext;

pub use pc_error::{PcError, Result};
