pub mod handlers;
pub mod middleware;
pub mod token;
pub mod types;

pub use handlers::create_session;
pub use middleware::{jwt_auth, jwt_auth_optional};
pub use token::TokenConfig;
pub use types::SessionClaims;
