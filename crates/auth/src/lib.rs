//! `millbook-auth` — authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize, role_permissions};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use credentials::PasswordHash;
pub use jwt::{Hs256JwtValidator, Hs256TokenIssuer, JwtValidator, TokenError};
pub use permissions::Permission;
pub use principal::{MillMembership, PrincipalId};
pub use roles::Role;
pub use user::{
    ActivateUser, AssignRole, ChangePassword, CreateUser, RevokeRole, SuspendUser, User,
    UserCommand, UserEvent, UserStatus,
};
