//! Report authorization
//!
//! Role resolution and the mutation rules for reports. Everything here is
//! pure: callers load the facts, the functions decide.

pub mod authorizer;
pub mod role;

pub use authorizer::{authorize_create, authorize_delete, authorize_update, Denial};
pub use role::{Role, RoleFacts, RoleSet};
