mod email;
mod role;
mod status;

pub use email::{Email, EmailError};
pub use role::Role;
pub use status::InstanceStatus;
