mod request;
mod token;
mod user;

pub use request::{CodeRequestBody, ExchangeRequest, StaffCredentials, VerifyRequest};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Rights, User};
