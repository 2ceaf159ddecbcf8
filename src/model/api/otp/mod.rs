mod code;

pub use code::{Code, ParseError, CODE_LENGTH};
