//! MongoDB server error codes the store needs to recognise.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a unique-index violation.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// The name of the index that a duplicate-key error tripped over, if the server reported it.
pub fn duplicate_key_index(err: &DbError) -> Option<String> {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        if e.code == DUPLICATE_KEY {
            // Messages look like "E11000 duplicate key error collection: db.coll index: name dup key: {...}"
            return e
                .message
                .split("index: ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .map(str::to_string);
        }
    }
    None
}
