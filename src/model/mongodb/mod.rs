mod bson;
mod collection;
mod errors;

pub use bson::{id_as_hex, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection, ACCOUNT_EMAIL_INDEX};
pub use errors::{duplicate_key_index, is_duplicate_key_error, DUPLICATE_KEY};
