//! In-process persistence. Each map shard is locked independently, so a
//! `get_mut` gives an atomic read-modify-write on exactly one record.

pub mod reviews;
pub mod trips;
pub mod users;
