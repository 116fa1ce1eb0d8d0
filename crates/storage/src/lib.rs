#![forbid(unsafe_code)]

pub mod aof;
mod db;

pub use aof::{Aof, AofGuard, FsyncPolicy};
pub use db::{Db, ExpiryTable, Store, now_ms};
