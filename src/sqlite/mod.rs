// SQLite backend: a `Connection` implementation on top of rusqlite.
//
// - connection: the `Connection` impl and error classification
// - params: conversion from `RowValues` to SQLite values
// - query: row extraction into a `ResultSet`

pub mod connection;
pub mod params;
pub mod query;

pub use connection::SqliteConnection;
pub use query::build_result_set;
