// SQLite driver built on rusqlite.
//
// - connection: the `Connection` implementation and auto-commit emulation
// - statement: prepared statements, batches and cursors
// - params: conversion between `RowValues` and rusqlite values

mod connection;
mod params;
mod statement;

pub use connection::{SqliteConnection, SqliteDriver};
pub use params::{row_value_to_sqlite_value, sqlite_value_to_row_value};
