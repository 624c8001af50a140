mod row;
mod rows;

pub use row::Row;
pub use rows::Rows;
