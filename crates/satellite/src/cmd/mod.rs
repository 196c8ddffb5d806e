pub mod docs;
pub mod start;
