pub(crate) mod error;
pub mod retry;
pub mod text;
pub mod time;
