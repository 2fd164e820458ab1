pub mod pool;
pub mod repository;

pub use pool::{check_health, create_pool};
pub use repository::Repository;
