pub mod health;
pub mod insights;
pub mod mood_entries;
pub mod music;
pub mod recommendations;
pub mod spotify;
pub mod system;
pub mod users;
