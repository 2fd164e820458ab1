pub mod insight;
pub mod mood_entry;
pub mod music_analysis;
pub mod recommendation;
pub mod user;
