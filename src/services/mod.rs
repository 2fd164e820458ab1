pub mod ai;
pub mod llm;
pub mod mood_target;
pub mod spotify;
