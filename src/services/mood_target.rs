/// Target audio features used to steer Spotify's similarity search toward a mood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodTarget {
    pub energy: f64,
    pub valence: f64,
}

impl MoodTarget {
    pub fn for_mood(mood: &str) -> Self {
        let (energy, valence) = match mood.trim().to_lowercase().as_str() {
            "happy" => (0.7, 0.8),
            "sad" => (0.3, 0.2),
            "energetic" => (0.9, 0.7),
            "calm" | "peaceful" => (0.3, 0.6),
            _ => (0.5, 0.5),
        };
        Self { energy, valence }
    }

    /// Keyword query used when the similarity endpoint is unavailable.
    pub fn fallback_query(&self) -> &'static str {
        if self.valence > 0.6 {
            "happy upbeat"
        } else if self.energy > 0.7 {
            "energetic"
        } else {
            "chill relaxing"
        }
    }
}
