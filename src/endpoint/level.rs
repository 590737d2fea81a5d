//! Audio level classification
//!
//! The capture subsystem reports one integer RMS level per frame while a
//! session is recording. Each sample is classified against a fixed threshold.

/// Classification of a single audio level sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelClass {
    /// Level 0: capture is not active (or was reset)
    Idle,
    /// Below the threshold: the user is not speaking
    Silence,
    /// At or above the threshold: speech or background noise
    Noise,
}

impl LevelClass {
    /// Classify a level sample against the endpoint threshold
    pub fn classify(level: u32, threshold: u32) -> Self {
        if level == 0 {
            LevelClass::Idle
        } else if level < threshold {
            LevelClass::Silence
        } else {
            LevelClass::Noise
        }
    }

    /// Whether this sample should cancel a pending endpoint
    pub fn interrupts_silence(&self) -> bool {
        !matches!(self, LevelClass::Silence)
    }
}

impl std::fmt::Display for LevelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelClass::Idle => write!(f, "idle"),
            LevelClass::Silence => write!(f, "silence"),
            LevelClass::Noise => write!(f, "noise"),
        }
    }
}
