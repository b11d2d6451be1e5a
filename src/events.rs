use crate::{protocol::ChatMessage, workers::ConnectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// Found in live chat; admitted ones feed the test pool.
    Chat,
    /// Synthetic traffic from the test generator.
    Test,
}

/// An emote proposed for display, with its image already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub image_url: String,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn chat(name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_url: image_url.into(),
            origin: CandidateOrigin::Chat,
        }
    }

    pub fn test(name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_url: image_url.into(),
            origin: CandidateOrigin::Test,
        }
    }

    pub fn is_test(&self) -> bool {
        self.origin == CandidateOrigin::Test
    }
}

/// Everything the engine task reacts to besides its own timers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Chat(ChatMessage),
    ChatStatus(ConnectionState),
    /// A renderer could not load the image for this emote name.
    ImageFailed(String),
    StartTestMode,
    StopTestMode,
    Shutdown,
}
