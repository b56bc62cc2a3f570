use log::info;

/// Announces short spoken prompts. Implementations must not block: the timer
/// calls this from its tick and never waits on playback.
pub trait VoicePrompt: Send + Sync {
    fn announce(&self, text: &str);
}

/// Writes announcements to the log instead of speaking them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVoicePrompt;

impl VoicePrompt for LogVoicePrompt {
    fn announce(&self, text: &str) {
        info!("Voice prompt: {text}");
    }
}

pub fn halfway_message() -> String {
    "Halfway there, keep going".to_string()
}

pub fn near_end_message(remaining_secs: u64) -> String {
    let minutes = remaining_secs.div_ceil(60).max(1);
    if minutes == 1 {
        "About 1 minute left".to_string()
    } else {
        format!("About {minutes} minutes left")
    }
}
