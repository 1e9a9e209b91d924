use std::sync::{Arc, Mutex, PoisonError};

/// Outbound chat messages. Prints to stdout and keeps a transcript.
#[derive(Clone, Default)]
pub struct Chat {
    transcript: Arc<Mutex<Vec<String>>>,
}

impl Chat {
    pub fn say(&self, user: &str, msg: impl AsRef<str>) {
        let line = format!("@{user} {}", msg.as_ref());
        println!("{line}");
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    #[cfg(test)]
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
