use tokio::runtime::Handle;

/// Runtime that background work of a queue or registry is spawned on.
///
/// Prefers the caller's runtime and falls back to the one that was current when the
/// owner was built, so a synchronous callback running on a plain thread can still
/// submit work. `None` means there is nowhere to spawn.
#[derive(Clone, Debug)]
pub(crate) struct Spawner {
    home: Option<Handle>,
}

impl Spawner {
    /// Remember the runtime current at construction, if any.
    pub fn capture() -> Self {
        Self {
            home: Handle::try_current().ok(),
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.home.clone())
    }
}
