use tokio::sync::watch;
use uuid::Uuid;

/// The signed-in identity, owned by the identity provider at the app
/// boundary. Modeled as a watch channel so the reconciler can observe
/// sign-in / sign-out transitions and re-scope its subscription.
#[derive(Debug, Clone)]
pub struct Session {
    current: watch::Sender<Option<Uuid>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn sign_in(&self, user_id: Uuid) {
        self.current.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(None);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Uuid> {
        *self.current.borrow()
    }

    /// A receiver observing identity changes. Marked changed on creation so a
    /// fresh watcher always processes the current identity first.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Uuid>> {
        let mut rx = self.current.subscribe();
        rx.mark_changed();
        rx
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
