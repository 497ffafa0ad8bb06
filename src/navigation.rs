use tokio::sync::mpsc;

/// Well-known portal views.
pub mod routes {
    pub const LOGIN: &str = "/login";
    pub const REGISTER: &str = "/register";
    pub const HOME: &str = "/";
}

/// Host-provided navigation side effect.
///
/// The session layer calls this to move the user to another view; it never
/// renders anything itself.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, path: &str);
}

/// Discards navigation requests. For headless clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, path: &str) {
        tracing::debug!(path, "Navigation ignored");
    }
}

/// Forwards navigation requests to the host UI loop over a channel.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    /// Create a navigator and the receiver the host drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, path: &str) {
        if self.tx.send(path.to_owned()).is_err() {
            tracing::warn!(path, "Navigation receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_navigator_forwards_paths() {
        let (nav, mut rx) = ChannelNavigator::new();
        nav.navigate(routes::LOGIN);
        nav.navigate(routes::HOME);
        assert_eq!(rx.try_recv().unwrap(), "/login");
        assert_eq!(rx.try_recv().unwrap(), "/");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_navigator_survives_dropped_receiver() {
        let (nav, rx) = ChannelNavigator::new();
        drop(rx);
        nav.navigate(routes::LOGIN);
    }
}
