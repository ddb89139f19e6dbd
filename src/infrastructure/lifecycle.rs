use tokio::sync::watch;

/// Liveness handle for an execution context. The host can invalidate a
/// context out-of-band (process signal today, extension reload in the
/// original environment); every scheduled tick and every cross-context
/// send must check `is_live` first and stand down once it turns false.
#[derive(Clone)]
pub struct Lifecycle {
    sender: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct LifecycleListener {
    receiver: watch::Receiver<bool>,
}

impl Lifecycle {
    pub fn new() -> (Self, LifecycleListener) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, LifecycleListener { receiver })
    }

    pub fn subscribe(&self) -> LifecycleListener {
        LifecycleListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn invalidate(&self) {
        let _ = self.sender.send(true);
    }
}

impl LifecycleListener {
    /// Cheap, side-effect-free check; safe to call on every tick.
    pub fn is_live(&self) -> bool {
        !*self.receiver.borrow()
    }

    pub async fn invalidated(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        let _ = self.receiver.changed().await;
    }
}

pub fn install_signal_handlers(lifecycle: Lifecycle) {
    let ctrlc = lifecycle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc.invalidate();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let term = lifecycle.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                term.invalidate();
            }
        });
    }
}
