use async_trait::async_trait;
use audioflux_status::{StatusSnapshot, StatusStore, StoreError};
use tokio::sync::{mpsc, oneshot};

enum Message {
    Get(oneshot::Sender<Option<StatusSnapshot>>),
    Set(StatusSnapshot, oneshot::Sender<()>),
}

/// Owns the cached snapshot. Requests are handled one at a time, so a
/// snapshot is only ever replaced as a whole.
struct StateActor {
    receiver: mpsc::UnboundedReceiver<Message>,
    snapshot: Option<StatusSnapshot>,
}

impl StateActor {
    fn new(receiver: mpsc::UnboundedReceiver<Message>) -> Self {
        Self {
            receiver,
            snapshot: None,
        }
    }

    fn handle_message(&mut self, msg: Message) {
        // Errors when sending can happen e.g. if the requesting handler was
        // cancelled while waiting. We can safely ignore these.
        match msg {
            Message::Get(respond_to) => {
                let _ = respond_to.send(self.snapshot.clone());
            }
            Message::Set(snapshot, respond_to) => {
                self.snapshot = Some(snapshot);
                let _ = respond_to.send(());
            }
        }
    }

    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }
    }
}

#[derive(Clone)]
pub struct StateActorHandle {
    sender: mpsc::UnboundedSender<Message>,
}

impl StateActorHandle {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut actor = StateActor::new(receiver);
        tokio::spawn(async move { actor.run().await });

        Self { sender }
    }
}

#[async_trait]
impl StatusStore for StateActorHandle {
    async fn get(&self) -> Result<Option<StatusSnapshot>, StoreError> {
        let (send, recv) = oneshot::channel();
        // If this send fails, so does the recv below.
        let _ = self.sender.send(Message::Get(send));
        recv.await.map_err(|_| StoreError::Unavailable)
    }

    async fn set(&self, snapshot: StatusSnapshot) -> Result<(), StoreError> {
        let (send, recv) = oneshot::channel();
        let _ = self.sender.send(Message::Set(snapshot, send));
        recv.await.map_err(|_| StoreError::Unavailable)
    }
}
