// The relay is a dumb pipe: best-effort delivery, FIFO per sender pair,
// soft failure when the target is gone.

use tabcast::{ChunkId, ControllerMessage, Relay, RelayError, RelayPayload};

fn ack(n: u64) -> RelayPayload {
    RelayPayload::ToAgent(ControllerMessage::ChunkProcessed {
        chunk_id: ChunkId(n),
    })
}

#[tokio::test]
async fn delivers_fifo_per_sender_pair() {
    let relay = Relay::new();
    let (sender, _sender_rx) = relay.register().await;
    let (receiver, mut receiver_rx) = relay.register().await;

    for n in 0..10 {
        relay.send(sender, receiver, ack(n)).await.unwrap();
    }

    for n in 0..10 {
        let delivery = receiver_rx.recv().await.unwrap();
        assert_eq!(delivery.from, sender);
        assert_eq!(delivery.payload, ack(n));
    }
}

#[tokio::test]
async fn unknown_target_is_soft_failure() {
    let relay = Relay::new();
    let (sender, _rx) = relay.register().await;
    let (ghost, rx) = relay.register().await;
    relay.unregister(ghost).await;
    drop(rx);

    let err = relay.send(sender, ghost, ack(0)).await.unwrap_err();
    assert!(matches!(err, RelayError::TargetGone(id) if id == ghost));
}

#[tokio::test]
async fn dropped_receiver_is_soft_failure_and_cleaned_up() {
    let relay = Relay::new();
    let (sender, _rx) = relay.register().await;
    let (target, target_rx) = relay.register().await;

    // Receiver goes away without unregistering (user closed the tab).
    drop(target_rx);

    let err = relay.send(sender, target, ack(1)).await.unwrap_err();
    assert!(matches!(err, RelayError::TargetGone(_)));

    // The relay keeps working for everyone else.
    let (other, mut other_rx) = relay.register().await;
    relay.send(sender, other, ack(2)).await.unwrap();
    assert_eq!(other_rx.recv().await.unwrap().payload, ack(2));
}

#[tokio::test]
async fn contexts_are_independent_mailboxes() {
    let relay = Relay::new();
    let (a, mut a_rx) = relay.register().await;
    let (b, mut b_rx) = relay.register().await;

    relay.send(a, b, ack(1)).await.unwrap();
    relay.send(b, a, ack(2)).await.unwrap();

    assert_eq!(b_rx.recv().await.unwrap().payload, ack(1));
    assert_eq!(a_rx.recv().await.unwrap().payload, ack(2));
}
