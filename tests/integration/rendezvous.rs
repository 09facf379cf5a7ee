use std::time::Duration;

use crate::*;

/// The complete two-endpoint rendezvous: the first arrival ends up with a
/// PeerIdentification carrying the second's address and version, the
/// second with a PeerDisconnect carrying its own port — in that causal
/// order.
#[tokio::test(flavor = "multi_thread")]
async fn full_pairing_exchanges_addresses() -> Result<()> {
    let mediator = start_mediator(|_| {}).await?;
    let addr = mediator.local_addr();

    let kp_a = Keypair::generate();
    let kp_b = Keypair::generate();
    let key_a = PairingKey::from(kp_a.public);
    let key_b = PairingKey::from(kp_b.public);

    let mut a = Endpoint::connect_with_keypair(addr, kp_a).await?;
    a.advertise(PROTOCOL_VERSION, &key_b).await?;
    a.answer_challenge().await?;

    // A is now registered and blocked waiting for B.
    let first = tokio::spawn(async move {
        let msg = a.receive_expected(MessageType::PeerIdentification).await?;
        anyhow::Ok((msg, a))
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = Endpoint::connect_with_keypair(addr, kp_b).await?;
    b.advertise(PROTOCOL_VERSION, &key_a).await?;
    b.answer_challenge().await?;

    let Message::PeerDisconnect { port } =
        b.receive_expected(MessageType::PeerDisconnect).await?
    else {
        unreachable!()
    };
    assert_eq!(port, b.local_addr.port(), "PeerDisconnect carries B's own port");

    let (identification, _a) = first.await??;
    let Message::PeerIdentification {
        version,
        host,
        port,
    } = identification
    else {
        unreachable!()
    };
    assert_eq!(version, PROTOCOL_VERSION);
    assert_eq!(host, b.local_addr.ip().to_string());
    assert_eq!(port, b.local_addr.port());

    // Happens-before: the disconnect instruction was sent strictly before
    // the identification, and B's readiness signal was consumed.
    let sent = types_of(&mediator.trace().sent_messages());
    let disconnect_at = sent
        .iter()
        .position(|t| *t == MessageType::PeerDisconnect)
        .expect("exactly one PeerDisconnect");
    let identification_at = sent
        .iter()
        .position(|t| *t == MessageType::PeerIdentification)
        .expect("exactly one PeerIdentification");
    assert!(disconnect_at < identification_at);
    assert_eq!(
        sent.iter().filter(|t| **t == MessageType::PeerDisconnect).count(),
        1
    );
    assert_eq!(
        sent.iter()
            .filter(|t| **t == MessageType::PeerIdentification)
            .count(),
        1
    );
    assert!(!mediator.barrier().is_ready(b.local_addr));

    mediator.stop().await;
    Ok(())
}

/// Per-connection traces match the sequence in the protocol definition:
/// A receives Challenge then Identification; B receives Challenge then
/// Disconnect; the mediator receives Advertise then Response from each.
#[tokio::test(flavor = "multi_thread")]
async fn end_to_end_trace_matches_protocol() -> Result<()> {
    let mediator = start_mediator(|_| {}).await?;
    let addr = mediator.local_addr();

    let kp_a = Keypair::generate();
    let kp_b = Keypair::generate();
    let key_a = PairingKey::from(kp_a.public);
    let key_b = PairingKey::from(kp_b.public);

    let mut a = Endpoint::connect_with_keypair(addr, kp_a).await?;
    let a_addr = a.local_addr;
    a.advertise(PROTOCOL_VERSION, &key_b).await?;
    a.answer_challenge().await?;
    let first = tokio::spawn(async move {
        a.receive_expected(MessageType::PeerIdentification).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = Endpoint::connect_with_keypair(addr, kp_b).await?;
    b.advertise(PROTOCOL_VERSION, &key_a).await?;
    b.answer_challenge().await?;
    b.receive_expected(MessageType::PeerDisconnect).await?;
    first.await??;

    let trace = mediator.trace();
    assert_eq!(
        types_of(&trace.received_from(a_addr)),
        vec![MessageType::Advertise, MessageType::AdvertiseResponse]
    );
    assert_eq!(
        types_of(&trace.sent_to(a_addr)),
        vec![
            MessageType::AdvertiseChallenge,
            MessageType::PeerIdentification
        ]
    );
    assert_eq!(
        types_of(&trace.received_from(b.local_addr)),
        vec![MessageType::Advertise, MessageType::AdvertiseResponse]
    );
    assert_eq!(
        types_of(&trace.sent_to(b.local_addr)),
        vec![MessageType::AdvertiseChallenge, MessageType::PeerDisconnect]
    );

    mediator.stop().await;
    Ok(())
}

/// Both roles register themselves, so after a pairing the store holds an
/// identity under each endpoint's key (the default retention policy
/// keeps them until shutdown).
#[tokio::test(flavor = "multi_thread")]
async fn both_endpoints_are_registered_symmetrically() -> Result<()> {
    let mediator = start_mediator(|_| {}).await?;
    let addr = mediator.local_addr();

    let kp_a = Keypair::generate();
    let kp_b = Keypair::generate();
    let key_a = PairingKey::from(kp_a.public);
    let key_b = PairingKey::from(kp_b.public);

    let mut a = Endpoint::connect_with_keypair(addr, kp_a).await?;
    a.advertise(PROTOCOL_VERSION, &key_b).await?;
    a.answer_challenge().await?;
    let first = tokio::spawn(async move {
        a.receive_expected(MessageType::PeerIdentification).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = Endpoint::connect_with_keypair(addr, kp_b).await?;
    b.advertise(PROTOCOL_VERSION, &key_a).await?;
    b.answer_challenge().await?;
    b.receive_expected(MessageType::PeerDisconnect).await?;
    first.await??;

    let store = mediator.store();
    let a_entry = store.get(&key_a).expect("first endpoint registered");
    let b_entry = store.get(&key_b).expect("second endpoint registered");
    assert_eq!(a_entry.version, PROTOCOL_VERSION);
    assert_eq!(b_entry.addr, b.local_addr);

    mediator.stop().await;
    Ok(())
}

/// With evict_on_consume enabled, a consumed correlation entry is removed
/// instead of lingering until shutdown.
#[tokio::test(flavor = "multi_thread")]
async fn evict_on_consume_clears_consumed_entries() -> Result<()> {
    let mediator = start_mediator(|c| c.protocol.evict_on_consume = true).await?;
    let addr = mediator.local_addr();

    let kp_a = Keypair::generate();
    let kp_b = Keypair::generate();
    let key_a = PairingKey::from(kp_a.public);
    let key_b = PairingKey::from(kp_b.public);

    let mut a = Endpoint::connect_with_keypair(addr, kp_a).await?;
    a.advertise(PROTOCOL_VERSION, &key_b).await?;
    a.answer_challenge().await?;
    let first = tokio::spawn(async move {
        a.receive_expected(MessageType::PeerIdentification).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut b = Endpoint::connect_with_keypair(addr, kp_b).await?;
    b.advertise(PROTOCOL_VERSION, &key_a).await?;
    b.answer_challenge().await?;
    b.receive_expected(MessageType::PeerDisconnect).await?;
    first.await??;

    mediator.stop().await;
    assert!(
        mediator.store().is_empty(),
        "both consumed entries should be evicted"
    );
    Ok(())
}

/// Two pairings back to back on one mediator — shared state from the
/// first must not leak into the second.
#[tokio::test(flavor = "multi_thread")]
async fn sequential_pairings_do_not_interfere() -> Result<()> {
    let mediator = start_mediator(|_| {}).await?;
    let addr = mediator.local_addr();

    for _ in 0..2 {
        let kp_a = Keypair::generate();
        let kp_b = Keypair::generate();
        let key_a = PairingKey::from(kp_a.public);
        let key_b = PairingKey::from(kp_b.public);

        let mut a = Endpoint::connect_with_keypair(addr, kp_a).await?;
        a.advertise(PROTOCOL_VERSION, &key_b).await?;
        a.answer_challenge().await?;
        let first = tokio::spawn(async move {
            a.receive_expected(MessageType::PeerIdentification).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut b = Endpoint::connect_with_keypair(addr, kp_b).await?;
        b.advertise(PROTOCOL_VERSION, &key_a).await?;
        b.answer_challenge().await?;
        b.receive_expected(MessageType::PeerDisconnect).await?;
        first.await??;
    }

    mediator.stop().await;
    Ok(())
}
