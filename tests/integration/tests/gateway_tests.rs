//! Gateway session tests over the in-memory transport
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use chrono::Utc;
use courier_gateway::protocol::{GatewayMessage, OpCode, RESUMABLE_CLOSE};
use courier_gateway::transport::{Frame, MemoryTransport};
use courier_gateway::{
    ChannelSink, ClusterPlan, GatewayError, LocalIdentifyCoordinator, SessionSnapshot, SessionState,
    Shard, ShardCluster, ShardConfig, ShardEvent, ShardInfo,
};
use integration_tests::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn snapshot(session_id: &str, sequence: u64) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.to_string(),
        sequence,
        resume_url: None,
        saved_at: Utc::now(),
    }
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_resume_delivers_each_missed_event_once() {
    let (transport, mut server) = MemoryTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport)
        .sink(Arc::new(sink))
        .snapshot(Some(snapshot("S", 42)))
        .build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    let resume = conn.recv_message().await.unwrap();
    assert_eq!(resume.op, OpCode::Resume);
    let resume = resume.as_resume().unwrap();
    assert_eq!(resume.session_id, "S");
    assert_eq!(resume.seq, 42);

    // Replay overlaps what the client already saw and repeats itself
    for sequence in [41, 42, 43, 44, 43, 45, 44] {
        conn.send(&GatewayMessage::dispatch("MESSAGE_CREATE", sequence, json!({})));
    }
    conn.send(&GatewayMessage::dispatch("RESUMED", 46, json!({})));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    handle.shutdown();
    let saved = task.await.unwrap().unwrap().unwrap();
    assert_eq!(saved.session_id, "S");
    assert_eq!(saved.sequence, 46);

    let mut delivered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ShardEvent::Dispatch(event) = event {
            delivered.extend(event.sequence);
        }
    }
    assert_eq!(delivered, [43, 44, 45, 46]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_falls_back_to_identify() {
    let (transport, mut server) = MemoryTransport::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport)
        .snapshot(Some(snapshot("stale", 7)))
        .build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Resume);
    conn.send(&GatewayMessage::invalid_session(false));
    wait_for_close(&mut conn).await;

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    let identify = conn.recv_message().await.unwrap();
    assert_eq!(identify.op, OpCode::Identify);

    conn.send(&GatewayMessage::dispatch("READY", 1, json!({ "session_id": "fresh" })));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    handle.shutdown();
    let saved = task.await.unwrap().unwrap().unwrap();
    assert_eq!(saved.session_id, "fresh");
    assert_eq!(saved.sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_request_resumes_same_session() {
    let (transport, mut server) = MemoryTransport::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport).build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Identify);
    conn.send(&GatewayMessage::dispatch("READY", 1, json!({ "session_id": "R" })));
    conn.send(&GatewayMessage::dispatch("MESSAGE_CREATE", 2, json!({})));
    conn.send(&GatewayMessage::dispatch("MESSAGE_CREATE", 3, json!({})));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    conn.send(&GatewayMessage::reconnect());
    assert_eq!(wait_for_close(&mut conn).await, Some(RESUMABLE_CLOSE));

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    let resume = conn.recv_message().await.unwrap().as_resume().unwrap();
    assert_eq!(resume.session_id, "R");
    assert_eq!(resume.seq, 3);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unresumable_close_codes_start_fresh_session() {
    for code in [4007, 4009] {
        let (transport, mut server) = MemoryTransport::new();
        let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport)
            .snapshot(Some(snapshot("old", 12)))
            .build();
        let task = tokio::spawn(shard.run());

        let mut conn = accept_with_hello(&mut server, 45_000).await;
        assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Resume);
        conn.close(code, "session gone");

        let mut conn = accept_with_hello(&mut server, 45_000).await;
        let next = conn.recv_message().await.unwrap();
        assert_eq!(next.op, OpCode::Identify, "close {code} should drop the session");

        handle.shutdown();
        assert_eq!(task.await.unwrap().unwrap(), None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fatal_close_codes_stop_shard() {
    for code in 4010..=4014 {
        let (transport, mut server) = MemoryTransport::new();
        let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport).build();
        let task = tokio::spawn(shard.run());

        let mut conn = accept_with_hello(&mut server, 45_000).await;
        assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Identify);
        conn.close(code, "not allowed");

        match task.await.unwrap() {
            Err(GatewayError::FatalClose { shard: 0, code: closed, .. }) => assert_eq!(closed.as_u16(), code),
            other => panic!("close {code} should be fatal, got {other:?}"),
        }
        assert_eq!(handle.state(), SessionState::Shutdown);
        assert!(server.try_accept().is_none());
    }
}

// ============================================================================
// Malformed input and shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_over_threshold_force_resume() {
    let config = Arc::new(ShardConfig {
        malformed_event_threshold: 2,
        ..ShardConfig::clone(&shard_config())
    });
    let (transport, mut server) = MemoryTransport::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), config, transport).build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Identify);
    conn.send(&GatewayMessage::dispatch("READY", 5, json!({ "session_id": "M" })));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    // Two bad frames are tolerated, the third is one too many
    for _ in 0..3 {
        conn.send_frame(Frame::Text("{not json".to_string()));
    }
    assert_eq!(wait_for_close(&mut conn).await, Some(RESUMABLE_CLOSE));

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    let resume = conn.recv_message().await.unwrap().as_resume().unwrap();
    assert_eq!(resume.session_id, "M");
    assert_eq!(resume.seq, 5);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_dispatch_delivered_after_shutdown() {
    let (transport, mut server) = MemoryTransport::new();
    let (sink, mut events) = ChannelSink::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport)
        .sink(Arc::new(sink))
        .build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 45_000).await;
    conn.recv_message().await.unwrap();
    conn.send(&GatewayMessage::dispatch("READY", 1, json!({ "session_id": "D" })));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    // Arrives together with the shutdown request
    handle.shutdown();
    conn.send(&GatewayMessage::dispatch("MESSAGE_CREATE", 2, json!({})));

    let saved = task.await.unwrap().unwrap().unwrap();
    assert_eq!(saved.sequence, 1);
    assert!(drain_dispatches(&mut events, "MESSAGE_CREATE").is_empty());
    assert_eq!(handle.state(), SessionState::Shutdown);
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_heartbeat_acks_trigger_reconnect() {
    let (transport, mut server) = MemoryTransport::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport).build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 1_000).await;
    assert_eq!(conn.recv_message().await.unwrap().op, OpCode::Identify);
    conn.send(&GatewayMessage::dispatch("READY", 1, json!({ "session_id": "Z" })));
    expect_state(&handle, SessionState::Connected, Duration::from_secs(5)).await;

    let first = conn.recv_message().await.unwrap();
    assert_eq!(first.op, OpCode::Heartbeat);
    let first_at = Instant::now();

    // Never acknowledged: the connection is abandoned after two more intervals
    assert_eq!(wait_for_close(&mut conn).await, Some(RESUMABLE_CLOSE));
    assert!(first_at.elapsed() >= Duration::from_secs(2));

    let mut conn = accept_with_hello(&mut server, 1_000).await;
    let resume = conn.recv_message().await.unwrap().as_resume().unwrap();
    assert_eq!(resume.session_id, "Z");
    assert_eq!(resume.seq, 1);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_heartbeats_keep_connection() {
    let (transport, mut server) = MemoryTransport::new();
    let (shard, handle) = Shard::builder(ShardInfo::new(0, 1), shard_config(), transport).build();
    let task = tokio::spawn(shard.run());

    let mut conn = accept_with_hello(&mut server, 1_000).await;
    conn.recv_message().await.unwrap();
    conn.send(&GatewayMessage::dispatch("READY", 1, json!({ "session_id": "Z" })));

    for _ in 0..5 {
        let heartbeat = conn.recv_message().await.unwrap();
        assert_eq!(heartbeat.op, OpCode::Heartbeat);
        conn.send(&GatewayMessage::heartbeat_ack());
    }

    assert_eq!(handle.state(), SessionState::Connected);
    assert!(server.try_accept().is_none());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

// ============================================================================
// Identify coordination
// ============================================================================

/// Runs on the real clock: the identify limiter is monotonic-clock based
#[tokio::test]
async fn test_simultaneous_identifies_are_spaced() {
    let interval = Duration::from_millis(150);
    let plan = ClusterPlan {
        url: "memory://gateway".to_string(),
        shard_count: 5,
        shard_ids: 0..5,
        max_concurrency: 1,
    };
    let coordinator = Arc::new(LocalIdentifyCoordinator::new(1, interval).unwrap());
    let (transport, mut server) = MemoryTransport::new();

    let cluster = ShardCluster::builder(plan, shard_config(), Arc::new(transport))
        .coordinator(coordinator)
        .start()
        .await
        .unwrap();

    let mut waiting = Vec::new();
    for _ in 0..5 {
        let mut conn = accept_with_hello(&mut server, 45_000).await;
        waiting.push(tokio::spawn(async move {
            let identify = conn.recv_message().await.unwrap().as_identify().unwrap();
            (identify.shard[0], std::time::Instant::now(), conn)
        }));
    }

    let mut identified = Vec::new();
    let mut connections = Vec::new();
    for task in waiting {
        let (shard_id, at, conn) = task.await.unwrap();
        identified.push((at, shard_id));
        connections.push(conn);
    }
    identified.sort();

    let mut shard_ids: Vec<u32> = identified.iter().map(|(_, id)| *id).collect();
    shard_ids.sort_unstable();
    assert_eq!(shard_ids, [0, 1, 2, 3, 4]);

    for pair in identified.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= interval - Duration::from_millis(10), "identifies only {gap:?} apart");
    }

    cluster.shutdown().await.unwrap();
    drop(connections);
}
