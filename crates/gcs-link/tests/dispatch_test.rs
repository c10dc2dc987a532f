//! Dispatch and acknowledgement tests against a simulated vehicle.
//!
//! The vehicle sits on the far end of an in-process channel link, decodes
//! what the ground station sends and answers with scripted COMMAND_ACKs.

use std::sync::Arc;
use std::time::Duration;

use gcs_core::{
    encode_frame, AckResult, CommandAck, CommandCatalog, CommandError, FlightMode, FrameDecoder,
    FrameHeader, Message, Target,
};
use gcs_link::{
    AckResolver, ChannelLink, Connection, Link, LinkError, RetryPolicy, Session, SourceId,
};

const VEHICLE: FrameHeader = FrameHeader {
    sequence: 0,
    system_id: 1,
    component_id: 1,
};

struct Vehicle {
    link: ChannelLink,
    decoder: FrameDecoder,
}

impl Vehicle {
    async fn next_message(&mut self) -> Message {
        let mut buf = [0u8; 512];
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return frame.message;
            }
            let len = self.link.recv(&mut buf).await.expect("vehicle link failed");
            assert!(len > 0, "ground station link closed");
            self.decoder.push(&buf[..len]);
        }
    }

    async fn expect_message(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(2), self.next_message())
            .await
            .expect("vehicle received nothing")
    }

    async fn ack(&self, ack: CommandAck) {
        self.ack_as(VEHICLE, ack).await;
    }

    /// Answer with another sender identity, e.g. a second vehicle on the link.
    async fn ack_as(&self, header: FrameHeader, ack: CommandAck) {
        let frame = encode_frame(header, &Message::CommandAck(ack)).expect("ack frame");
        self.link
            .send(&frame)
            .await
            .expect("vehicle failed to send ack");
    }
}

fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        ack_timeout: Duration::from_millis(200),
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
    }
}

fn start() -> (Session, Vehicle) {
    let (local, remote) = ChannelLink::pair();
    let connection = Arc::new(Connection::from_link(local, SourceId::default()));
    let catalog = Arc::new(CommandCatalog::builtin().expect("built-in catalog"));
    let session = Session::start(connection, catalog, Target::new(1, 1), test_policy());
    let vehicle = Vehicle {
        link: remote,
        decoder: FrameDecoder::new(),
    };
    (session, vehicle)
}

async fn wait_for_registration(resolver: &AckResolver, command: u16, count: usize) {
    for _ in 0..200 {
        if resolver.pending(command) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no waiter registered for command {}", command);
}

#[tokio::test]
async fn test_takeoff_goes_out_as_command_long() {
    let (session, mut vehicle) = start();

    let invocation = session
        .dispatcher()
        .send_named("nav_takeoff", &[5.0, f64::NAN, 47.0, 8.0, 50.0])
        .await
        .unwrap();
    assert_eq!(invocation.confirmation, 0);

    match vehicle.expect_message().await {
        Message::CommandLong(long) => {
            assert_eq!(long.command, 22);
            assert_eq!(long.target_system, 1);
            assert_eq!(long.target_component, 1);
            assert_eq!(&long.params[..3], &[5.0, 0.0, 0.0]);
            assert!(long.params[3].is_nan());
            assert_eq!(&long.params[4..], &[47.0, 8.0, 50.0]);
        }
        other => panic!("expected COMMAND_LONG, got {:?}", other),
    }

    session.shutdown().await;
}

#[tokio::test]
async fn test_waypoint_goes_out_as_command_int() {
    let (session, mut vehicle) = start();

    session
        .dispatcher()
        .send_code(16, &[0.0, 2.0, 0.0, 0.0, 47.397_742_1, 8.545_594_2, 20.0])
        .await
        .unwrap();

    match vehicle.expect_message().await {
        Message::CommandInt(int) => {
            assert_eq!(int.command, 16);
            assert_eq!(int.x, 473_977_421);
            assert_eq!(int.y, 85_455_942);
            assert_eq!(int.z, 20.0);
            assert_eq!(int.current, 0);
            assert_eq!(int.autocontinue, 0);
        }
        other => panic!("expected COMMAND_INT, got {:?}", other),
    }

    session.shutdown().await;
}

#[tokio::test]
async fn test_await_ack_skips_non_matching_ack() {
    let (session, vehicle) = start();
    let resolver = Arc::clone(session.resolver());

    let waiter = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.await_ack(22, Duration::from_secs(1)).await })
    };
    wait_for_registration(&resolver, 22, 1).await;

    vehicle.ack(CommandAck::new(400, AckResult::Denied)).await;
    vehicle.ack(CommandAck::new(22, AckResult::Accepted)).await;

    assert_eq!(waiter.await.unwrap().unwrap(), AckResult::Accepted);
    session.shutdown().await;
}

#[tokio::test]
async fn test_await_ack_times_out_without_acks() {
    let (session, _vehicle) = start();

    let err = session
        .resolver()
        .await_ack(22, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::AckTimeout { command: 22, .. }));

    session.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_awaits_get_their_own_acks() {
    let (session, vehicle) = start();
    let resolver = Arc::clone(session.resolver());

    let takeoff = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.await_ack(22, Duration::from_secs(1)).await })
    };
    let arm = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.await_ack(400, Duration::from_secs(1)).await })
    };
    wait_for_registration(&resolver, 22, 1).await;
    wait_for_registration(&resolver, 400, 1).await;

    vehicle.ack(CommandAck::new(400, AckResult::Denied)).await;
    vehicle.ack(CommandAck::new(22, AckResult::Accepted)).await;

    assert_eq!(arm.await.unwrap().unwrap(), AckResult::Denied);
    assert_eq!(takeoff.await.unwrap().unwrap(), AckResult::Accepted);
    session.shutdown().await;
}

#[tokio::test]
async fn test_ack_arriving_before_await_is_not_lost() {
    let (session, mut vehicle) = start();

    session
        .dispatcher()
        .send_named("nav_takeoff", &[0.0, 0.0, 47.0, 8.0, 50.0])
        .await
        .unwrap();
    assert!(matches!(vehicle.expect_message().await, Message::CommandLong(_)));
    vehicle.ack(CommandAck::new(22, AckResult::Accepted)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = session
        .resolver()
        .await_ack(22, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(result, AckResult::Accepted);

    session.shutdown().await;
}

#[tokio::test]
async fn test_acks_from_another_vehicle_are_ignored() {
    let (session, vehicle) = start();
    let resolver = Arc::clone(session.resolver());
    let other_vehicle = FrameHeader {
        system_id: 2,
        ..VEHICLE
    };

    let waiter = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.await_ack(22, Duration::from_secs(1)).await })
    };
    wait_for_registration(&resolver, 22, 1).await;

    vehicle
        .ack_as(other_vehicle, CommandAck::new(22, AckResult::Denied))
        .await;
    vehicle.ack(CommandAck::new(22, AckResult::Accepted)).await;

    assert_eq!(waiter.await.unwrap().unwrap(), AckResult::Accepted);
    session.shutdown().await;
}

#[tokio::test]
async fn test_unknown_result_code_reaches_waiter() {
    let (session, _vehicle) = start();
    let resolver = Arc::clone(session.resolver());

    let waiter = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.await_ack(246, Duration::from_secs(1)).await })
    };
    wait_for_registration(&resolver, 246, 1).await;
    resolver.resolve(CommandAck::new(246, AckResult::from_code(42)));

    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result, AckResult::Unknown(42));
    assert!(!result.is_success());
    session.shutdown().await;
}

#[tokio::test]
async fn test_cancel_after_completion_is_not_an_error() {
    let (session, mut vehicle) = start();

    session
        .dispatcher()
        .send_named("nav_takeoff", &[0.0, 0.0, 47.0, 8.0, 50.0])
        .await
        .unwrap();
    assert!(matches!(vehicle.expect_message().await, Message::CommandLong(_)));
    vehicle.ack(CommandAck::new(22, AckResult::Accepted)).await;

    session.cancel(22).await.unwrap();
    match vehicle.expect_message().await {
        Message::CommandCancel(cancel) => {
            assert_eq!(cancel.command, 22);
            assert_eq!(cancel.target_system, 1);
            assert_eq!(cancel.target_component, 1);
        }
        other => panic!("expected COMMAND_CANCEL, got {:?}", other),
    }

    // The completion ack arrived before anyone waited; it is still there
    let later = session
        .resolver()
        .await_ack(22, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(later, AckResult::Accepted);

    session.shutdown().await;
}

#[tokio::test]
async fn test_send_on_closed_connection_fails() {
    let (session, _vehicle) = start();
    session.connection().close();

    let err = session
        .dispatcher()
        .send_named("nav_return_to_launch", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Connection(_)));
    assert!(matches!(
        session.cancel(22).await,
        Err(LinkError::Connection(_))
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn test_argument_errors_surface_before_sending() {
    let (session, _vehicle) = start();

    let err = session
        .dispatcher()
        .send_named("nav_takeoff", &[1.0])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::Command(CommandError::InvalidArgumentCount {
            expected: 5,
            actual: 1,
            ..
        })
    ));

    let err = session
        .dispatcher()
        .send_named("nav_teleport", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::Command(CommandError::UnknownCommand(_))));

    assert_eq!(session.connection().stats().await.frames_sent, 0);
    session.shutdown().await;
}

#[tokio::test]
async fn test_retransmission_increments_confirmation() {
    let (session, mut vehicle) = start();

    let vehicle_task = tokio::spawn(async move {
        let mut confirmations = Vec::new();
        loop {
            match vehicle.expect_message().await {
                Message::CommandLong(long) => {
                    confirmations.push(long.confirmation);
                    // Stay silent for the first two transmissions
                    if confirmations.len() == 3 {
                        vehicle.ack(CommandAck::new(long.command, AckResult::Accepted)).await;
                        return confirmations;
                    }
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
    });

    let outcome = session.command("component_arm_disarm", &[1.0, 0.0]).await.unwrap();
    assert_eq!(outcome.result, AckResult::Accepted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(vehicle_task.await.unwrap(), vec![0, 1, 2]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_attempts_time_out() {
    let (session, _vehicle) = start();

    let err = session
        .command("component_arm_disarm", &[1.0, 0.0])
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::AckTimeout { command: 400, .. }));
    assert_eq!(session.connection().stats().await.frames_sent, 3);

    session.shutdown().await;
}

#[tokio::test]
async fn test_in_progress_is_followed_to_completion() {
    let (session, mut vehicle) = start();

    let vehicle_task = tokio::spawn(async move {
        let message = vehicle.expect_message().await;
        let command = message.command();
        for pct in [30, 60] {
            vehicle
                .ack(CommandAck::new(command, AckResult::InProgress).with_progress(pct))
                .await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        vehicle.ack(CommandAck::new(command, AckResult::Accepted)).await;
        vehicle
    });

    let outcome = session
        .command("preflight_calibration", &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        .await
        .unwrap();
    assert_eq!(outcome.result, AckResult::Accepted);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.progress, Some(60));

    vehicle_task.await.unwrap();
    assert_eq!(session.connection().stats().await.frames_sent, 1);
    session.shutdown().await;
}

#[tokio::test]
async fn test_temporarily_rejected_is_retried() {
    let (session, mut vehicle) = start();

    let vehicle_task = tokio::spawn(async move {
        let first = vehicle.expect_message().await;
        vehicle
            .ack(CommandAck::new(first.command(), AckResult::TemporarilyRejected))
            .await;
        let second = vehicle.expect_message().await;
        vehicle
            .ack(CommandAck::new(second.command(), AckResult::Accepted))
            .await;
    });

    let outcome = session.command("nav_return_to_launch", &[]).await.unwrap();
    assert_eq!(outcome.result, AckResult::Accepted);
    assert_eq!(outcome.attempts, 2);

    vehicle_task.await.unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn test_set_mode_uses_do_set_mode() {
    let (session, mut vehicle) = start();

    let vehicle_task = tokio::spawn(async move {
        match vehicle.expect_message().await {
            Message::CommandLong(long) => {
                vehicle
                    .ack(CommandAck::new(long.command, AckResult::Accepted))
                    .await;
                long
            }
            other => panic!("expected COMMAND_LONG, got {:?}", other),
        }
    });

    let outcome = session.set_mode(FlightMode::Guided).await.unwrap();
    assert_eq!(outcome.result, AckResult::Accepted);

    let long = vehicle_task.await.unwrap();
    assert_eq!(long.command, 176);
    assert_eq!(&long.params[..3], &[1.0, 15.0, 0.0]);
    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_fails_pending_waits() {
    let (session, _vehicle) = start();
    let mut pending = session.resolver().register(22);

    session.shutdown().await;

    assert!(matches!(
        pending.next(Duration::from_secs(1)).await,
        Err(LinkError::ResolverClosed)
    ));
}
