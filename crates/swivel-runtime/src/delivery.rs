//! Command delivery loop.
//!
//! Every tick the loop asks the arbiter for the active command, looks up the
//! vendor frame for it, and sends that frame through the session. A tick
//! with nothing to do costs nothing: no active command means no traffic, and
//! a disconnected link is skipped rather than fought over, since repair
//! belongs to the reconnect supervisor.

use std::sync::Arc;
use std::time::Duration;

use swivel_kernel::CommandArbiter;
use swivel_link::GimbalSession;
use swivel_types::{CommandTable, Direction, SwivelError};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Timing knobs for the delivery loop.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Pause between delivery ticks.
    pub tick: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
        }
    }
}

/// One pass of the delivery loop, split out so tests can drive it directly.
///
/// Returns the direction that was delivered, or `None` when the tick had
/// nothing to do: link down, no active command, or a failed send that the
/// next tick simply retries.
///
/// # Errors
///
/// [`SwivelError::Config`] when the active command has no frame in the
/// table. Tables are validated at startup, so reaching this means the
/// process is running on a table it must not trust, and the loop treats it
/// as fatal.
pub async fn delivery_tick(
    arbiter: &CommandArbiter,
    session: &GimbalSession,
    table: &CommandTable,
) -> Result<Option<Direction>, SwivelError> {
    if !session.is_connected().await {
        debug!("gimbal not connected, skipping delivery");
        return Ok(None);
    }
    let Some(direction) = arbiter.active() else {
        return Ok(None);
    };
    let Some(frame) = table.frame(direction) else {
        return Err(SwivelError::Config(format!(
            "no command frame configured for '{direction}'"
        )));
    };
    match session.send(frame).await {
        Ok(()) => {
            debug!(command = %direction, "command delivered");
            Ok(Some(direction))
        }
        Err(e) => {
            warn!(command = %direction, error = %e, "command delivery failed");
            Ok(None)
        }
    }
}

/// Drive [`delivery_tick`] on the configured cadence until shutdown.
///
/// Only the fatal table gap stops the loop early; every other tick outcome
/// keeps it running.
pub async fn run_delivery(
    arbiter: Arc<CommandArbiter>,
    session: Arc<GimbalSession>,
    table: CommandTable,
    config: DeliveryConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), SwivelError> {
    info!(tick_ms = config.tick.as_millis() as u64, "delivery loop running");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("delivery loop stopped");
                return Ok(());
            }
            _ = sleep(config.tick) => {}
        }
        delivery_tick(&arbiter, &session, &table).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use swivel_link::{LinkConfig, ReconnectSupervisor, SimRadio, SupervisorConfig};

    fn make_table() -> CommandTable {
        let mut frames = HashMap::new();
        for (i, direction) in Direction::ALL.into_iter().enumerate() {
            frames.insert(direction, vec![0x24, 0x3a, i as u8 + 1]);
        }
        CommandTable::new(frames).unwrap()
    }

    fn make_session(radio: &SimRadio) -> Arc<GimbalSession> {
        Arc::new(GimbalSession::new(
            Box::new(radio.clone()),
            LinkConfig {
                address: "C8:47:8C:12:34:56".to_string(),
                service_id: "0000ffe5-0000-1000-8000-00805f9a34fb".to_string(),
                write_characteristic_id: "0000ffe9-0000-1000-8000-00805f9a34fb"
                    .to_string(),
                connect_timeout: Duration::from_secs(5),
                write_timeout: Duration::from_secs(5),
            },
        ))
    }

    #[tokio::test]
    async fn idle_tick_delivers_nothing() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_secs(5));

        let delivered = delivery_tick(&arbiter, &session, &make_table())
            .await
            .unwrap();

        assert_eq!(delivered, None);
        assert!(radio.written().is_empty());
    }

    #[tokio::test]
    async fn active_command_is_delivered_every_tick() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_secs(5));
        let table = make_table();
        arbiter.set(Direction::Up);

        for _ in 0..3 {
            let delivered = delivery_tick(&arbiter, &session, &table).await.unwrap();
            assert_eq!(delivered, Some(Direction::Up));
        }

        let expected = table.frame(Direction::Up).unwrap().to_vec();
        assert_eq!(radio.written(), vec![expected.clone(), expected.clone(), expected]);
    }

    #[tokio::test]
    async fn disconnected_link_is_skipped() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        let arbiter = CommandArbiter::new(Duration::from_secs(5));
        arbiter.set(Direction::Up);

        let delivered = delivery_tick(&arbiter, &session, &make_table())
            .await
            .unwrap();

        assert_eq!(delivered, None);
        assert_eq!(radio.open_count(), 0, "delivery must not dial the device");
        assert_eq!(arbiter.active(), Some(Direction::Up), "command stays queued");
    }

    #[tokio::test]
    async fn stale_command_stops_the_stream() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_millis(30));
        let table = make_table();

        arbiter.set(Direction::Left);
        assert_eq!(
            delivery_tick(&arbiter, &session, &table).await.unwrap(),
            Some(Direction::Left)
        );

        sleep(Duration::from_millis(60)).await;
        assert_eq!(delivery_tick(&arbiter, &session, &table).await.unwrap(), None);
        assert_eq!(radio.written().len(), 1, "expired command must go quiet");
    }

    #[tokio::test]
    async fn halt_stops_the_stream() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_secs(5));
        let table = make_table();

        arbiter.set(Direction::Left);
        delivery_tick(&arbiter, &session, &table).await.unwrap();
        arbiter.clear();

        assert_eq!(delivery_tick(&arbiter, &session, &table).await.unwrap(), None);
        assert_eq!(radio.written().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_not_fatal() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_secs(5));
        let table = make_table();
        arbiter.set(Direction::Up);
        radio.fail_next_writes(1);

        // The failed write drops the link; the next tick skips it quietly.
        assert_eq!(delivery_tick(&arbiter, &session, &table).await.unwrap(), None);
        assert!(!session.is_connected().await);
        assert_eq!(delivery_tick(&arbiter, &session, &table).await.unwrap(), None);

        session.connect().await.unwrap();
        assert_eq!(
            delivery_tick(&arbiter, &session, &table).await.unwrap(),
            Some(Direction::Up)
        );
    }

    #[tokio::test]
    async fn supervisor_repairs_what_delivery_skips() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = CommandArbiter::new(Duration::from_secs(5));
        let table = make_table();
        arbiter.set(Direction::Up);
        radio.fail_next_writes(1);

        assert_eq!(delivery_tick(&arbiter, &session, &table).await.unwrap(), None);
        assert!(!session.is_connected().await);

        let (tx, rx) = broadcast::channel(1);
        let supervisor = ReconnectSupervisor::spawn(
            session.clone(),
            SupervisorConfig {
                check_interval: Duration::from_millis(20),
                attempts_per_cycle: 3,
                retry_backoff: Duration::from_millis(10),
            },
            rx,
        );
        sleep(Duration::from_millis(100)).await;

        assert_eq!(
            delivery_tick(&arbiter, &session, &table).await.unwrap(),
            Some(Direction::Up)
        );

        let _ = tx.send(());
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn run_delivery_forwards_until_shutdown() {
        let radio = SimRadio::new();
        let session = make_session(&radio);
        session.connect().await.unwrap();
        let arbiter = Arc::new(CommandArbiter::new(Duration::from_secs(5)));
        let table = make_table();
        arbiter.set(Direction::Down);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_delivery(
            arbiter.clone(),
            session.clone(),
            table.clone(),
            DeliveryConfig {
                tick: Duration::from_millis(10),
            },
            rx,
        ));

        sleep(Duration::from_millis(60)).await;
        let _ = tx.send(());
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("loop must stop on shutdown")
            .unwrap()
            .unwrap();

        let written = radio.written();
        assert!(written.len() >= 2, "expected a stream of frames, got {written:?}");
        let expected = table.frame(Direction::Down).unwrap();
        assert!(written.iter().all(|frame| frame == expected));
    }
}
