//! Read and write pumps for the sidecar WebSocket.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use chatlink_protocol::DisconnectReason;
use chatlink_protocol::bridge::SidecarFrame;

use super::{MAX_MESSAGE_SIZE, PING_PERIOD, PONG_WAIT, PendingLogouts};
use crate::link::{Disconnect, LinkEvent};

/// Reads sidecar frames and forwards them as link events.
///
/// Any incoming message resets the liveness deadline. When the stream dies
/// without the sidecar having reported a closure, a `connectionLost`
/// closure is emitted, unless the link was ended locally.
pub(super) async fn read_pump<S>(
    mut read: S,
    events: mpsc::Sender<LinkEvent>,
    pending: PendingLogouts,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(PONG_WAIT);
    tokio::pin!(deadline);
    let mut reported_close = false;

    let lost = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,

            () = &mut deadline => {
                warn!("sidecar stopped responding");
                break Some(Disconnect::new(
                    Some(DisconnectReason::ConnectionLost.status_code()),
                    "sidecar stopped responding",
                ));
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("sidecar read error: {e}");
                        break Some(Disconnect::new(
                            Some(DisconnectReason::ConnectionLost.status_code()),
                            e.to_string(),
                        ));
                    }
                    None => {
                        debug!("sidecar stream ended");
                        break Some(Disconnect::from(DisconnectReason::ConnectionLost));
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + PONG_WAIT);

                match msg {
                    tungstenite::Message::Text(text) => {
                        let Some(event) = handle_frame(&text, &pending).await else {
                            continue;
                        };
                        reported_close |= matches!(event, LinkEvent::Closed(_));
                        if events.send(event).await.is_err() {
                            debug!("link events receiver dropped");
                            break None;
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Pong(_) => trace!("received pong"),
                    tungstenite::Message::Close(frame) => {
                        debug!(?frame, "sidecar sent close frame");
                        break Some(Disconnect::from(DisconnectReason::ConnectionClosed));
                    }
                    _ => {}
                }
            }
        }
    };

    // Dropping the senders fails any logout still waiting.
    pending.lock().await.clear();

    if let Some(disconnect) = lost
        && !reported_close
        && !cancel.is_cancelled()
    {
        let _ = events.send(LinkEvent::Closed(Some(disconnect))).await;
    }
}

/// Parses one text frame. Logout answers are routed to their waiter and
/// produce no event.
async fn handle_frame(text: &str, pending: &PendingLogouts) -> Option<LinkEvent> {
    if text.len() > MAX_MESSAGE_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return None;
    }

    let frame: SidecarFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to parse sidecar frame: {e}");
            return None;
        }
    };

    match frame {
        SidecarFrame::Qr { reference } => Some(LinkEvent::Qr(reference)),
        SidecarFrame::Open => Some(LinkEvent::Opened),
        SidecarFrame::Close {
            status_code,
            reason,
        } => Some(LinkEvent::Closed(closure(status_code, reason))),
        SidecarFrame::Creds { data } => Some(LinkEvent::CredentialsUpdated(data)),
        SidecarFrame::LogoutResult { id, ok, error } => {
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let result = if ok {
                        Ok(())
                    } else {
                        Err(error.unwrap_or_else(|| "logout failed".into()))
                    };
                    let _ = tx.send(result);
                }
                None => debug!(%id, "logout result without a waiter"),
            }
            None
        }
    }
}

fn closure(status_code: Option<u16>, reason: Option<String>) -> Option<Disconnect> {
    match (status_code, reason) {
        (None, None) => None,
        (code, Some(reason)) => Some(Disconnect::new(code, reason)),
        (Some(code), None) => Some(
            DisconnectReason::from_status_code(code)
                .map(Disconnect::from)
                .unwrap_or_else(|| Disconnect::new(Some(code), format!("closed with status {code}"))),
        ),
    }
}

/// Writes queued frames and periodic pings to the sidecar.
pub(super) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.tick().await;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ping.tick() => tungstenite::Message::Ping(Vec::new().into()),
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };
        if let Err(e) = write.send(msg).await {
            error!("sidecar write error: {e}");
            break;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};

    fn text(json: &str) -> Result<tungstenite::Message, tungstenite::Error> {
        Ok(tungstenite::Message::Text(json.to_string().into()))
    }

    async fn run_read(
        frames: Vec<Result<tungstenite::Message, tungstenite::Error>>,
        pending: PendingLogouts,
    ) -> Vec<LinkEvent> {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (write_tx, _write_rx) = mpsc::channel(16);
        read_pump(
            stream::iter(frames),
            events_tx,
            pending,
            write_tx,
            CancellationToken::new(),
        )
        .await;

        let mut out = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn translates_lifecycle_frames() {
        let events = run_read(
            vec![
                text(r#"{"type":"qr","ref":"2@abc"}"#),
                text(r#"{"type":"creds","data":{"me":"1"}}"#),
                text(r#"{"type":"open"}"#),
                text(r#"{"type":"close","statusCode":401}"#),
            ],
            PendingLogouts::default(),
        )
        .await;

        assert_eq!(
            events,
            vec![
                LinkEvent::Qr("2@abc".into()),
                LinkEvent::CredentialsUpdated(serde_json::json!({"me": "1"})),
                LinkEvent::Opened,
                LinkEvent::Closed(Some(Disconnect::new(Some(401), "logged out"))),
            ]
        );
    }

    #[tokio::test]
    async fn stream_end_without_close_is_connection_lost() {
        let events = run_read(
            vec![text(r#"{"type":"open"}"#)],
            PendingLogouts::default(),
        )
        .await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            LinkEvent::Closed(Some(d)) => assert_eq!(d.status_code, Some(408)),
            other => panic!("expected closure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_close_has_no_reason() {
        let events = run_read(vec![text(r#"{"type":"close"}"#)], PendingLogouts::default()).await;
        assert_eq!(events, vec![LinkEvent::Closed(None)]);
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let events = run_read(
            vec![
                text("not json"),
                text(r#"{"type":"unknown"}"#),
                text(r#"{"type":"close","reason":"bye"}"#),
            ],
            PendingLogouts::default(),
        )
        .await;
        assert_eq!(
            events,
            vec![LinkEvent::Closed(Some(Disconnect::new(None, "bye")))]
        );
    }

    #[tokio::test]
    async fn logout_result_reaches_waiter() {
        let pending = PendingLogouts::default();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pending.lock().await.insert("req-1".into(), tx);

        let events = run_read(
            vec![
                text(r#"{"type":"logoutResult","id":"req-1","ok":true}"#),
                text(r#"{"type":"close","statusCode":401,"reason":"logged out"}"#),
            ],
            pending,
        )
        .await;

        assert_eq!(rx.await.unwrap(), Ok(()));
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_pump_reports_nothing() {
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let (write_tx, _write_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        read_pump(
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            events_tx,
            PendingLogouts::default(),
            write_tx,
            cancel,
        )
        .await;
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn closure_mapping() {
        assert_eq!(closure(None, None), None);
        assert_eq!(
            closure(Some(428), None),
            Some(Disconnect::new(Some(428), "connection closed"))
        );
        assert_eq!(
            closure(Some(599), None),
            Some(Disconnect::new(Some(599), "closed with status 599"))
        );
    }

    #[tokio::test]
    async fn write_pump_forwards_and_closes_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let sink = Box::pin(sink::unfold(sink_tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }));

        let (write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        write_tx
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();
        let first = sink_rx.recv().await.unwrap();
        assert!(matches!(first, tungstenite::Message::Text(ref t) if t.as_str() == "hello"));

        cancel.cancel();
        handle.await.unwrap();
        assert!(matches!(
            sink_rx.recv().await.unwrap(),
            tungstenite::Message::Close(None)
        ));
    }
}
