//! Real-time session status: SSE and WebSocket carry the same payloads.
//!
//! Each connection subscribes to its tenant's room; the current status is
//! replayed first. Closing the connection only drops the subscription.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{
        Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use futures_util::{SinkExt, Stream, StreamExt, stream};
use serde::Serialize;

use remindd_core::TenantId;
use remindd_events::{StatusEvent, Subscription};

use crate::app::services::AppServices;
use crate::context::TenantContext;

pub const STATUS_EVENT: &str = "status_update";

/// GET /stream?tenantId=
pub async fn sse(
    Extension(services): Extension<Arc<AppServices>>,
    tenant: TenantContext,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = services.sessions.subscribe(tenant.tenant_id());
    // The stream owns the subscription, so the room is released when it ends.
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((event, subscription))
    })
    .map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event(STATUS_EVENT).data(data))
    })
    .take_until(services.closed());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Serialize)]
struct WsFrame<'a> {
    event: &'static str,
    data: &'a StatusEvent,
}

/// GET /ws?tenantId=
pub async fn websocket(
    Extension(services): Extension<Arc<AppServices>>,
    tenant: TenantContext,
    upgrade: WebSocketUpgrade,
) -> Response {
    let subscription = services.sessions.subscribe(tenant.tenant_id());
    let tenant_id = tenant.tenant_id().clone();
    let closed = services.closed();
    upgrade.on_upgrade(move |socket| forward_status(socket, subscription, tenant_id, closed))
}

async fn forward_status(
    socket: WebSocket,
    mut subscription: Subscription<StatusEvent>,
    tenant_id: TenantId,
    closed: impl Future<Output = ()>,
) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(tenant_id = %tenant_id, "status observer attached");
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = &mut closed => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&WsFrame { event: STATUS_EVENT, data: &event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(tenant_id = %tenant_id, error = %e, "failed to encode status frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Client frames carry nothing; pings are answered by the server.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(tenant_id = %tenant_id, "status observer detached");
}
