use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{AggregatedMessage, AggregatedMessageStream, CloseCode, CloseReason, ProtocolError, Session};
use futures::StreamExt;
use log::{debug, info, warn};

use crate::node::{handle_message, NodeService};

/// Largest message accepted from a client, whether sent as one frame or
/// as a run of continuation frames
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// `GET /ws`: upgrades to a WebSocket speaking the node protocol.
///
/// Each text message is one request; each request gets one text message back.
/// The connection is served on its own task until the client goes away.
pub async fn protocol_socket(
    req: HttpRequest,
    body: web::Payload,
    node: web::Data<NodeService>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    let stream = stream.max_frame_size(MAX_MESSAGE_SIZE).aggregate_continuations();

    let peer = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    actix_web::rt::spawn(serve_connection(session, stream, node.get_ref().clone(), peer));

    Ok(response)
}

async fn serve_connection(mut session: Session, mut stream: AggregatedMessageStream, node: NodeService, peer: String) {
    info!("New client connected: {}", peer);

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err @ ProtocolError::Overflow) => {
                warn!("Message from {} exceeds {} bytes: {}", peer, MAX_MESSAGE_SIZE, err);
                let reason = CloseReason {
                    code: CloseCode::Size,
                    description: Some(format!("Message larger than {} bytes", MAX_MESSAGE_SIZE)),
                };
                let _ = session.close(Some(reason)).await;
                info!("Client disconnected: {}", peer);
                return;
            }
            Err(err) => {
                warn!("Connection error from {}: {}", peer, err);
                break;
            }
        };

        let text = match message {
            AggregatedMessage::Text(text) => text.to_string(),
            AggregatedMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            AggregatedMessage::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
                continue;
            }
            AggregatedMessage::Pong(_) => continue,
            AggregatedMessage::Close(reason) => {
                debug!("Client {} closed the connection: {:?}", peer, reason);
                let _ = session.close(reason).await;
                info!("Client disconnected: {}", peer);
                return;
            }
        };

        let response = handle_message(&node, &text).await;
        if session.text(response.to_string()).await.is_err() {
            break;
        }
    }

    let _ = session.close(None).await;
    info!("Client disconnected: {}", peer);
}
