//! WebSocket upgrade negotiation
//!
//! Runs the server side of the opening handshake on a [`PeekableStream`]
//! whose prefix has already been classified, so the request bytes used for
//! detection are replayed to the negotiation.

use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tokio_tungstenite::WebSocketStream;

use super::peekable::PeekableStream;
use crate::common::HandshakeError;

/// Framed client connection produced by a successful upgrade
pub type ClientStream<S> = WebSocketStream<PeekableStream<S>>;

/// Reason for refusing an upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status returned to the client
    pub status: StatusCode,
    /// Body of the error response
    pub reason: String,
}

impl Rejection {
    /// Reject with an arbitrary status
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// Reject with `403 Forbidden`
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, reason)
    }
}

/// Hook deciding whether an upgrade request may proceed
///
/// Called once per request, before the `101 Switching Protocols` response
/// is written. Typical uses are authentication and origin checks.
pub trait HandshakeValidator: Send + Sync {
    /// Accept or reject the request
    fn validate(&self, request: &Request) -> Result<(), Rejection>;
}

impl<F> HandshakeValidator for F
where
    F: Fn(&Request) -> Result<(), Rejection> + Send + Sync,
{
    fn validate(&self, request: &Request) -> Result<(), Rejection> {
        self(request)
    }
}

/// Validator that accepts every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl HandshakeValidator for AcceptAll {
    fn validate(&self, _request: &Request) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Validator that only admits listed `Origin` values
///
/// An empty list admits everything. With a non-empty list, requests without
/// an `Origin` header are refused.
#[derive(Debug, Clone, Default)]
pub struct OriginAllowList {
    origins: Vec<String>,
}

impl OriginAllowList {
    /// Build from a list of origins such as `https://app.example.com`
    pub fn new<I, T>(origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            origins: origins
                .into_iter()
                .map(|o| o.into().trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }
}

impl HandshakeValidator for OriginAllowList {
    fn validate(&self, request: &Request) -> Result<(), Rejection> {
        if self.origins.is_empty() {
            return Ok(());
        }

        let origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Rejection::forbidden("missing Origin header"))?;

        let origin = origin.trim_end_matches('/');
        if self.origins.iter().any(|allowed| allowed.eq_ignore_ascii_case(origin)) {
            Ok(())
        } else {
            Err(Rejection::forbidden(format!("origin {} is not allowed", origin)))
        }
    }
}

/// Complete the WebSocket opening handshake
///
/// Writes the negotiation response to the stream. On rejection the client
/// receives the rejection status and reason before the error is returned.
pub async fn accept_upgrade<S>(
    stream: PeekableStream<S>,
    validator: &dyn HandshakeValidator,
    wait: Duration,
) -> Result<ClientStream<S>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut rejection: Option<Rejection> = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match validator.validate(request) {
            Ok(()) => {
                debug!("Upgrade accepted for {}", request.uri());
                Ok(response)
            }
            Err(refused) => {
                let mut error = ErrorResponse::new(Some(refused.reason.clone()));
                *error.status_mut() = refused.status;
                rejection = Some(refused);
                Err(error)
            }
        }
    };

    let result = tokio::time::timeout(wait, tokio_tungstenite::accept_hdr_async(stream, callback)).await;

    match result {
        Ok(Ok(ws)) => Ok(ws),
        Ok(Err(e)) => match rejection {
            Some(refused) => {
                warn!("Upgrade rejected: {}", refused.reason);
                Err(HandshakeError::Rejected {
                    status: refused.status.as_u16(),
                    reason: refused.reason,
                })
            }
            None => Err(HandshakeError::Protocol(e)),
        },
        Err(_) => Err(HandshakeError::Timeout(wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;

    fn request_with_origin(origin: Option<&str>) -> Request {
        let mut request = "ws://localhost/".into_client_request().unwrap();
        if let Some(origin) = origin {
            request.headers_mut().insert(header::ORIGIN, origin.parse().unwrap());
        }
        request
    }

    #[test]
    fn test_origin_allow_list() {
        let open = OriginAllowList::new(Vec::<String>::new());
        assert!(open.validate(&request_with_origin(None)).is_ok());

        let list = OriginAllowList::new(["https://app.example.com/"]);
        assert!(list.validate(&request_with_origin(Some("https://APP.example.com"))).is_ok());

        let refused = list.validate(&request_with_origin(Some("https://evil.example.com"))).unwrap_err();
        assert_eq!(refused.status, StatusCode::FORBIDDEN);
        assert!(list.validate(&request_with_origin(None)).is_err());
    }

    #[test]
    fn test_closure_validator() {
        let validator = |request: &Request| {
            if request.uri().path() == "/ws" {
                Ok(())
            } else {
                Err(Rejection::new(StatusCode::NOT_FOUND, "unknown path"))
            }
        };
        assert!(validator.validate(&"ws://localhost/ws".into_client_request().unwrap()).is_ok());
        assert!(validator.validate(&"ws://localhost/other".into_client_request().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_accept_upgrade_and_exchange() {
        let (client, server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let mut ws = accept_upgrade(PeekableStream::new(server), &AcceptAll, Duration::from_secs(2))
                .await
                .unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            ws.send(msg).await.unwrap();
        });

        let (mut ws, response) = tokio_tungstenite::client_async("ws://localhost/", client).await.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        ws.send(Message::text("echo")).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::text("echo"));

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_upgrade() {
        let (client, server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let validator = |_: &Request| -> Result<(), Rejection> { Err(Rejection::forbidden("no token")) };
            accept_upgrade(PeekableStream::new(server), &validator, Duration::from_secs(2)).await
        });

        let client_result = tokio_tungstenite::client_async("ws://localhost/", client).await;
        assert!(client_result.is_err());

        match server_task.await.unwrap() {
            Err(HandshakeError::Rejected { status, reason }) => {
                assert_eq!(status, 403);
                assert_eq!(reason, "no token");
            }
            other => panic!("Expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (_client, server) = tokio::io::duplex(4096);
        let result = accept_upgrade(PeekableStream::new(server), &AcceptAll, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(HandshakeError::Timeout(_))));
    }
}
