use super::frame::Packet;
use super::transport::{Connection, Connector, Endpoint, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace, warn};

/// Connector for the game server's socket.io endpoint over a plain websocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
	#[instrument(skip(self, endpoint), fields(port = endpoint.port))]
	async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
		let url = endpoint.url()?;
		let (stream, response) = connect_async(url.as_str()).await.map_err(|e| TransportError::Connect(e.to_string()))?;
		debug!(status = %response.status(), "websocket upgraded");

		Ok(Box::new(WsConnection { stream }))
	}
}

struct WsConnection {
	stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
	async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
		let text = packet.encode()?;
		trace!(kind = packet.kind(), len = text.len(), "sending frame");
		self.stream.send(TungsteniteMessage::Text(text.into())).await.map_err(|e| TransportError::Send(e.to_string()))
	}

	async fn recv(&mut self) -> Option<Result<Packet, TransportError>> {
		loop {
			match self.stream.next().await? {
				Ok(TungsteniteMessage::Text(text)) => {
					trace!(len = text.len(), "received frame");
					match Packet::decode(text.as_str()) {
						Ok(packet) => return Some(Ok(packet)),
						Err(e) => warn!(error = %e, "dropping undecodable frame"),
					}
				}
				Ok(TungsteniteMessage::Close(frame)) => {
					debug!(?frame, "websocket close frame received");
					return None;
				}
				// tungstenite answers pings itself
				Ok(TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) | TungsteniteMessage::Frame(_)) => {}
				Ok(TungsteniteMessage::Binary(data)) => {
					warn!(len = data.len(), "ignoring binary frame");
				}
				Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
			}
		}
	}

	async fn close(&mut self) -> Result<(), TransportError> {
		self.stream.close(None).await.map_err(|e| TransportError::Send(e.to_string()))
	}
}
