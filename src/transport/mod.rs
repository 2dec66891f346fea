pub mod traits;
pub mod websocket;

pub use traits::{Frame, TransportConnector, TransportReader, TransportWriter};
pub use websocket::{WebSocketConnector, WsReader, WsWriter};
