pub mod net;

pub use net::{
    ClientMessage, ConnectError, ConnectionState, DEFAULT_PORT, DEFAULT_TICK_RATE, EntityState,
    FrameBuffer, Mailbox, ProtocolError, SNAPSHOT_INTERVAL, ServerMessage, Session, StatePatch,
    StatePublisher, normalize_direction, round2,
};
