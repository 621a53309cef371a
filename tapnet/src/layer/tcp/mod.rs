//! The TCP layer abstraction.
//!
//! Offers the connection registry, the state machine of RFC793 and the retransmission machinery
//! on top of the ip layer. Some parts differ from lower layers since TCP is a connection oriented
//! protocol but most concepts should be somewhat familiar nevertheless.
//!
//! The main difference is that many incoming events *require* soliciting an answer such as an ACK
//! for received data. Those answers are handed to the ip layer immediately while the segment is
//! processed. Dropping outgoing packet potentially starves the remote of ACKs and window updates,
//! leading to highly inefficient communication or even resets but not catastrophic failure.
//!
//! ## Structure
//!
//! The main functionality of the [`Endpoint`] structure of this layer is storing the connection
//! states, unlike other layers which mostly store configuration options. To this end it utilizes
//! one ordered map of connection tuples to [`Connection`]s. A [`FourTuple`] behaves similar to a
//! specialized file descriptor: it is the handle for all application calls.
//!
//! [`Endpoint`]: struct.Endpoint.html
//! [`Connection`]: struct.Connection.html
//! [`FourTuple`]: struct.FourTuple.html
//!
//! Unlike standard stacks where state and user must be assumed to be in different protection
//! domains and which manage their state opaquely, it poses no problem for this library to allow
//! inspection of internal state or modification (by the user) beyond the transitions mandated in
//! the protocol standard.
//!
//! Everything that occupies sequence space (SYN, data, FIN) is appended to the write queue of
//! its connection and owned there until acknowledged. The slow timer retransmits the oldest
//! outstanding segment when its timeout expired, the fast timer sends delayed acknowledgements.
//!
//! ## Creating a connection
//!
//! An active open sends the initial SYN right away, see [`Endpoint::connect`]. Data may be sent on
//! the returned handle immediately, it is queued until the handshake completed.
//!
//! The stack does not allow sending any data in a SYN packet as these are rarely accepted. They
//! are incompatible with SYN-cookies and otherwise a security and stability risk.
//!
//! [`Endpoint::connect`]: struct.Endpoint.html#method.connect
//!
//! ## Accepting connections
//!
//! Accepting a connection is not unlike creating one but occurs as a reaction to an incoming
//! packet instead of proactively. A port is opened with [`Endpoint::listen`]. Each SYN for that
//! port creates a connection answering with SYN+ACK, and once its handshake completes it can be
//! taken with [`Endpoint::accept`]. A port without listener is indistinguishable from a closed
//! one.
//!
//! [`Endpoint::listen`]: struct.Endpoint.html#method.listen
//! [`Endpoint::accept`]: struct.Endpoint.html#method.accept
//!
//! ## Deviations
//!
//! An ACK in `SYN-RECEIVED` must acknowledge our SYN, `SND.UNA < SEG.ACK =< SND.NXT`, as clarified
//! by RFC9293. RFC793 also admits `SEG.ACK = SND.UNA` which acknowledges nothing.
//!
//! There is no congestion avoidance. The congestion window keeps the initial window of RFC5681
//! and only caps the amount of data in flight.
//!
//! An incoming packet in Closed state is simply dropped if it had RST set.  Packets with RST
//! should *never* be answered with a packet with RST but the only specified answers would set that
//! flag. In fact, RFC793 is clear about this [in section Reset
//! Generation](https://tools.ietf.org/html/rfc793#page-36):
//!
//! > 1.  If the connection does not exist (CLOSED) then a reset is sent in response to any
//! incoming segment except another reset.
//!
//! Out of order segments are not reassembled. Data beyond `RCV.NXT` is dropped and answered with a
//! duplicate ACK, the peer will retransmit it. Urgent data is not supported.
//!
//! Data sent in SYN packet is ignored.
mod connection;
mod endpoint;
mod input;
mod isn;
mod output;
mod queue;
mod timer;

#[cfg(test)]
mod tests;

pub use connection::{
    initial_window,
    Connection,
    FourTuple,
    Receive,
    Send as SendState,
    State};

pub use endpoint::{
    Endpoint,
    DEFAULT_MSL,
    EPHEMERAL_PORTS};

// publically exposed for initialization.
pub use isn::IsnGenerator;

pub use timer::{
    RtoEstimator,
    CLOCK_GRANULARITY,
    RTO_INITIAL,
    RTO_MAX,
    RTO_MIN};
