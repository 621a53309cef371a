use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;

use rand::Rng;

use crate::layer::{ip, Error, Result};
use crate::time::{Duration, Instant};
use crate::wire::{Ipv4Address, TcpRepr, IPV4_HEADER_LEN, TCP_HEADER_LEN};

use super::connection::{Connection, FourTuple, State};
use super::isn::IsnGenerator;

/// The dynamic port range of RFC6335 used for active opens without a local port.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;

/// The default maximum segment lifetime.
pub const DEFAULT_MSL: Duration = Duration::from_secs(30);

/// How many terminal events are remembered for connections that were already freed.
const EVENT_BACKLOG: usize = 64;

/// The registry of all connections and listeners.
///
/// Connections are keyed by their four tuple. Every operation on a connection looks it up anew,
/// there are no long-lived references into the registry. Connections are freed once they reach
/// `CLOSED` and the reason is kept around so that the next call on the tuple can report it.
#[derive(Debug)]
pub struct Endpoint {
    connections: BTreeMap<FourTuple, Connection>,
    listeners: BTreeMap<u16, VecDeque<FourTuple>>,
    events: VecDeque<(FourTuple, Error)>,
    isn: IsnGenerator,
    mss: u16,
    receive_window: u32,
    msl: Duration,
}

impl Endpoint {
    /// Create an empty endpoint.
    ///
    /// `mss` is the largest payload our side accepts, `receive_window` the window we advertise
    /// with an empty read queue.
    pub fn new(mss: u16, receive_window: u32, msl: Duration) -> Self {
        Endpoint {
            connections: BTreeMap::new(),
            listeners: BTreeMap::new(),
            events: VecDeque::new(),
            isn: IsnGenerator::new(),
            mss,
            receive_window,
            msl,
        }
    }

    /// The maximum segment size for a link mtu.
    pub fn mss_for_mtu(mtu: usize) -> u16 {
        let payload = mtu.saturating_sub(IPV4_HEADER_LEN + TCP_HEADER_LEN);
        payload.min(usize::from(u16::max_value())) as u16
    }

    /// Replace the generator of initial sequence numbers.
    pub fn with_isn(self, isn: IsnGenerator) -> Self {
        Endpoint { isn, ..self }
    }

    /// The number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Allocate a connection in `CLOSED` with a fresh initial sequence number.
    ///
    /// A `local_port` of `0` picks a random ephemeral port. Fails with `Illegal` if the tuple is
    /// already in use, the existing connection is kept.
    pub fn open(
        &mut self,
        local_addr: Ipv4Address,
        remote_addr: Ipv4Address,
        local_port: u16,
        remote_port: u16,
        now: Instant,
    ) -> Result<FourTuple> {
        let local_port = match local_port {
            0 => self.ephemeral_port(local_addr, remote_addr, remote_port)?,
            port => port,
        };

        let tuple = FourTuple { local_addr, remote_addr, local_port, remote_port };
        if self.connections.contains_key(&tuple) {
            net_debug!("tcp: {} already in use", tuple);
            return Err(Error::Illegal)
        }

        let connection = self.new_connection(tuple, now);
        self.connections.insert(tuple, connection);
        Ok(tuple)
    }

    /// Open a connection actively by sending a SYN.
    pub fn connect(
        &mut self,
        local_addr: Ipv4Address,
        remote_addr: Ipv4Address,
        local_port: u16,
        remote_port: u16,
        ip: &mut dyn ip::Send,
        now: Instant,
    ) -> Result<FourTuple> {
        let tuple = self.open(local_addr, remote_addr, local_port, remote_port, now)?;
        let result = match self.connections.get_mut(&tuple) {
            Some(connection) => connection.send_syn(ip, now),
            None => Err(Error::InvalidHandle),
        };

        if let Err(err) = result {
            self.free(&tuple);
            return Err(err)
        }

        net_debug!("tcp: {} connecting", tuple);
        Ok(tuple)
    }

    /// Get the connection of a tuple.
    pub fn get(&self, tuple: &FourTuple) -> Option<&Connection> {
        self.connections.get(tuple)
    }

    /// Get the connection of a tuple, mutably.
    pub fn get_mut(&mut self, tuple: &FourTuple) -> Option<&mut Connection> {
        self.connections.get_mut(tuple)
    }

    /// The state of a connection, `None` if it is not registered.
    pub fn state(&self, tuple: &FourTuple) -> Option<State> {
        self.connections.get(tuple).map(Connection::state)
    }

    /// All connections in the order of their tuple.
    pub fn connections(&self) -> impl Iterator<Item=(&FourTuple, &Connection)> + '_ {
        self.connections.iter()
    }

    /// All connections in the order of their tuple, mutably.
    pub fn connections_mut(&mut self) -> impl Iterator<Item=(&FourTuple, &mut Connection)> + '_ {
        self.connections.iter_mut()
    }

    /// Release a connection and all of its buffers.
    ///
    /// Returns whether the connection was registered. Freeing it again has no effect.
    pub fn free(&mut self, tuple: &FourTuple) -> bool {
        match self.connections.remove(tuple) {
            Some(mut connection) => {
                connection.release();
                true
            },
            None => false,
        }
    }

    /// Free a connection and remember why, for the next call on its tuple.
    pub(crate) fn free_with(&mut self, tuple: &FourTuple, reason: Error) {
        if !self.free(tuple) {
            return
        }

        net_debug!("tcp: {} freed: {}", tuple, reason);
        if self.events.len() == EVENT_BACKLOG {
            self.events.pop_front();
        }
        self.events.push_back((*tuple, reason));
    }

    /// Take the reason a connection was freed, reported only once.
    pub fn take_event(&mut self, tuple: &FourTuple) -> Option<Error> {
        let idx = self.events.iter().position(|(freed, _)| freed == tuple)?;
        self.events.remove(idx).map(|(_, reason)| reason)
    }

    /// Accept connection requests on a local port.
    pub fn listen(&mut self, port: u16) -> Result<()> {
        if port == 0 || self.listeners.contains_key(&port) {
            return Err(Error::Illegal)
        }

        self.listeners.insert(port, VecDeque::new());
        Ok(())
    }

    /// Stop accepting connection requests, established connections are not affected.
    pub fn unlisten(&mut self, port: u16) -> bool {
        self.listeners.remove(&port).is_some()
    }

    /// Whether a listener is bound to the port.
    pub fn is_listening(&self, port: u16) -> bool {
        self.listeners.contains_key(&port)
    }

    /// Take the next connection of a listener that completed its handshake.
    pub fn accept(&mut self, port: u16) -> Result<Option<FourTuple>> {
        let connections = &self.connections;
        let backlog = self.listeners.get_mut(&port).ok_or(Error::InvalidHandle)?;
        while let Some(tuple) = backlog.pop_front() {
            // Might have been reset before being accepted.
            if connections.contains_key(&tuple) {
                return Ok(Some(tuple))
            }
        }

        Ok(None)
    }

    /// Queue data for transmission.
    ///
    /// Data queued before the handshake completed is sent once it did.
    pub fn send(&mut self, tuple: &FourTuple, data: &[u8], ip: &mut dyn ip::Send, now: Instant)
        -> Result<usize>
    {
        let connection = self.connection_mut(tuple)?;
        match connection.current {
            State::SynSent | State::SynReceived | State::Established | State::CloseWait => {
                connection.send_data(data, ip, now)
            },
            _ => Err(Error::Illegal),
        }
    }

    /// Read received data.
    ///
    /// Returns `Ok(0)` once the peer closed and everything was read, and `Exhausted` while no
    /// data is available yet.
    pub fn recv(&mut self, tuple: &FourTuple, buffer: &mut [u8]) -> Result<usize> {
        let connection = self.connection_mut(tuple)?;
        let window_was_closed = connection.recv.window == 0;
        let read = connection.read(buffer);

        if read > 0 {
            if window_was_closed {
                // Announce the reopened window.
                connection.delayed_ack = true;
            }
            return Ok(read)
        }

        if connection.peer_closed() || buffer.is_empty() {
            Ok(0)
        } else {
            Err(Error::Exhausted)
        }
    }

    /// Close our side of the connection.
    ///
    /// Queued data is still delivered before the FIN. A connection still in `SYN-SENT` is freed
    /// without further notice to the peer.
    pub fn close(&mut self, tuple: &FourTuple, ip: &mut dyn ip::Send, now: Instant) -> Result<()> {
        let current = self.connection_mut(tuple)?.current;
        if current == State::SynSent {
            self.free(tuple);
            return Ok(())
        }

        let connection = self.connection_mut(tuple)?;
        match current {
            State::Established => {
                connection.current = State::FinWait1;
                connection.send_fin(ip, now)
            },
            State::CloseWait => {
                connection.current = State::LastAck;
                connection.send_fin(ip, now)
            },
            _ => Err(Error::Illegal),
        }
    }

    /// Create and register the connection for the SYN of a peer, answering with SYN+ACK.
    pub(crate) fn open_passive(&mut self, tuple: FourTuple, syn: &TcpRepr, ip: &mut dyn ip::Send, now: Instant)
        -> Result<()>
    {
        let mut connection = self.new_connection(tuple, now);
        connection.passive = true;
        connection.synchronize(syn);
        connection.send_synack(ip, now)?;
        net_debug!("tcp: {} connection request", tuple);
        self.connections.insert(tuple, connection);
        Ok(())
    }

    /// Hand an established passive connection to its listener.
    pub(crate) fn enqueue_accepted(&mut self, tuple: FourTuple) {
        match self.listeners.get_mut(&tuple.local_port) {
            Some(backlog) => backlog.push_back(tuple),
            None => { net_debug!("tcp: {} established without listener", tuple); },
        }
    }

    fn new_connection(&self, tuple: FourTuple, now: Instant) -> Connection {
        let iss = self.isn.get_isn(tuple, now);
        let mut connection = Connection::new(tuple, iss, self.mss, self.receive_window);
        connection.time_wait = self.msl * 2;
        connection
    }

    fn connection_mut(&mut self, tuple: &FourTuple) -> Result<&mut Connection> {
        if !self.connections.contains_key(tuple) {
            return Err(self.take_event(tuple).unwrap_or(Error::InvalidHandle))
        }

        self.connections.get_mut(tuple).ok_or(Error::InvalidHandle)
    }

    fn ephemeral_port(&self, local_addr: Ipv4Address, remote_addr: Ipv4Address, remote_port: u16)
        -> Result<u16>
    {
        let first = *EPHEMERAL_PORTS.start();
        let count = u32::from(*EPHEMERAL_PORTS.end() - first) + 1;
        let start = rand::thread_rng().gen_range(0..count);

        (0..count)
            .map(|offset| first + ((start + offset) % count) as u16)
            .find(|&local_port| {
                let tuple = FourTuple { local_addr, remote_addr, local_port, remote_port };
                !self.connections.contains_key(&tuple) && !self.listeners.contains_key(&local_port)
            })
            .ok_or(Error::Exhausted)
    }
}
