//! The stack context tying the layers of one interface together.
//!
//! An [`Interface`] owns the device and the state of every layer. It is driven by three entry
//! points, each taking the current time explicitly:
//!
//! * [`poll`] reads one frame and dispatches it through the layers,
//! * [`fast_tick`] sends delayed acknowledgements,
//! * [`slow_tick`] retransmits, repeats arp requests and expires `TIME-WAIT`.
//!
//! The [`Stack`] runs these on their own threads. All of them lock the interface for the complete
//! duration of their work, so an inbound frame is never processed concurrently with a timer sweep
//! or an application call.
//!
//! [`Interface`]: struct.Interface.html
//! [`Stack`]: struct.Stack.html
//! [`poll`]: struct.Interface.html#method.poll
//! [`fast_tick`]: struct.Interface.html#method.fast_tick
//! [`slow_tick`]: struct.Interface.html#method.slow_tick
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, MutexGuard};

use crate::layer::{arp, eth, icmp, ip, tcp, Error, Result};
use crate::layer::tcp::{FourTuple, State};
use crate::nic::Device;
use crate::time::{Duration, Instant};
use crate::wire::{ethernet_frame, EthernetAddress, EthernetProtocol, IpProtocol};
use crate::wire::{Ipv4Address, Ipv4Cidr};

/// The most frames handled while holding the lock once.
const POLL_BURST: usize = 64;

/// Configuration of an interface.
#[derive(Clone, Debug)]
pub struct Config {
    /// Our hardware address.
    pub hardware_addr: EthernetAddress,

    /// Our protocol address and the on-link subnet.
    pub cidr: Ipv4Cidr,

    /// The router for everything outside the subnet.
    pub gateway: Option<Ipv4Address>,

    /// The receive window advertised with an empty read queue.
    pub receive_window: u32,

    /// The maximum segment lifetime, `TIME-WAIT` lasts twice as long.
    pub msl: Duration,

    /// The period of the fast timer.
    pub fast_period: Duration,

    /// The period of the slow timer.
    pub slow_period: Duration,

    /// How long the dispatcher waits for a frame before checking for shutdown.
    pub poll_timeout: Duration,

    /// The number of arp cache entries.
    pub arp_capacity: usize,

    /// The interval between two requests for an unresolved address.
    pub arp_retry_interval: Duration,

    /// The number of requests for an address before giving up.
    pub arp_retry_limit: u8,

    /// Whether echo requests are answered.
    pub answer_ping: bool,
}

/// All protocol state of one interface.
pub struct Interface<D> {
    device: D,
    eth: eth::Endpoint,
    arp: arp::Endpoint,
    ip: ip::Endpoint,
    icmp: icmp::Endpoint,
    tcp: tcp::Endpoint,
    config: Config,
    rx_buffer: Vec<u8>,
}

/// An interface driven by a dispatcher and two timer threads.
///
/// Dropping the stack shuts it down.
pub struct Stack<D: Device + Send + 'static> {
    interface: Arc<Mutex<Interface<D>>>,
    running: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Config {
    /// A configuration with default timers for the given addresses.
    pub fn new(hardware_addr: EthernetAddress, cidr: Ipv4Cidr) -> Self {
        Config {
            hardware_addr,
            cidr,
            gateway: None,
            receive_window: 64240,
            msl: tcp::DEFAULT_MSL,
            fast_period: Duration::from_millis(100),
            slow_period: Duration::from_millis(500),
            poll_timeout: Duration::from_millis(10),
            arp_capacity: 128,
            arp_retry_interval: arp::RETRY_INTERVAL,
            arp_retry_limit: arp::RETRY_LIMIT,
            answer_ping: true,
        }
    }
}

impl<D: Device> Interface<D> {
    /// Set up all layers on top of a device.
    pub fn new(device: D, config: Config) -> Self {
        let mtu = device.personality().mtu();
        let mut icmp = icmp::Endpoint::new();
        icmp.silent(!config.answer_ping);

        Interface {
            eth: eth::Endpoint::new(config.hardware_addr),
            arp: arp::Endpoint::new(config.cidr.address(), config.arp_capacity)
                .with_retries(config.arp_retry_interval, config.arp_retry_limit),
            ip: ip::Endpoint::new(config.cidr, config.gateway),
            icmp,
            tcp: tcp::Endpoint::new(tcp::Endpoint::mss_for_mtu(mtu), config.receive_window, config.msl),
            rx_buffer: vec![0; ethernet_frame::buffer_len(mtu)],
            device,
            config,
        }
    }

    /// The configuration the interface was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// The arp state.
    pub fn arp(&self) -> &arp::Endpoint {
        &self.arp
    }

    /// The tcp connection registry.
    pub fn tcp(&self) -> &tcp::Endpoint {
        &self.tcp
    }

    /// The tcp connection registry, mutably.
    pub fn tcp_mut(&mut self) -> &mut tcp::Endpoint {
        &mut self.tcp
    }

    /// Receive and process one frame.
    ///
    /// Returns `Ok(false)` if no frame was available. An error means the frame was dropped, the
    /// interface stays usable.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        let Interface { device, eth, arp, ip, icmp, tcp, rx_buffer, .. } = self;

        let len = match device.receive(rx_buffer)? {
            Some(len) => len,
            None => return Ok(false),
        };

        let frame = eth.receive(&rx_buffer[..len])?;
        let mut link = eth.sender(device);

        match frame.repr.ethertype {
            EthernetProtocol::Arp => arp.receive(&mut link, frame.payload, now)?,
            EthernetProtocol::Ipv4 => {
                let datagram = ip.receive(frame.payload)?;
                let mut sender = ip.sender(arp, link, now);
                match datagram.repr.protocol {
                    IpProtocol::Icmp => icmp.receive(&datagram.repr, datagram.payload, &mut sender)?,
                    IpProtocol::Tcp => tcp.receive(&datagram.repr, datagram.payload, &mut sender, now)?,
                    other => { net_trace!("ip: no handler for protocol {}", other); },
                }
            },
            other => { net_trace!("eth: no handler for ethertype {}", other); },
        }

        Ok(true)
    }

    /// Send the delayed acknowledgements.
    pub fn fast_tick(&mut self, now: Instant) {
        self.with_ip(now, |tcp, ip| tcp.fast_timer(ip));
    }

    /// Run the retransmission and expiry sweeps of arp and tcp.
    pub fn slow_tick(&mut self, now: Instant) {
        {
            let Interface { device, eth, arp, .. } = self;
            let mut link = eth.sender(device);
            match arp.slow_timer(&mut link, now) {
                Ok(0) => (),
                Ok(dropped) => { net_debug!("arp: dropped {} unresolved datagrams", dropped); },
                Err(err) => { net_debug!("arp: retry failed: {}", err); },
            }
        }

        self.with_ip(now, |tcp, ip| tcp.slow_timer(ip, now));
    }

    /// Open a connection to a remote port from an ephemeral local port.
    pub fn connect(&mut self, remote_addr: Ipv4Address, remote_port: u16, now: Instant)
        -> Result<FourTuple>
    {
        let local_addr = self.ip.addr();
        self.with_ip(now, |tcp, ip| tcp.connect(local_addr, remote_addr, 0, remote_port, ip, now))
    }

    /// Queue data on a connection.
    pub fn send(&mut self, tuple: &FourTuple, data: &[u8], now: Instant) -> Result<usize> {
        self.with_ip(now, |tcp, ip| tcp.send(tuple, data, ip, now))
    }

    /// Read received data from a connection.
    pub fn recv(&mut self, tuple: &FourTuple, buffer: &mut [u8]) -> Result<usize> {
        self.tcp.recv(tuple, buffer)
    }

    /// Close our side of a connection.
    pub fn close(&mut self, tuple: &FourTuple, now: Instant) -> Result<()> {
        self.with_ip(now, |tcp, ip| tcp.close(tuple, ip, now))
    }

    /// Accept connections on a local port.
    pub fn listen(&mut self, port: u16) -> Result<()> {
        self.tcp.listen(port)
    }

    /// Take an established connection of a listener.
    pub fn accept(&mut self, port: u16) -> Result<Option<FourTuple>> {
        self.tcp.accept(port)
    }

    /// The state of a connection, `None` once it was freed.
    pub fn state(&self, tuple: &FourTuple) -> Option<State> {
        self.tcp.state(tuple)
    }

    fn with_ip<T>(&mut self, now: Instant, f: impl FnOnce(&mut tcp::Endpoint, &mut dyn ip::Send) -> T) -> T {
        let Interface { device, eth, arp, ip, tcp, .. } = self;
        let link = eth.sender(device);
        let mut sender = ip.sender(arp, link, now);
        f(tcp, &mut sender)
    }
}

impl<D: Device + Send + 'static> Stack<D> {
    /// Start the dispatcher and timer threads.
    pub fn start(interface: Interface<D>) -> io::Result<Self> {
        let fast_period = interface.config.fast_period;
        let slow_period = interface.config.slow_period;
        let poll_timeout = interface.config.poll_timeout;
        let readable = readable_fd(&interface.device);

        let mut stack = Stack {
            interface: Arc::new(Mutex::new(interface)),
            running: Arc::new(AtomicBool::new(true)),
            threads: Vec::new(),
        };

        let (interface, running) = (stack.interface.clone(), stack.running.clone());
        stack.spawn("tapnet-dispatch", move || dispatch(&interface, &running, readable, poll_timeout))?;

        let (interface, running) = (stack.interface.clone(), stack.running.clone());
        stack.spawn("tapnet-fast-timer", move || {
            periodic(&interface, &running, fast_period, Interface::fast_tick)
        })?;

        let (interface, running) = (stack.interface.clone(), stack.running.clone());
        stack.spawn("tapnet-slow-timer", move || {
            periodic(&interface, &running, slow_period, Interface::slow_tick)
        })?;

        net_debug!("stack: started");
        Ok(stack)
    }

    /// Stop and join all threads.
    ///
    /// Queued segments and deferred datagrams are not flushed.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Lock the interface for direct access.
    pub fn lock(&self) -> MutexGuard<'_, Interface<D>> {
        self.interface.lock()
    }

    /// Open a connection to a remote port.
    pub fn connect(&self, remote_addr: Ipv4Address, remote_port: u16) -> Result<FourTuple> {
        self.lock().connect(remote_addr, remote_port, Instant::now())
    }

    /// Queue data on a connection.
    pub fn send(&self, tuple: &FourTuple, data: &[u8]) -> Result<usize> {
        self.lock().send(tuple, data, Instant::now())
    }

    /// Read received data from a connection.
    pub fn recv(&self, tuple: &FourTuple, buffer: &mut [u8]) -> Result<usize> {
        self.lock().recv(tuple, buffer)
    }

    /// Close our side of a connection.
    pub fn close(&self, tuple: &FourTuple) -> Result<()> {
        self.lock().close(tuple, Instant::now())
    }

    /// Accept connections on a local port.
    pub fn listen(&self, port: u16) -> Result<()> {
        self.lock().listen(port)
    }

    /// Take an established connection of a listener.
    pub fn accept(&self, port: u16) -> Result<Option<FourTuple>> {
        self.lock().accept(port)
    }

    /// The state of a connection.
    pub fn state(&self, tuple: &FourTuple) -> Option<State> {
        self.lock().state(tuple)
    }

    fn spawn(&mut self, name: &str, f: impl FnOnce() + Send + 'static) -> io::Result<()> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(f)?;
        self.threads.push(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                net_warn!("stack: a thread panicked");
            }
        }
    }
}

impl<D: Device + Send + 'static> Drop for Stack<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch<D: Device>(
    interface: &Mutex<Interface<D>>,
    running: &AtomicBool,
    readable: Option<Readable>,
    timeout: Duration,
) {
    while running.load(Ordering::Acquire) {
        wait_readable(readable, timeout);

        let mut interface = interface.lock();
        for _ in 0..POLL_BURST {
            match interface.poll(Instant::now()) {
                Ok(true) => (),
                Ok(false) => break,
                Err(Error::Io) => {
                    net_warn!("stack: device failed to receive");
                    break;
                },
                Err(err) => { net_trace!("stack: dropped frame: {}", err); },
            }
        }
    }
}

fn periodic<D: Device>(
    interface: &Mutex<Interface<D>>,
    running: &AtomicBool,
    period: Duration,
    tick: fn(&mut Interface<D>, Instant),
) {
    while running.load(Ordering::Acquire) {
        thread::sleep(period);
        if !running.load(Ordering::Acquire) {
            break;
        }
        tick(&mut interface.lock(), Instant::now());
    }
}

#[cfg(target_os = "linux")]
type Readable = std::os::unix::io::RawFd;

#[cfg(not(target_os = "linux"))]
type Readable = ();

#[cfg(target_os = "linux")]
fn readable_fd<D: Device>(device: &D) -> Option<Readable> {
    device.raw_fd()
}

#[cfg(not(target_os = "linux"))]
fn readable_fd<D: Device>(_: &D) -> Option<Readable> {
    None
}

#[cfg(target_os = "linux")]
fn wait_readable(fd: Option<Readable>, timeout: Duration) {
    match fd {
        Some(fd) => if let Err(err) = crate::nic::sys::sys_wait(fd, Some(timeout)) {
            net_debug!("stack: waiting for the device failed: {}", err);
            thread::sleep(timeout);
        },
        None => thread::sleep(timeout),
    }
}

#[cfg(not(target_os = "linux"))]
fn wait_readable(_: Option<Readable>, timeout: Duration) {
    thread::sleep(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::{Loopback, Personality};
    use crate::wire::{arp_packet, tcp_packet, ipv4_packet, ArpOperation, ArpRepr, EthernetRepr};
    use crate::wire::{Ipv4Repr, TcpFlags, TcpRepr, TcpSeqNumber};

    const MAC_HOST: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0x01]);
    const MAC_PEER: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    const IP_HOST: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const IP_PEER: Ipv4Address = Ipv4Address::new(10, 0, 0, 5);

    fn interface() -> Interface<Loopback> {
        let config = Config::new(MAC_HOST, Ipv4Cidr::new(IP_HOST, 24));
        Interface::new(Loopback::new(Personality::baseline()), config)
    }

    fn frame(ethertype: EthernetProtocol, payload: &[u8]) -> Vec<u8> {
        let repr = EthernetRepr { src_addr: MAC_PEER, dst_addr: MAC_HOST, ethertype };
        let mut buffer = vec![0; ethernet_frame::buffer_len(payload.len())];
        let frame = ethernet_frame::new_unchecked_mut(&mut buffer);
        repr.emit(frame);
        frame.payload_mut_slice().copy_from_slice(payload);
        buffer
    }

    fn arp_reply() -> Vec<u8> {
        let repr = ArpRepr {
            operation: ArpOperation::Reply,
            source_hardware_addr: MAC_PEER,
            source_protocol_addr: IP_PEER,
            target_hardware_addr: MAC_HOST,
            target_protocol_addr: IP_HOST,
        };
        let mut buffer = vec![0; repr.buffer_len()];
        repr.emit(arp_packet::new_unchecked_mut(&mut buffer));
        frame(EthernetProtocol::Arp, &buffer)
    }

    fn tcp_segment(repr: TcpRepr) -> Vec<u8> {
        let mut segment = vec![0; repr.buffer_len()];
        let packet = tcp_packet::new_unchecked_mut(&mut segment);
        repr.emit(packet);
        packet.fill_checksum(IP_PEER, IP_HOST);

        let header = Ipv4Repr {
            src_addr: IP_PEER,
            dst_addr: IP_HOST,
            protocol: IpProtocol::Tcp,
            payload_len: segment.len(),
            hop_limit: 64,
            ident: 1,
        };
        let mut datagram = vec![0; header.buffer_len() + segment.len()];
        let packet = ipv4_packet::new_unchecked_mut(&mut datagram);
        header.emit(packet);
        packet.payload_mut_slice().copy_from_slice(&segment);
        frame(EthernetProtocol::Ipv4, &datagram)
    }

    /// Parse a transmitted frame as a tcp segment of ours.
    fn parse_segment(bytes: &[u8]) -> (EthernetAddress, TcpRepr) {
        let frame = ethernet_frame::new_checked(bytes).unwrap();
        assert_eq!(frame.ethertype(), EthernetProtocol::Ipv4);
        let datagram = ipv4_packet::new_checked(frame.payload_slice()).unwrap();
        let header = Ipv4Repr::parse(datagram).unwrap();
        assert_eq!(header.protocol, IpProtocol::Tcp);
        let segment = tcp_packet::new_checked(datagram.payload_slice()).unwrap();
        (frame.dst_addr(), TcpRepr::parse(segment, header.src_addr, header.dst_addr).unwrap())
    }

    #[test]
    fn connect_resolves_next_hop() {
        let mut interface = interface();
        let now = Instant::from_millis(0);

        let tuple = interface.connect(IP_PEER, 80, now).unwrap();
        assert_eq!(interface.state(&tuple), Some(State::SynSent));
        assert!(crate::layer::tcp::EPHEMERAL_PORTS.contains(&tuple.local_port));

        // The SYN waits for the hardware address of the peer.
        let sent = interface.device_mut().take_transmitted();
        assert_eq!(sent.len(), 1);
        let request = ethernet_frame::new_checked(&sent[0]).unwrap();
        assert_eq!(request.dst_addr(), EthernetAddress::BROADCAST);
        assert_eq!(request.ethertype(), EthernetProtocol::Arp);
        let request = ArpRepr::parse(arp_packet::new_checked(request.payload_slice()).unwrap()).unwrap();
        assert_eq!(request.operation, ArpOperation::Request);
        assert_eq!(request.target_protocol_addr, IP_PEER);

        interface.device_mut().inject(arp_reply());
        assert_eq!(interface.poll(Instant::from_millis(5)), Ok(true));
        assert_eq!(interface.poll(Instant::from_millis(5)), Ok(false));

        let sent = interface.device_mut().take_transmitted();
        assert_eq!(sent.len(), 1);
        let (dst_addr, syn) = parse_segment(&sent[0]);
        assert_eq!(dst_addr, MAC_PEER);
        assert!(syn.flags.syn());
        assert_eq!(syn.max_seg_size, Some(1460));
        assert_eq!(syn.src_port, tuple.local_port);

        let mut flags = TcpFlags::default();
        flags.set_syn(true);
        let synack = TcpRepr {
            src_port: 80,
            dst_port: tuple.local_port,
            flags,
            seq_number: TcpSeqNumber(1234),
            ack_number: Some(syn.seq_number + 1),
            window_len: 8192,
            window_scale: None,
            max_seg_size: Some(1400),
            sack_permitted: false,
            timestamp: None,
            payload_len: 0,
        };
        interface.device_mut().inject(tcp_segment(synack));
        assert_eq!(interface.poll(Instant::from_millis(20)), Ok(true));
        assert_eq!(interface.state(&tuple), Some(State::Established));
        assert_eq!(interface.tcp().get(&tuple).unwrap().mss, 1400);

        let sent = interface.device_mut().take_transmitted();
        assert_eq!(sent.len(), 1);
        let (_, ack) = parse_segment(&sent[0]);
        assert_eq!(ack.ack_number, Some(TcpSeqNumber(1235)));

        assert_eq!(interface.send(&tuple, b"hello", Instant::from_millis(30)), Ok(5));
        assert_eq!(interface.device_mut().take_transmitted().len(), 1);
    }

    #[test]
    fn stray_segment_is_reset() {
        let mut interface = interface();
        interface.device_mut().inject(arp_reply());
        interface.poll(Instant::from_millis(0)).unwrap();

        let stray = TcpRepr {
            src_port: 4000,
            dst_port: 22,
            flags: TcpFlags::default(),
            seq_number: TcpSeqNumber(10),
            ack_number: Some(TcpSeqNumber(99)),
            window_len: 100,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            timestamp: None,
            payload_len: 0,
        };
        interface.device_mut().inject(tcp_segment(stray));
        assert_eq!(interface.poll(Instant::from_millis(1)), Err(Error::NoMatchingConnection));

        let sent = interface.device_mut().take_transmitted();
        assert_eq!(sent.len(), 1);
        let (dst_addr, rst) = parse_segment(&sent[0]);
        assert_eq!(dst_addr, MAC_PEER);
        assert!(rst.flags.rst());
        assert_eq!(rst.seq_number, TcpSeqNumber(99));
    }

    #[test]
    fn foreign_frames_are_ignored() {
        let mut interface = interface();
        let mut bytes = arp_reply();
        bytes[..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x99]);
        interface.device_mut().inject(bytes);

        assert_eq!(interface.poll(Instant::from_millis(0)), Err(Error::Unreachable));
        assert!(interface.arp().lookup(IP_PEER).is_none());
        assert!(interface.device().transmitted().is_empty());
    }

    #[test]
    fn slow_tick_retries_arp() {
        let mut interface = interface();
        let tuple = interface.connect(IP_PEER, 80, Instant::from_millis(0)).unwrap();
        assert_eq!(interface.device_mut().take_transmitted().len(), 1);

        interface.slow_tick(Instant::from_millis(500));
        assert!(interface.device().transmitted().is_empty());

        interface.slow_tick(Instant::from_millis(1000));
        let sent = interface.device_mut().take_transmitted();
        // The repeated arp request; the retransmitted SYN is deferred behind it.
        assert_eq!(sent.len(), 1);
        assert_eq!(ethernet_frame::new_checked(&sent[0]).unwrap().ethertype(), EthernetProtocol::Arp);
        assert_eq!(interface.state(&tuple), Some(State::SynSent));
    }

    #[test]
    fn stack_starts_and_stops() {
        let stack = Stack::start(interface()).unwrap();
        stack.listen(8080).unwrap();
        assert_eq!(stack.listen(8080), Err(Error::Illegal));
        assert_eq!(stack.accept(8080), Ok(None));
        stack.shutdown();
    }
}
