pub mod config;

use core::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tapnet::layer::{tcp, Error, Result};
use tapnet::nic::Device;
use tapnet::Stack;

/// How long to sleep when the stack has nothing for us.
const POLL: Duration = Duration::from_millis(10);

/// How long the server waits for its close to complete.
const LINGER: Duration = Duration::from_secs(2);

/// The result of running one connection.
pub struct Transfer {
    /// The connection that was used.
    pub tuple: tcp::FourTuple,
    /// Bytes queued for sending.
    pub sent: usize,
    /// Bytes read from the peer.
    pub received: usize,
    /// From opening to the orderly close of the peer.
    pub time: Duration,
}

/// Connect, send the message, close our side and read everything until the peer closed.
pub fn client<D>(stack: &Stack<D>, client: &config::Client) -> Result<Transfer>
where
    D: Device + Send + 'static,
{
    let start = Instant::now();
    let tuple = stack.connect(client.remote, client.port)?;
    println!("[+] Connecting {}", tuple);

    let deadline = start + Duration::from_secs(client.timeout);
    loop {
        match stack.state(&tuple) {
            Some(tcp::State::SynSent) | Some(tcp::State::SynReceived) => (),
            Some(_) => break,
            None => return Err(take_reason(stack, &tuple)),
        }

        if Instant::now() >= deadline {
            let _ = stack.close(&tuple);
            return Err(Error::Unreachable);
        }
        thread::sleep(POLL);
    }

    println!("[+] Established");
    let sent = stack.send(&tuple, client.message.as_bytes())?;
    stack.close(&tuple)?;

    let received = drain(stack, &tuple, |data| print!("{}", String::from_utf8_lossy(data)))?;
    Ok(Transfer { tuple, sent, received, time: start.elapsed() })
}

/// Accept one connection and answer it.
pub fn server<D>(stack: &Stack<D>, server: &config::Server) -> Result<Transfer>
where
    D: Device + Send + 'static,
{
    stack.listen(server.port)?;
    println!("[+] Listening on {}", server.port);

    let tuple = loop {
        if let Some(tuple) = stack.accept(server.port)? {
            break tuple;
        }
        thread::sleep(POLL);
    };

    println!("[+] Accepted {}", tuple);
    let start = Instant::now();
    let mut sent = 0;
    let mut echo_err = None;
    let received = drain(stack, &tuple, |data| {
        if server.discard || echo_err.is_some() {
            return;
        }
        match stack.send(&tuple, data) {
            Ok(len) => sent += len,
            Err(err) => echo_err = Some(err),
        }
    })?;

    if let Some(err) = echo_err {
        return Err(err);
    }

    stack.close(&tuple)?;
    let time = start.elapsed();

    // Wait for the acknowledgment of our FIN before the stack is stopped.
    let deadline = Instant::now() + LINGER;
    while stack.state(&tuple).is_some() && Instant::now() < deadline {
        thread::sleep(POLL);
    }

    Ok(Transfer { tuple, sent, received, time })
}

/// Read from a connection until the peer closed it.
fn drain<D>(stack: &Stack<D>, tuple: &tcp::FourTuple, mut each: impl FnMut(&[u8])) -> Result<usize>
where
    D: Device + Send + 'static,
{
    let mut buffer = [0; 2048];
    let mut received = 0;
    loop {
        match stack.recv(tuple, &mut buffer) {
            Ok(0) => return Ok(received),
            Ok(len) => {
                received += len;
                each(&buffer[..len]);
            },
            Err(Error::Exhausted) => thread::sleep(POLL),
            // Freed after both sides closed.
            Err(Error::Closed) => return Ok(received),
            Err(err) => return Err(err),
        }
    }
}

fn take_reason<D>(stack: &Stack<D>, tuple: &tcp::FourTuple) -> Error
where
    D: Device + Send + 'static,
{
    stack.lock().tcp_mut().take_event(tuple).unwrap_or(Error::InvalidHandle)
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let secs = self.time.as_millis() as f32 / 1000.0;
        writeln!(f, "Connection {}", self.tuple)?;
        writeln!(f, "Sent {} bytes, received {} bytes", self.sent, self.received)?;
        write!(f, "Time: {:.3}s", secs)
    }
}
