use structopt::StructOpt;

use tapnet::wire::{EthernetAddress, Ipv4Address, Ipv4Cidr};

#[derive(Clone, StructOpt)]
pub enum Mode {
    /// Connect to a remote port, send a message and read until the peer closes.
    #[structopt(name = "connect")]
    Connect(Client),

    /// Accept one connection and echo everything back.
    #[structopt(name = "listen")]
    Listen(Server),
}

#[derive(Clone, StructOpt)]
pub struct Client {
    pub remote: Ipv4Address,
    pub port: u16,
    #[structopt(short = "m", long = "message", default_value = "Hello, world!\n")]
    pub message: String,
    /// Seconds to wait for the connection to complete.
    #[structopt(long = "timeout", default_value = "10")]
    pub timeout: u64,
}

#[derive(Clone, StructOpt)]
pub struct Server {
    pub port: u16,
    /// Only count the received data instead of echoing it.
    #[structopt(long = "discard")]
    pub discard: bool,
}

#[derive(Clone, StructOpt)]
pub struct Config {
    pub tap: String,
    pub host: Ipv4Cidr,
    pub hostmac: EthernetAddress,
    #[structopt(long = "gateway")]
    pub gateway: Option<Ipv4Address>,
    /// Override the mtu reported by the interface.
    #[structopt(long = "mtu")]
    pub mtu: Option<usize>,
    /// Do not answer pings.
    #[structopt(long = "silent")]
    pub silent: bool,

    #[structopt(subcommand)]
    pub mode: Mode,
}

impl Config {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }

    /// The configuration of the stack itself.
    pub fn stack(&self) -> tapnet::Config {
        let mut config = tapnet::Config::new(self.hostmac, self.host);
        config.gateway = self.gateway;
        config.answer_ping = !self.silent;
        config
    }
}
