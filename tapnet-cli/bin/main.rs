//! A tcp client and server on a tap interface.
//!
//! Connects to a given remote tcp host, sends a single provided message and prints everything
//! received until the remote closes. Or accepts a single connection and echoes it back.
//!
//! Prepend the interface configuration to the mode. Call example:
//!
//! * `tapnet tap0 10.0.0.1/24 ab:ff:ff:ff:ff:ff connect 10.0.0.2 5001 -m hello`
//! * `tapnet tap0 10.0.0.1/24 ab:ff:ff:ff:ff:ff listen 5001`
use std::process;

use tapnet::nic::sys::TapInterface;
use tapnet::{Interface, Stack};
use tapnet_cli::config;

fn main() {
    env_logger::init();
    let config = config::Config::from_args();

    let mut device = TapInterface::new(&config.tap)
        .expect("Couldn't initialize interface");
    if let Some(mtu) = config.mtu {
        device.set_mtu(mtu);
    }

    let stack = Stack::start(Interface::new(device, config.stack()))
        .expect("Couldn't start the stack");

    println!("[+] Configured layers, communicating");

    let result = match &config.mode {
        config::Mode::Connect(client) => tapnet_cli::client(&stack, client),
        config::Mode::Listen(server) => tapnet_cli::server(&stack, server),
    };

    stack.shutdown();
    match result {
        Ok(transfer) => {
            println!("[+] Done\n");
            println!("{}", transfer);
        },
        Err(err) => {
            log::error!("{}", err);
            eprintln!("[-] {}", err);
            process::exit(1);
        },
    }
}
