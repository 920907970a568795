//! Integration tests for serial-frame-protocol devices.
//!
//! The device under test must echo every valid frame it receives back as a
//! frame with the same payload. Corrupted frames must be dropped silently.

mod device;

use clap::Parser;
use colored::Colorize;
use serial_frame_protocol::config::serial::BAUD_RATE;

use device::{resolve_port, DeviceClient};
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for framed serial echo devices")]
struct Args {
    /// Serial port for the device (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = BAUD_RATE)]
    baud: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve port (auto-detect if "auto")
    let port = resolve_port(&args.port, args.baud)?;

    println!("{}", "Serial Frame Protocol Integration Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to device...");
    let mut device = DeviceClient::new(&port, args.baud)?;

    // Wait for boot output to finish, then clear buffer
    std::thread::sleep(std::time::Duration::from_secs(1));
    device.clear_buffer()?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut device);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests_args {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["integration-tests"]);

        assert_eq!(args.port, "auto");
        assert_eq!(args.baud, BAUD_RATE);
    }
}
