//! Entry point for `gbn-arq`.
//!
//! Parses CLI arguments and dispatches into one of three modes: an
//! in-process simulation, or either half of a TCP transfer.  All protocol
//! work is delegated to the library; `main.rs` owns only process setup
//! (logging, argument parsing) and printing the result.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use gbn_arq::{
    GbnReceiver, GbnSender, LocalChannel, ScriptedFaults, SharedReceiver, TcpChannel,
    TcpReceiver, TransferConfig,
};

const DEFAULT_MESSAGE: &str = "Hello, this is a test message for Go-Back-N protocol.";

/// Go-Back-N ARQ transfers, simulated or over TCP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run sender and receiver in one process.
    Simulate {
        #[command(flatten)]
        transfer: TransferArgs,
        /// Message to transfer.
        #[arg(short, long, default_value = DEFAULT_MESSAGE)]
        message: String,
        /// Stall round 4 and reject round 6 once each.
        #[arg(long)]
        faults: bool,
        /// Receiver work time per batch, in milliseconds.
        #[arg(long, default_value_t = 0)]
        processing_delay_ms: u64,
    },
    /// Listen for a sender and print the received message.
    Receive {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        /// Window size the sender will use.
        #[arg(short, long, default_value_t = 5)]
        window: usize,
        /// Stall round 4 and reject round 6 once each.
        #[arg(long)]
        faults: bool,
        /// Sender timeout in seconds; sizes the injected faults and how long
        /// to keep listening after the final batch.
        #[arg(short, long, default_value_t = 2)]
        timeout: u64,
        /// Receiver work time per batch, in milliseconds.
        #[arg(long, default_value_t = 0)]
        processing_delay_ms: u64,
    },
    /// Send a message to a listening receiver.
    Send {
        /// Receiver address.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        server: SocketAddr,
        #[command(flatten)]
        transfer: TransferArgs,
        /// Message to transfer.
        #[arg(short, long, default_value = DEFAULT_MESSAGE)]
        message: String,
    },
}

#[derive(Args)]
struct TransferArgs {
    /// Units per round.
    #[arg(short, long, default_value_t = 5)]
    window: usize,
    /// Seconds to wait for a verdict before resending.
    #[arg(short, long, default_value_t = 2)]
    timeout: u64,
    /// Failed attempts tolerated per round (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_retries: u32,
}

impl TransferArgs {
    fn config(&self) -> Result<TransferConfig> {
        let max_retries = (self.max_retries > 0).then_some(self.max_retries);
        Ok(TransferConfig::new(self.window, Duration::from_secs(self.timeout))?
            .with_max_retries(max_retries))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Round logs are printed at info; RUST_LOG overrides.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            transfer,
            message,
            faults,
            processing_delay_ms,
        } => {
            let config = transfer.config()?;
            let mut receiver = GbnReceiver::<char>::new(config.window_size)
                .with_processing_delay(Duration::from_millis(processing_delay_ms));
            if faults {
                receiver = receiver.with_faults(ScriptedFaults::demo(config.timeout));
            }
            let mut channel = LocalChannel::new(SharedReceiver::new(receiver));

            let stream: Vec<char> = message.chars().collect();
            let done = GbnSender::new(config)?.run(&stream, &mut channel).await?;

            let received: String = done.message.unwrap_or_default().into_iter().collect();
            println!("{received}");
        }
        Mode::Receive {
            bind,
            window,
            faults,
            timeout,
            processing_delay_ms,
        } => {
            anyhow::ensure!(window > 0, gbn_arq::ConfigError::ZeroWindow);
            let timeout = Duration::from_secs(timeout);
            let mut receiver = GbnReceiver::<char>::new(window)
                .with_processing_delay(Duration::from_millis(processing_delay_ms));
            if faults {
                receiver = receiver.with_faults(ScriptedFaults::demo(timeout));
            }
            let server = TcpReceiver::bind(bind, receiver)
                .await?
                .with_linger(timeout * 2);
            let received: String = server.serve().await?.into_iter().collect();
            println!("{received}");
        }
        Mode::Send {
            server,
            transfer,
            message,
        } => {
            let config = transfer.config()?;
            let mut channel = TcpChannel::new(server);
            let stream: Vec<char> = message.chars().collect();
            let done = GbnSender::new(config)?.run(&stream, &mut channel).await?;
            log::info!(
                "{} attempts: {} accepted, {} rejected, {} timed out",
                done.report.attempts,
                done.report.accepted,
                done.report.rejected,
                done.report.timed_out
            );
            // The receiver prints the message; the sender can only vouch for
            // how much of it was acknowledged.
            println!("{} of {} units acknowledged", done.acknowledged, stream.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_retries_forever_by_default() {
        let cli = Cli::try_parse_from(["gbn-arq", "send"]).unwrap();
        let Mode::Send { transfer, .. } = cli.mode else {
            panic!("expected send mode");
        };
        assert_eq!(transfer.config().unwrap().max_retries, None);
    }

    #[test]
    fn explicit_retry_budget() {
        let cli = Cli::try_parse_from(["gbn-arq", "simulate", "--max-retries", "3"]).unwrap();
        let Mode::Simulate { transfer, .. } = cli.mode else {
            panic!("expected simulate mode");
        };
        assert_eq!(transfer.config().unwrap().max_retries, Some(3));
    }

    #[test]
    fn receive_accepts_processing_delay() {
        let cli =
            Cli::try_parse_from(["gbn-arq", "receive", "--processing-delay-ms", "1000"]).unwrap();
        let Mode::Receive {
            processing_delay_ms,
            ..
        } = cli.mode
        else {
            panic!("expected receive mode");
        };
        assert_eq!(processing_delay_ms, 1000);
    }
}
