//! Ticket inspection utility.
//!
//! Decodes a ticket and prints the fields it claims. No secret is involved,
//! so nothing printed here is authenticated.

use clap::Parser;
use mole_core::{Clock, SystemClock, UnverifiedTicket};

/// Show the contents of a mole ticket without verifying it.
#[derive(Parser, Debug)]
#[command(name = "mole-ticket")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The ticket string
    ticket: String,

    /// Instant (Unix seconds) to evaluate expiry at; defaults to now
    #[arg(long)]
    now: Option<i64>,
}

fn main() {
    let args = Args::parse();

    let ticket = match UnverifiedTicket::parse(args.ticket.trim()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let now = args.now.unwrap_or_else(|| SystemClock.now());
    let fields = ticket.fields();

    println!("UNVERIFIED ticket contents:");
    println!("  subject:       {}", fields.subject);
    println!("  bound address: {}", fields.bound_address);
    println!("  valid until:   {}", fields.valid_until);
    println!("  tag:           {}", hex_short(&ticket.tag_hex()));
    if fields.is_expired_at(now) {
        println!("  expired:       yes ({}s ago)", now.saturating_sub(fields.valid_until));
    } else {
        println!("  expired:       no ({}s left)", fields.valid_until.saturating_sub(now));
    }
    println!();
    println!("Only the issuing server can tell whether the tag is genuine.");
}

fn hex_short(tag: &str) -> String {
    match tag.get(..16) {
        Some(prefix) => format!("{}...", prefix),
        None => tag.to_string(),
    }
}
