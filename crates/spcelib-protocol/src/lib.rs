//! SPCe serial protocol for spcelib.
//!
//! The Gamma Vacuum SPCe ion pump controller speaks a line-oriented ASCII
//! protocol on RS-232/RS-485. This crate provides:
//!
//! - **Checksum** ([`checksum`]) -- the additive mod-256 frame checksum.
//! - **Frame codec** ([`codec`]) -- encode requests and responses, decode
//!   both directions with checksum and bus address validation.
//! - **Command set** ([`commands`]) -- command codes, argument-checked
//!   builders and the payload table that says how to read each response.
//! - **Client** ([`client`]) -- one-request-at-a-time exchange engine with
//!   timeout, bounded retry and `Busy` rejection of overlapping requests.
//! - **Controller** ([`controller`]) -- typed async methods for every
//!   command, bound to one bus address.
//! - **Builder** ([`builder`]) -- fluent construction over serial or TCP.
//!
//! # Frame format
//!
//! ```text
//! request:   ~AA CC[ ARG] KK\r
//! response:  AA OK 00[ PAYLOAD] KK\r
//!            AA ER EE KK\r
//! ```
//!
//! `AA` is the two-digit decimal bus address, `CC` the hex command code,
//! `EE` the hex device error code and `KK` the checksum of every byte before
//! it.
//!
//! # Example
//!
//! ```
//! use spcelib_core::types::BusAddress;
//! use spcelib_protocol::codec::{decode_response, encode_request, ResponseOutcome};
//! use spcelib_protocol::commands::cmd_read_current;
//!
//! let frame = encode_request(BusAddress::DEFAULT, &cmd_read_current()).unwrap();
//! assert_eq!(frame, b"~01 0A 90\r");
//!
//! let outcome = decode_response(b"01 OK 00 3.200 mA 9C\r").unwrap();
//! assert!(matches!(outcome, ResponseOutcome::Ok { ref payload, .. } if payload == "3.200 mA"));
//! ```

pub mod builder;
pub mod checksum;
pub mod client;
pub mod codec;
pub mod commands;
pub mod controller;

pub use builder::SpceBuilder;
pub use client::{ClientConfig, ClientState, ProtocolClient};
pub use codec::{Command, ResponseOutcome};
pub use controller::SpceController;
