//! HTTP front end for gomibako, a throwaway request bin.
//!
//! Mint a bin, point any HTTP client at `/g/{key}`, then read the last
//! requests back as JSON or follow them live over Server-Sent Events.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod live;
pub mod routes;
pub mod view;
