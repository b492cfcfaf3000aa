//! TTTP client: plays one match against a server through pluggable input
//! and display collaborators.

pub mod client;

pub use client::{BoardRender, ClientError, GameResult, MoveSource, TttpClient};
