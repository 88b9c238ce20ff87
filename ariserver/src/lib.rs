//! # ariserver — RPC façade for Ari
//!
//! Translates bus procedures and pub-sub messages into player and manager
//! calls, and pumps player events back onto the bus under the configured
//! URI prefix. The bus transport itself is a collaborator behind the
//! [`BusSession`] contract; [`Gateway`] is the in-tree websocket
//! implementation of it.

mod bus;
mod error;
mod gateway;
mod resolver;
mod server;

pub use bus::{BusError, BusSession};
pub use error::{Result, RpcError};
pub use gateway::{Gateway, bind_addr, router, serve};
pub use resolver::BusTrackResolver;
pub use server::AriServer;
