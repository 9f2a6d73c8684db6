//! Test helpers shared across server modules.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use rstest::fixture;

use super::{Bound, Server};
use crate::{codec::LengthFieldCodec, engine::Pipeline, handler::HandlerChain};

/// Nameable factory type for fixtures.
pub type TestFactory = fn() -> Pipeline;

fn echo_pipeline() -> Pipeline { Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()) }

#[fixture]
pub fn factory() -> TestFactory { echo_pipeline }

/// A bound listener on a free port.
///
/// Keeping the listener bound prevents another process from claiming the
/// port between discovery and use.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

/// Bind a server to `listener`. Must run inside a Tokio runtime.
pub fn bind_server(factory: TestFactory, listener: StdTcpListener) -> Server<TestFactory, Bound> {
    Server::new(factory)
        .bind_listener(listener)
        .expect("Failed to bind")
}
